use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::Eui64;

/// Addresses one platform entity in a command.
///
/// `unique_id` alone identifies the entity; the parent address is
/// carried so the runtime can route without a reverse lookup.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct EntityRef {
    pub unique_id: String,
    #[serde(default)]
    pub ieee: Option<Eui64>,
    #[serde(default)]
    pub group_id: Option<u16>,
}

/// Commands a client can issue against the runtime.
///
/// Numeric conventions are the runtime's: cover positions are
/// 0 = fully open / 100 = fully closed, and lock code slots are
/// zero-indexed. Clients present their own conventions and translate
/// at their boundary.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandRequest {
    GetDevices,
    GetGroups,

    SwitchTurnOn {
        #[serde(flatten)]
        entity: EntityRef,
    },
    SwitchTurnOff {
        #[serde(flatten)]
        entity: EntityRef,
    },

    LightTurnOn {
        #[serde(flatten)]
        entity: EntityRef,
        #[serde(default)]
        brightness: Option<u8>,
        #[serde(default)]
        transition: Option<f32>,
    },
    LightTurnOff {
        #[serde(flatten)]
        entity: EntityRef,
        #[serde(default)]
        transition: Option<f32>,
    },

    CoverOpen {
        #[serde(flatten)]
        entity: EntityRef,
    },
    CoverClose {
        #[serde(flatten)]
        entity: EntityRef,
    },
    CoverStop {
        #[serde(flatten)]
        entity: EntityRef,
    },
    CoverSetPosition {
        #[serde(flatten)]
        entity: EntityRef,
        position: u8,
    },

    LockLock {
        #[serde(flatten)]
        entity: EntityRef,
    },
    LockUnlock {
        #[serde(flatten)]
        entity: EntityRef,
    },
    LockSetUserCode {
        #[serde(flatten)]
        entity: EntityRef,
        code_slot: u16,
        user_code: String,
    },
    LockEnableUserCode {
        #[serde(flatten)]
        entity: EntityRef,
        code_slot: u16,
    },
    LockDisableUserCode {
        #[serde(flatten)]
        entity: EntityRef,
        code_slot: u16,
    },
    LockClearUserCode {
        #[serde(flatten)]
        entity: EntityRef,
        code_slot: u16,
    },
    LockGetUserCode {
        #[serde(flatten)]
        entity: EntityRef,
        code_slot: u16,
    },

    SirenTurnOn {
        #[serde(flatten)]
        entity: EntityRef,
        #[serde(default)]
        duration: Option<u16>,
        #[serde(default)]
        tone: Option<u8>,
        #[serde(default)]
        volume_level: Option<u8>,
    },
    SirenTurnOff {
        #[serde(flatten)]
        entity: EntityRef,
    },

    SelectOption {
        #[serde(flatten)]
        entity: EntityRef,
        option: String,
    },

    ButtonPress {
        #[serde(flatten)]
        entity: EntityRef,
    },

    AlarmDisarm {
        #[serde(flatten)]
        entity: EntityRef,
        #[serde(default)]
        code: Option<String>,
    },
    AlarmArmHome {
        #[serde(flatten)]
        entity: EntityRef,
        #[serde(default)]
        code: Option<String>,
    },
    AlarmArmAway {
        #[serde(flatten)]
        entity: EntityRef,
        #[serde(default)]
        code: Option<String>,
    },
    AlarmArmNight {
        #[serde(flatten)]
        entity: EntityRef,
        #[serde(default)]
        code: Option<String>,
    },
    AlarmTrigger {
        #[serde(flatten)]
        entity: EntityRef,
    },

    RefreshState {
        #[serde(flatten)]
        entity: EntityRef,
    },
}

/// A command with its correlation id, as sent on the socket.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientRequest {
    pub message_id: u64,
    #[serde(flatten)]
    pub command: CommandRequest,
}

/// Acknowledgement for a single [`ClientRequest`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub message_id: u64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<Value>,
    /// Command-specific response fields (device maps, user codes, ...).
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl CommandResponse {
    /// A successful, empty acknowledgement.
    #[must_use]
    pub fn ok(message_id: u64) -> Self {
        Self {
            message_id,
            success: true,
            error: None,
            data: Map::new(),
        }
    }

    #[must_use]
    pub fn fail(message_id: u64, error: impl Into<String>) -> Self {
        Self {
            message_id,
            success: false,
            error: Some(Value::String(error.into())),
            data: Map::new(),
        }
    }

    /// Human-readable error payload, for diagnostics.
    #[must_use]
    pub fn error_text(&self) -> String {
        self.error
            .as_ref()
            .map_or_else(|| "unspecified error".to_string(), Value::to_string)
    }
}
