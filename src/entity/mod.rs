//! Platform entity adapters.
//!
//! Each adapter pairs one runtime entity with its host-side
//! presentation: it caches the last known state, translates push events
//! into host re-renders, and translates host commands into runtime
//! commands. Adapters are built once per unique id and survive until
//! their parent device or group is removed.

pub mod alarm_control_panel;
pub mod binary_sensor;
pub mod button;
pub mod cover;
pub mod device_tracker;
pub mod light;
pub mod lock;
pub mod select;
pub mod sensor;
pub mod siren;
pub mod switch;
pub mod update;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use zrt::command::{CommandResponse, EntityRef};
use zrt::event::StateChangedEvent;
use zrt::model::EntityDescriptor;
use zrt::platform::Platform;

use crate::error::{ApiError, ApiResult};
use crate::gateway::client::Controller;
use crate::model::Cached;
use crate::model::proxy::ParentHandle;
use crate::platform::EntityContext;
use crate::registry::EntityKind;

/// Host attachment lifecycle. The order is one-way:
/// unattached, then attached, then detached.
#[derive(Clone, Default)]
enum AttachState {
    #[default]
    Unattached,
    Attached(EntityContext),
    Detached,
}

/// Shared plumbing embedded in every adapter.
pub struct EntityCore {
    descriptor: EntityDescriptor,
    parent: ParentHandle,
    attach: Cached<AttachState>,
}

impl EntityCore {
    #[must_use]
    pub fn new(parent: ParentHandle, descriptor: EntityDescriptor) -> Self {
        Self {
            descriptor,
            parent,
            attach: Cached::new(AttachState::Unattached),
        }
    }

    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.descriptor.unique_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.descriptor.platform
    }

    #[must_use]
    pub const fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub const fn parent(&self) -> &ParentHandle {
        &self.parent
    }

    #[must_use]
    pub fn controller(&self) -> &Controller {
        self.parent.controller()
    }

    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        self.parent.entity_ref(self.unique_id())
    }

    /// Bind to the host. Registers with the parent's removal tracker.
    /// Attaching twice, or after detach, is a no-op.
    pub fn attach(&self, context: EntityContext) {
        let mut registered = false;
        self.attach.update(|state| {
            if matches!(state, AttachState::Unattached) {
                *state = AttachState::Attached(context.clone());
                registered = true;
            }
        });
        if registered {
            self.parent.removal().register();
        }
    }

    /// Unbind from the host. Resolves the removal tracker exactly once,
    /// and only if the entity was attached.
    pub fn detach(&self) {
        let mut resolve = false;
        self.attach.update(|state| {
            if matches!(state, AttachState::Attached(_)) {
                resolve = true;
            }
            *state = AttachState::Detached;
        });
        if resolve {
            self.parent.removal().resolve();
        }
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        let mut detached = false;
        self.attach.update(|state| {
            detached = matches!(state, AttachState::Detached);
        });
        detached
    }

    /// Re-render through the host writer. Silently dropped unless the
    /// entity is currently attached; the cache behind `state` is always
    /// kept up to date regardless.
    pub fn write_state(&self, state: &Value) {
        if let AttachState::Attached(context) = self.attach.get() {
            context.writer.write_state(self.unique_id(), state);
        }
    }

    /// Check a command acknowledgement.
    ///
    /// A rejected command is surfaced to the caller as an error and
    /// never mutates the cache.
    pub fn ensure_accepted(&self, operation: &str, response: &CommandResponse) -> ApiResult<()> {
        if response.success {
            return Ok(());
        }
        log::warn!(
            "Runtime rejected {operation} for {}: {}",
            self.unique_id(),
            response.error_text()
        );
        Err(ApiError::CommandRejected(
            format!("{operation} on {}", self.unique_id()),
            response.error_text(),
        ))
    }

    /// Gate for cache updates after an accepted command: an entity that
    /// was detached while the request was in flight must not touch
    /// host-facing state anymore.
    #[must_use]
    pub fn still_attached(&self) -> bool {
        !self.is_detached()
    }

    /// Ask the runtime to re-publish this entity's state.
    pub async fn refresh(&self) -> ApiResult<()> {
        let response = self
            .controller()
            .entities()
            .refresh_state(self.entity_ref())
            .await?;
        if !response.success {
            log::warn!("State refresh rejected for {}", self.unique_id());
        }
        Ok(())
    }
}

/// Commands the host can issue, in host conventions.
///
/// Cover positions are percent-open (100 = fully open) and lock code
/// slots are one-indexed; adapters translate to the runtime's
/// conventions at the boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum EntityCommand {
    TurnOn,
    TurnOff,
    LightTurnOn {
        brightness: Option<u8>,
        transition: Option<f32>,
    },
    LightTurnOff {
        transition: Option<f32>,
    },
    OpenCover,
    CloseCover,
    StopCover,
    SetCoverPosition {
        position: u8,
    },
    Lock,
    Unlock,
    SetLockUserCode {
        code_slot: u16,
        user_code: String,
    },
    EnableLockUserCode {
        code_slot: u16,
    },
    DisableLockUserCode {
        code_slot: u16,
    },
    ClearLockUserCode {
        code_slot: u16,
    },
    SirenTurnOn {
        duration: Option<u16>,
        tone: Option<u8>,
        volume_level: Option<u8>,
    },
    SelectOption {
        option: String,
    },
    Press,
    AlarmDisarm {
        code: Option<String>,
    },
    AlarmArmHome {
        code: Option<String>,
    },
    AlarmArmAway {
        code: Option<String>,
    },
    AlarmArmNight {
        code: Option<String>,
    },
    AlarmTrigger,
    Refresh,
}

/// One platform entity adapter.
#[async_trait]
pub trait PlatformEntity: Send + Sync {
    fn core(&self) -> &EntityCore;

    /// Current cached state, rendered as the host-facing payload.
    fn state_json(&self) -> Value;

    /// Apply a push event. The cache is always updated; the host is
    /// only re-rendered while attached.
    fn handle_state_changed(&self, event: &StateChangedEvent);

    /// Execute a host command.
    async fn invoke(&self, command: EntityCommand) -> ApiResult<()>;

    fn platform(&self) -> Platform {
        self.core().platform()
    }

    fn unique_id(&self) -> &str {
        self.core().unique_id()
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    /// Bind to the host and render the current state once.
    fn attach(&self, context: EntityContext) {
        self.core().attach(context);
        self.core().write_state(&self.state_json());
    }

    fn detach(&self) {
        self.core().detach();
    }
}

pub type DynEntity = Arc<dyn PlatformEntity>;

/// Fallback for commands an adapter does not implement.
fn unsupported(core: &EntityCore, command: &EntityCommand) -> ApiResult<()> {
    log::debug!("Unsupported command {command:?} for {}", core.unique_id());
    Err(ApiError::UnsupportedCommand(core.unique_id().to_string()))
}

/// Construct the adapter for a resolved entity kind.
///
/// Returns `None` for [`EntityKind::Unknown`]; the caller skips the
/// entity and keeps going.
#[must_use]
pub fn build_entity(
    kind: EntityKind,
    parent: &ParentHandle,
    descriptor: &EntityDescriptor,
) -> Option<DynEntity> {
    let core = EntityCore::new(parent.clone(), descriptor.clone());
    match kind {
        EntityKind::AlarmControlPanel => {
            Some(Arc::new(alarm_control_panel::AlarmControlPanelEntity::new(core)))
        }
        EntityKind::BinarySensor => Some(Arc::new(binary_sensor::BinarySensorEntity::new(core))),
        EntityKind::Button => Some(Arc::new(button::ButtonEntity::new(core))),
        EntityKind::Cover => Some(Arc::new(cover::CoverEntity::new(core))),
        EntityKind::DeviceTracker => Some(Arc::new(device_tracker::DeviceTrackerEntity::new(core))),
        EntityKind::Light => Some(Arc::new(light::LightEntity::new(core))),
        EntityKind::Lock => Some(Arc::new(lock::LockEntity::new(core))),
        EntityKind::Select => Some(Arc::new(select::SelectEntity::new(core))),
        EntityKind::Sensor => Some(Arc::new(sensor::SensorEntity::new(core))),
        EntityKind::Siren => Some(Arc::new(siren::SirenEntity::new(core))),
        EntityKind::Switch => Some(Arc::new(switch::SwitchEntity::new(core))),
        EntityKind::Update => Some(Arc::new(update::UpdateEntity::new(core))),
        EntityKind::Unknown => None,
    }
}

/// Decode the initial state snapshot from a descriptor, or fall back to
/// the all-unknown default when the runtime supplied none.
fn initial_state<T: serde::de::DeserializeOwned + Default>(descriptor: &EntityDescriptor) -> T {
    descriptor
        .state
        .as_ref()
        .map(zrt::state::decode)
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use serde_json::Value;

    use zrt::model::{DeviceModel, EntityDescriptor};
    use zrt::platform::Platform;

    use crate::gateway::client::testing::MockSession;
    use crate::model::proxy::{DeviceProxy, ParentHandle};
    use crate::platform::{EntityContext, StateWriter};

    /// Captures every host re-render for assertions.
    pub struct RecordingWriter {
        states: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingWriter {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                states: Mutex::new(Vec::new()),
            })
        }

        pub fn states(&self) -> Vec<(String, Value)> {
            self.states.lock().unwrap().clone()
        }

        pub fn last(&self) -> Option<Value> {
            self.states.lock().unwrap().last().map(|(_, v)| v.clone())
        }
    }

    impl StateWriter for RecordingWriter {
        fn write_state(&self, unique_id: &str, state: &Value) {
            self.states
                .lock()
                .unwrap()
                .push((unique_id.to_string(), state.clone()));
        }
    }

    pub fn context(writer: &Arc<RecordingWriter>) -> EntityContext {
        EntityContext::new(writer.clone())
    }

    pub fn device_parent(session: &Arc<MockSession>) -> ParentHandle {
        let model = DeviceModel {
            ieee: "00:0d:6f:00:0a:bc:de:f0".parse().unwrap(),
            nwk: 0x1234,
            manufacturer: Some("Acme".to_string()),
            model: Some("Widget 2".to_string()),
            name: Some("Acme Widget 2".to_string()),
            available: true,
            entities: Default::default(),
        };
        ParentHandle::Device(DeviceProxy::new(model, session.controller()))
    }

    pub fn descriptor(platform: Platform, class_name: &str, unique_id: &str) -> EntityDescriptor {
        EntityDescriptor {
            platform,
            class_name: class_name.to_string(),
            unique_id: unique_id.to_string(),
            name: "Test entity".to_string(),
            state: None,
            device_class: None,
            unit_of_measurement: None,
            translation_key: None,
            supported_features: None,
            options: None,
        }
    }
}
