use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::CommandResponse;
use crate::model::{DeviceModel, Eui64, GroupModel};
use crate::platform::Platform;

/// Push event for one platform entity.
///
/// Events for a given `unique_id` are delivered in the order the
/// runtime emitted them (FIFO per connection); there is no ordering
/// guarantee across entity ids.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateChangedEvent {
    pub unique_id: String,
    pub platform: Platform,
    #[serde(default)]
    pub device_ieee: Option<Eui64>,
    #[serde(default)]
    pub group_id: Option<u16>,
    pub state: Value,
}

/// Unsolicited notifications from the runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// A node joined the network but interview is still in progress.
    DeviceJoined { ieee: Eui64, nwk: u16 },
    /// Interview finished; the device and its entities are usable.
    DeviceFullyInitialized { device: DeviceModel },
    DeviceLeft { ieee: Eui64 },
    DeviceRemoved { ieee: Eui64 },
    DeviceOffline { ieee: Eui64 },
    DeviceOnline { ieee: Eui64 },
    GroupAdded { group: GroupModel },
    GroupRemoved { group_id: u16 },
    PlatformEntityStateChanged(StateChangedEvent),
    /// Event types this build does not know yet.
    #[serde(other)]
    Unknown,
}

/// Everything the runtime can put on the wire towards a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum ServerMessage {
    Result(CommandResponse),
    Event(RuntimeEvent),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{RuntimeEvent, ServerMessage};

    #[test]
    fn decode_state_changed() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "message_type": "event",
            "event": "platform_entity_state_changed",
            "unique_id": "00:0d:6f:00:0a:bc:de:f0-1-6",
            "platform": "switch",
            "device_ieee": "00:0d:6f:00:0a:bc:de:f0",
            "state": {"state": true},
        }))
        .unwrap();

        let ServerMessage::Event(RuntimeEvent::PlatformEntityStateChanged(event)) = msg else {
            panic!("expected state changed event, got {msg:?}");
        };
        assert_eq!(event.unique_id, "00:0d:6f:00:0a:bc:de:f0-1-6");
        assert_eq!(event.state["state"], json!(true));
    }

    #[test]
    fn decode_result_with_data() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "message_type": "result",
            "message_id": 7,
            "success": true,
            "code": "1234",
        }))
        .unwrap();

        let ServerMessage::Result(result) = msg else {
            panic!("expected result, got {msg:?}");
        };
        assert_eq!(result.message_id, 7);
        assert!(result.success);
        assert_eq!(result.data["code"], json!("1234"));
    }

    #[test]
    fn decode_unknown_event() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "message_type": "event",
            "event": "network_topology_changed",
        }))
        .unwrap();

        assert!(matches!(msg, ServerMessage::Event(RuntimeEvent::Unknown)));
    }
}
