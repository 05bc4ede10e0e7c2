use async_trait::async_trait;
use serde_json::{Value, json};

use zrt::event::StateChangedEvent;
use zrt::state::{self, TrackerState};

use crate::error::ApiResult;
use crate::model::Cached;

use super::{EntityCommand, EntityCore, PlatformEntity, initial_state, unsupported};

/// Presence tracker backed by a battery-powered node that checks in
/// periodically. Carries the last reported battery level alongside the
/// connected flag.
pub struct DeviceTrackerEntity {
    core: EntityCore,
    state: Cached<TrackerState>,
}

impl DeviceTrackerEntity {
    #[must_use]
    pub fn new(core: EntityCore) -> Self {
        let state = Cached::new(initial_state(core.descriptor()));
        Self { core, state }
    }
}

#[async_trait]
impl PlatformEntity for DeviceTrackerEntity {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn state_json(&self) -> Value {
        let state = self.state.get();
        json!({
            "connected": state.connected,
            "battery_level": state.battery_level,
        })
    }

    fn handle_state_changed(&self, event: &StateChangedEvent) {
        let incoming: TrackerState = state::decode(&event.state);
        self.state.update(|current| {
            if incoming.connected.is_some() {
                current.connected = incoming.connected;
            }
            if incoming.battery_level.is_some() {
                current.battery_level = incoming.battery_level;
            }
        });
        self.core.write_state(&self.state_json());
    }

    async fn invoke(&self, command: EntityCommand) -> ApiResult<()> {
        match command {
            EntityCommand::Refresh => self.core.refresh().await,
            other => unsupported(&self.core, &other),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use zrt::event::StateChangedEvent;
    use zrt::platform::Platform;

    use crate::entity::testing::{descriptor, device_parent};
    use crate::entity::{EntityCore, PlatformEntity};
    use crate::gateway::client::testing::MockSession;

    use super::DeviceTrackerEntity;

    #[test]
    fn battery_level_survives_presence_updates() {
        let session = MockSession::new();
        let parent = device_parent(&session);
        let desc = descriptor(Platform::DeviceTracker, "DeviceTracker", "tracker-1");
        let entity = DeviceTrackerEntity::new(EntityCore::new(parent, desc));

        entity.handle_state_changed(&StateChangedEvent {
            unique_id: "tracker-1".to_string(),
            platform: Platform::DeviceTracker,
            device_ieee: None,
            group_id: None,
            state: json!({"connected": true, "battery_level": 87.0}),
        });
        entity.handle_state_changed(&StateChangedEvent {
            unique_id: "tracker-1".to_string(),
            platform: Platform::DeviceTracker,
            device_ieee: None,
            group_id: None,
            state: json!({"connected": false}),
        });

        assert_eq!(
            entity.state_json(),
            json!({"connected": false, "battery_level": 87.0})
        );
    }
}
