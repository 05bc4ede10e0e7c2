use async_trait::async_trait;
use serde_json::{Value, json};

use zrt::event::StateChangedEvent;
use zrt::state::{self, OnOffState};

use crate::error::ApiResult;
use crate::model::Cached;

use super::{EntityCommand, EntityCore, PlatformEntity, initial_state, unsupported};

/// Read-only boolean sensor (motion, occupancy, contact, ...).
///
/// The concrete meaning comes from the descriptor's device class; the
/// wire behavior is identical for all of them.
pub struct BinarySensorEntity {
    core: EntityCore,
    state: Cached<OnOffState>,
}

impl BinarySensorEntity {
    #[must_use]
    pub fn new(core: EntityCore) -> Self {
        let state = Cached::new(initial_state(core.descriptor()));
        Self { core, state }
    }
}

#[async_trait]
impl PlatformEntity for BinarySensorEntity {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn state_json(&self) -> Value {
        json!({"state": self.state.get().state})
    }

    fn handle_state_changed(&self, event: &StateChangedEvent) {
        let incoming: OnOffState = state::decode(&event.state);
        self.state.update(|current| {
            if incoming.state.is_some() {
                current.state = incoming.state;
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
    use crate::entity::{EntityCommand, EntityCore, PlatformEntity};
    use crate::gateway::client::testing::MockSession;

    use super::BinarySensorEntity;

    #[tokio::test]
    async fn commands_other_than_refresh_are_unsupported() {
        let session = MockSession::new();
        let parent = device_parent(&session);
        let desc = descriptor(Platform::BinarySensor, "Motion", "motion-1");
        let entity = BinarySensorEntity::new(EntityCore::new(parent, desc));

        assert!(entity.invoke(EntityCommand::TurnOn).await.is_err());
        assert!(session.requests().is_empty());
    }

    #[test]
    fn initial_state_comes_from_snapshot() {
        let session = MockSession::new();
        let parent = device_parent(&session);
        let mut desc = descriptor(Platform::BinarySensor, "Opening", "opening-1");
        desc.state = Some(json!({"state": true}));
        let entity = BinarySensorEntity::new(EntityCore::new(parent, desc));

        assert_eq!(entity.state_json(), json!({"state": true}));

        entity.handle_state_changed(&StateChangedEvent {
            unique_id: "opening-1".to_string(),
            platform: Platform::BinarySensor,
            device_ieee: None,
            group_id: None,
            state: json!({"state": false}),
        });
        assert_eq!(entity.state_json(), json!({"state": false}));
    }
}
