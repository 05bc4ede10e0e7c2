use async_trait::async_trait;
use serde_json::{Value, json};

use zrt::event::StateChangedEvent;
use zrt::state::{self, AlarmState};

use crate::error::ApiResult;
use crate::model::Cached;

use super::{EntityCommand, EntityCore, PlatformEntity, initial_state, unsupported};

/// Alarm control panel.
///
/// The armed state is authoritative on the runtime side; commands only
/// take effect in the cache once the runtime confirms them, and the
/// resulting state string arrives through the regular event path.
pub struct AlarmControlPanelEntity {
    core: EntityCore,
    state: Cached<AlarmState>,
}

impl AlarmControlPanelEntity {
    #[must_use]
    pub fn new(core: EntityCore) -> Self {
        let state = Cached::new(initial_state(core.descriptor()));
        Self { core, state }
    }

    async fn disarm(&self, code: Option<String>) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .alarm_panels()
            .disarm(self.core.entity_ref(), code)
            .await?;
        self.core.ensure_accepted("disarm", &response)?;
        if self.core.still_attached() {
            self.state
                .update(|current| current.state = Some("disarmed".to_string()));
            self.core.write_state(&self.state_json());
        }
        Ok(())
    }

    async fn arm(&self, command: EntityCommand) -> ApiResult<()> {
        let entity = self.core.entity_ref();
        let panels = self.core.controller().alarm_panels();
        let (response, operation, armed) = match command {
            EntityCommand::AlarmArmHome { code } => {
                (panels.arm_home(entity, code).await?, "arm_home", "armed_home")
            }
            EntityCommand::AlarmArmAway { code } => {
                (panels.arm_away(entity, code).await?, "arm_away", "armed_away")
            }
            EntityCommand::AlarmArmNight { code } => (
                panels.arm_night(entity, code).await?,
                "arm_night",
                "armed_night",
            ),
            EntityCommand::AlarmTrigger => {
                (panels.trigger(entity).await?, "trigger", "triggered")
            }
            other => return unsupported(&self.core, &other),
        };
        self.core.ensure_accepted(operation, &response)?;
        if self.core.still_attached() {
            self.state
                .update(|current| current.state = Some(armed.to_string()));
            self.core.write_state(&self.state_json());
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformEntity for AlarmControlPanelEntity {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn state_json(&self) -> Value {
        json!({"state": self.state.get().state})
    }

    fn handle_state_changed(&self, event: &StateChangedEvent) {
        let incoming: AlarmState = state::decode(&event.state);
        self.state.update(|current| {
            if incoming.state.is_some() {
                current.state = incoming.state;
            }
        });
        self.core.write_state(&self.state_json());
    }

    async fn invoke(&self, command: EntityCommand) -> ApiResult<()> {
        match command {
            EntityCommand::AlarmDisarm { code } => self.disarm(code).await,
            arm @ (EntityCommand::AlarmArmHome { .. }
            | EntityCommand::AlarmArmAway { .. }
            | EntityCommand::AlarmArmNight { .. }
            | EntityCommand::AlarmTrigger) => self.arm(arm).await,
            EntityCommand::Refresh => self.core.refresh().await,
            other => unsupported(&self.core, &other),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use zrt::command::{CommandRequest, CommandResponse};
    use zrt::platform::Platform;

    use crate::entity::testing::{descriptor, device_parent};
    use crate::entity::{EntityCommand, EntityCore, PlatformEntity};
    use crate::gateway::client::testing::MockSession;

    use super::AlarmControlPanelEntity;

    fn entity(session: &std::sync::Arc<MockSession>) -> AlarmControlPanelEntity {
        let parent = device_parent(session);
        let desc = descriptor(
            Platform::AlarmControlPanel,
            "ZHAAlarmControlPanel",
            "panel-1",
        );
        AlarmControlPanelEntity::new(EntityCore::new(parent, desc))
    }

    #[tokio::test]
    async fn arm_away_forwards_the_code() {
        let session = MockSession::new();
        let entity = entity(&session);

        entity
            .invoke(EntityCommand::AlarmArmAway {
                code: Some("4321".to_string()),
            })
            .await
            .unwrap();

        let requests = session.requests();
        let [CommandRequest::AlarmArmAway { code, .. }] = requests.as_slice() else {
            panic!("unexpected commands: {requests:?}");
        };
        assert_eq!(code.as_deref(), Some("4321"));
        assert_eq!(entity.state_json()["state"], json!("armed_away"));
    }

    #[tokio::test]
    async fn rejected_arm_leaves_state_unchanged() {
        let session = MockSession::new();
        session.enqueue(CommandResponse::fail(1, "invalid code"));
        let entity = entity(&session);

        let result = entity.invoke(EntityCommand::AlarmArmHome { code: None }).await;

        assert!(result.is_err());
        assert_eq!(entity.state_json()["state"], json!(null));
    }
}
