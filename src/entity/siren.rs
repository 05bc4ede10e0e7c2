use async_trait::async_trait;
use serde_json::{Value, json};

use zrt::event::StateChangedEvent;
use zrt::state::{self, OnOffState};

use crate::error::ApiResult;
use crate::model::Cached;

use super::{EntityCommand, EntityCore, PlatformEntity, initial_state, unsupported};

/// Warning device. Tone, volume and duration are optional and passed
/// through to the runtime untouched.
pub struct SirenEntity {
    core: EntityCore,
    state: Cached<OnOffState>,
}

impl SirenEntity {
    #[must_use]
    pub fn new(core: EntityCore) -> Self {
        let state = Cached::new(initial_state(core.descriptor()));
        Self { core, state }
    }

    async fn turn_on(
        &self,
        duration: Option<u16>,
        tone: Option<u8>,
        volume_level: Option<u8>,
    ) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .sirens()
            .turn_on(self.core.entity_ref(), duration, tone, volume_level)
            .await?;
        self.core.ensure_accepted("turn_on", &response)?;
        if self.core.still_attached() {
            self.state.update(|current| current.state = Some(true));
            self.core.write_state(&self.state_json());
        }
        Ok(())
    }

    async fn turn_off(&self) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .sirens()
            .turn_off(self.core.entity_ref())
            .await?;
        self.core.ensure_accepted("turn_off", &response)?;
        if self.core.still_attached() {
            self.state.update(|current| current.state = Some(false));
            self.core.write_state(&self.state_json());
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformEntity for SirenEntity {
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
            EntityCommand::SirenTurnOn {
                duration,
                tone,
                volume_level,
            } => self.turn_on(duration, tone, volume_level).await,
            EntityCommand::TurnOn => self.turn_on(None, None, None).await,
            EntityCommand::TurnOff => self.turn_off().await,
            EntityCommand::Refresh => self.core.refresh().await,
            other => unsupported(&self.core, &other),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use zrt::command::CommandRequest;
    use zrt::platform::Platform;

    use crate::entity::testing::{descriptor, device_parent};
    use crate::entity::{EntityCommand, EntityCore, PlatformEntity};
    use crate::gateway::client::testing::MockSession;

    use super::SirenEntity;

    #[tokio::test]
    async fn turn_on_passes_tone_options_through() {
        let session = MockSession::new();
        let parent = device_parent(&session);
        let desc = descriptor(Platform::Siren, "Siren", "siren-1");
        let entity = SirenEntity::new(EntityCore::new(parent, desc));

        entity
            .invoke(EntityCommand::SirenTurnOn {
                duration: Some(30),
                tone: Some(2),
                volume_level: Some(1),
            })
            .await
            .unwrap();

        let requests = session.requests();
        let [
            CommandRequest::SirenTurnOn {
                duration,
                tone,
                volume_level,
                ..
            },
        ] = requests.as_slice()
        else {
            panic!("unexpected commands: {requests:?}");
        };
        assert_eq!(*duration, Some(30));
        assert_eq!(*tone, Some(2));
        assert_eq!(*volume_level, Some(1));
        assert_eq!(entity.state_json(), json!({"state": true}));
    }
}
