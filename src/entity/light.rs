use async_trait::async_trait;
use serde_json::{Value, json};

use zrt::event::StateChangedEvent;
use zrt::state::{self, LightState};

use crate::error::ApiResult;
use crate::model::Cached;

use super::{EntityCommand, EntityCore, PlatformEntity, initial_state, unsupported};

/// Dimmable light. Also serves group lights, which behave the same on
/// the wire and differ only in their parent.
pub struct LightEntity {
    core: EntityCore,
    state: Cached<LightState>,
}

impl LightEntity {
    #[must_use]
    pub fn new(core: EntityCore) -> Self {
        let state = Cached::new(initial_state(core.descriptor()));
        Self { core, state }
    }

    async fn turn_on(&self, brightness: Option<u8>, transition: Option<f32>) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .lights()
            .turn_on(self.core.entity_ref(), brightness, transition)
            .await?;
        self.core.ensure_accepted("turn_on", &response)?;
        if self.core.still_attached() {
            self.state.update(|current| {
                current.on = Some(true);
                if brightness.is_some() {
                    current.brightness = brightness;
                }
            });
            self.core.write_state(&self.state_json());
        }
        Ok(())
    }

    async fn turn_off(&self, transition: Option<f32>) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .lights()
            .turn_off(self.core.entity_ref(), transition)
            .await?;
        self.core.ensure_accepted("turn_off", &response)?;
        if self.core.still_attached() {
            self.state.update(|current| current.on = Some(false));
            self.core.write_state(&self.state_json());
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformEntity for LightEntity {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn state_json(&self) -> Value {
        let state = self.state.get();
        json!({
            "on": state.on,
            "brightness": state.brightness,
        })
    }

    fn handle_state_changed(&self, event: &StateChangedEvent) {
        let incoming: LightState = state::decode(&event.state);
        self.state.update(|current| {
            if incoming.on.is_some() {
                current.on = incoming.on;
            }
            if incoming.brightness.is_some() {
                current.brightness = incoming.brightness;
            }
        });
        self.core.write_state(&self.state_json());
    }

    async fn invoke(&self, command: EntityCommand) -> ApiResult<()> {
        match command {
            EntityCommand::LightTurnOn {
                brightness,
                transition,
            } => self.turn_on(brightness, transition).await,
            EntityCommand::TurnOn => self.turn_on(None, None).await,
            EntityCommand::LightTurnOff { transition } => self.turn_off(transition).await,
            EntityCommand::TurnOff => self.turn_off(None).await,
            EntityCommand::Refresh => self.core.refresh().await,
            other => unsupported(&self.core, &other),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use zrt::command::CommandRequest;
    use zrt::event::StateChangedEvent;
    use zrt::platform::Platform;

    use crate::entity::testing::{descriptor, device_parent};
    use crate::entity::{EntityCommand, EntityCore, PlatformEntity};
    use crate::gateway::client::testing::MockSession;

    use super::LightEntity;

    fn entity(session: &std::sync::Arc<MockSession>) -> LightEntity {
        let parent = device_parent(session);
        let desc = descriptor(Platform::Light, "HueLight", "light-1");
        LightEntity::new(EntityCore::new(parent, desc))
    }

    #[tokio::test]
    async fn turn_on_carries_brightness_and_transition() {
        let session = MockSession::new();
        let entity = entity(&session);

        entity
            .invoke(EntityCommand::LightTurnOn {
                brightness: Some(128),
                transition: Some(1.5),
            })
            .await
            .unwrap();

        let requests = session.requests();
        let [
            CommandRequest::LightTurnOn {
                brightness,
                transition,
                ..
            },
        ] = requests.as_slice()
        else {
            panic!("unexpected commands: {requests:?}");
        };
        assert_eq!(*brightness, Some(128));
        assert_eq!(*transition, Some(1.5));
        assert_eq!(
            entity.state_json(),
            json!({"on": true, "brightness": 128})
        );
    }

    #[tokio::test]
    async fn turn_off_keeps_last_brightness() {
        let session = MockSession::new();
        let entity = entity(&session);

        entity.handle_state_changed(&StateChangedEvent {
            unique_id: "light-1".to_string(),
            platform: Platform::Light,
            device_ieee: None,
            group_id: None,
            state: json!({"on": true, "brightness": 200}),
        });

        entity.invoke(EntityCommand::TurnOff).await.unwrap();
        assert_eq!(
            entity.state_json(),
            json!({"on": false, "brightness": 200})
        );
    }
}
