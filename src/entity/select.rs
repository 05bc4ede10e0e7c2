use async_trait::async_trait;
use serde_json::{Value, json};

use zrt::event::StateChangedEvent;
use zrt::state::{self, SelectState};

use crate::error::{ApiError, ApiResult};
use crate::model::Cached;

use super::{EntityCommand, EntityCore, PlatformEntity, initial_state, unsupported};

/// Enumerated option selector (siren tones, strobe modes, ...).
///
/// The option list is fixed at construction from the descriptor; an
/// option outside that list is refused locally without a round-trip.
pub struct SelectEntity {
    core: EntityCore,
    state: Cached<SelectState>,
}

impl SelectEntity {
    #[must_use]
    pub fn new(core: EntityCore) -> Self {
        let state = Cached::new(initial_state(core.descriptor()));
        Self { core, state }
    }

    fn options(&self) -> &[String] {
        self.core
            .descriptor()
            .options
            .as_deref()
            .unwrap_or_default()
    }

    async fn select_option(&self, option: String) -> ApiResult<()> {
        if !self.options().iter().any(|known| *known == option) {
            return Err(ApiError::service_error(format!(
                "option {option:?} is not valid for {}",
                self.core.unique_id()
            )));
        }

        let response = self
            .core
            .controller()
            .selects()
            .select_option(self.core.entity_ref(), option.clone())
            .await?;
        self.core.ensure_accepted("select_option", &response)?;
        if self.core.still_attached() {
            self.state.update(|current| current.state = Some(option));
            self.core.write_state(&self.state_json());
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformEntity for SelectEntity {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn state_json(&self) -> Value {
        json!({
            "state": self.state.get().state,
            "options": self.options(),
        })
    }

    fn handle_state_changed(&self, event: &StateChangedEvent) {
        let incoming: SelectState = state::decode(&event.state);
        self.state.update(|current| {
            if incoming.state.is_some() {
                current.state = incoming.state;
            }
        });
        self.core.write_state(&self.state_json());
    }

    async fn invoke(&self, command: EntityCommand) -> ApiResult<()> {
        match command {
            EntityCommand::SelectOption { option } => self.select_option(option).await,
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

    use super::SelectEntity;

    fn entity(session: &std::sync::Arc<MockSession>) -> SelectEntity {
        let parent = device_parent(session);
        let mut desc = descriptor(Platform::Select, "DefaultToneSelectEntity", "select-1");
        desc.options = Some(vec!["Burglar".to_string(), "Fire".to_string()]);
        SelectEntity::new(EntityCore::new(parent, desc))
    }

    #[tokio::test]
    async fn valid_option_is_sent_and_cached() {
        let session = MockSession::new();
        let entity = entity(&session);

        entity
            .invoke(EntityCommand::SelectOption {
                option: "Fire".to_string(),
            })
            .await
            .unwrap();

        let requests = session.requests();
        let [CommandRequest::SelectOption { option, .. }] = requests.as_slice() else {
            panic!("unexpected commands: {requests:?}");
        };
        assert_eq!(option, "Fire");
        assert_eq!(entity.state_json()["state"], json!("Fire"));
    }

    #[tokio::test]
    async fn unknown_option_is_refused_locally() {
        let session = MockSession::new();
        let entity = entity(&session);

        let result = entity
            .invoke(EntityCommand::SelectOption {
                option: "Disco".to_string(),
            })
            .await;

        assert!(result.is_err());
        assert!(session.requests().is_empty());
    }
}
