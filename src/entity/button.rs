use async_trait::async_trait;
use serde_json::{Value, json};

use zrt::event::StateChangedEvent;

use crate::error::ApiResult;

use super::{EntityCommand, EntityCore, PlatformEntity, unsupported};

/// Stateless action trigger (identify, reset, ...).
pub struct ButtonEntity {
    core: EntityCore,
}

impl ButtonEntity {
    #[must_use]
    pub const fn new(core: EntityCore) -> Self {
        Self { core }
    }

    async fn press(&self) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .buttons()
            .press(self.core.entity_ref())
            .await?;
        self.core.ensure_accepted("press", &response)?;
        Ok(())
    }
}

#[async_trait]
impl PlatformEntity for ButtonEntity {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    /* buttons have no state to render */
    fn state_json(&self) -> Value {
        json!({})
    }

    fn handle_state_changed(&self, _event: &StateChangedEvent) {}

    async fn invoke(&self, command: EntityCommand) -> ApiResult<()> {
        match command {
            EntityCommand::Press => self.press().await,
            EntityCommand::Refresh => Ok(()),
            other => unsupported(&self.core, &other),
        }
    }
}
