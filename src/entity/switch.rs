use async_trait::async_trait;
use serde_json::{Value, json};

use zrt::event::StateChangedEvent;
use zrt::state::{self, OnOffState};

use crate::error::ApiResult;
use crate::model::Cached;

use super::{EntityCommand, EntityCore, PlatformEntity, initial_state, unsupported};

/// On/off switch.
pub struct SwitchEntity {
    core: EntityCore,
    state: Cached<OnOffState>,
}

impl SwitchEntity {
    #[must_use]
    pub fn new(core: EntityCore) -> Self {
        let state = Cached::new(initial_state(core.descriptor()));
        Self { core, state }
    }

    async fn turn_on(&self) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .switches()
            .turn_on(self.core.entity_ref())
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
            .switches()
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
impl PlatformEntity for SwitchEntity {
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
            EntityCommand::TurnOn => self.turn_on().await,
            EntityCommand::TurnOff => self.turn_off().await,
            EntityCommand::Refresh => self.core.refresh().await,
            other => unsupported(&self.core, &other),
        }
    }
}
