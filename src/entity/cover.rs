use async_trait::async_trait;
use serde_json::{Value, json};

use zrt::event::StateChangedEvent;
use zrt::state::{self, CoverState};

use crate::error::ApiResult;
use crate::model::Cached;

use super::{EntityCommand, EntityCore, PlatformEntity, initial_state, unsupported};

/// Window covering (blinds, shades, vents).
///
/// The runtime reports lift as 0 = fully open / 100 = fully closed;
/// the host convention is percent-open. The cache keeps the runtime's
/// orientation and the value is inverted exactly once, here at the
/// boundary, in both directions.
pub struct CoverEntity {
    core: EntityCore,
    state: Cached<CoverState>,
}

/// Transitional states reported while a movement is in progress.
const STATE_OPENING: &str = "opening";
const STATE_CLOSING: &str = "closing";
const STATE_OPEN: &str = "open";
const STATE_CLOSED: &str = "closed";

const fn invert(position: u8) -> u8 {
    100u8.saturating_sub(position)
}

impl CoverEntity {
    #[must_use]
    pub fn new(core: EntityCore) -> Self {
        let state = Cached::new(initial_state(core.descriptor()));
        Self { core, state }
    }

    fn apply_transition(&self, transition: &str) {
        self.state
            .update(|current| current.state = Some(transition.to_string()));
        self.core.write_state(&self.state_json());
    }

    async fn open(&self) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .covers()
            .open(self.core.entity_ref())
            .await?;
        self.core.ensure_accepted("open_cover", &response)?;
        if self.core.still_attached() {
            self.apply_transition(STATE_OPENING);
        }
        Ok(())
    }

    async fn close(&self) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .covers()
            .close(self.core.entity_ref())
            .await?;
        self.core.ensure_accepted("close_cover", &response)?;
        if self.core.still_attached() {
            self.apply_transition(STATE_CLOSING);
        }
        Ok(())
    }

    async fn stop(&self) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .covers()
            .stop(self.core.entity_ref())
            .await?;
        self.core.ensure_accepted("stop_cover", &response)?;
        if self.core.still_attached() {
            let settled = if self.state.get().is_closed == Some(true) {
                STATE_CLOSED
            } else {
                STATE_OPEN
            };
            self.apply_transition(settled);
        }
        Ok(())
    }

    /// `position` is percent-open; the wire carries percent-closed.
    async fn set_position(&self, position: u8) -> ApiResult<()> {
        let response = self
            .core
            .controller()
            .covers()
            .set_position(self.core.entity_ref(), invert(position))
            .await?;
        self.core.ensure_accepted("set_cover_position", &response)?;
        if self.core.still_attached() {
            let current = self.state.get().current_position.map(invert);
            let transition = match current {
                Some(current) if position < current => STATE_CLOSING,
                Some(current) if position > current => STATE_OPENING,
                _ => return Ok(()),
            };
            self.apply_transition(transition);
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformEntity for CoverEntity {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn state_json(&self) -> Value {
        let state = self.state.get();
        json!({
            "current_position": state.current_position.map(invert),
            "is_closed": state.is_closed,
            "state": state.state,
        })
    }

    fn handle_state_changed(&self, event: &StateChangedEvent) {
        let incoming: CoverState = state::decode(&event.state);
        self.state.update(|current| {
            if incoming.current_position.is_some() {
                current.current_position = incoming.current_position;
            }
            if incoming.is_closed.is_some() {
                current.is_closed = incoming.is_closed;
            }
            if incoming.state.is_some() {
                current.state = incoming.state;
            }
        });
        self.core.write_state(&self.state_json());
    }

    async fn invoke(&self, command: EntityCommand) -> ApiResult<()> {
        match command {
            EntityCommand::OpenCover => self.open().await,
            EntityCommand::CloseCover => self.close().await,
            EntityCommand::StopCover => self.stop().await,
            EntityCommand::SetCoverPosition { position } => self.set_position(position).await,
            EntityCommand::Refresh => self.core.refresh().await,
            other => unsupported(&self.core, &other),
        }
    }
}
