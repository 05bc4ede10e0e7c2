use async_trait::async_trait;
use serde_json::{Value, json};

use zrt::event::StateChangedEvent;
use zrt::state::{self, UpdateState};

use crate::error::ApiResult;
use crate::model::Cached;

use super::{EntityCommand, EntityCore, PlatformEntity, initial_state, unsupported};

/// Firmware update status for one device.
///
/// Read-only in this bridge: the runtime drives the update itself and
/// reports progress through the regular event path.
pub struct UpdateEntity {
    core: EntityCore,
    state: Cached<UpdateState>,
}

impl UpdateEntity {
    #[must_use]
    pub fn new(core: EntityCore) -> Self {
        let state = Cached::new(initial_state(core.descriptor()));
        Self { core, state }
    }
}

#[async_trait]
impl PlatformEntity for UpdateEntity {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn state_json(&self) -> Value {
        let state = self.state.get();
        json!({
            "installed_version": state.installed_version,
            "latest_version": state.latest_version,
            "in_progress": state.in_progress,
            "progress": state.progress,
        })
    }

    fn handle_state_changed(&self, event: &StateChangedEvent) {
        let incoming: UpdateState = state::decode(&event.state);
        self.state.update(|current| {
            if incoming.installed_version.is_some() {
                current.installed_version = incoming.installed_version;
            }
            if incoming.latest_version.is_some() {
                current.latest_version = incoming.latest_version;
            }
            if incoming.in_progress.is_some() {
                current.in_progress = incoming.in_progress;
            }
            if incoming.progress.is_some() {
                current.progress = incoming.progress;
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
