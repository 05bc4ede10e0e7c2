use async_trait::async_trait;
use serde_json::{Value, json};

use zrt::event::StateChangedEvent;
use zrt::state::{self, SensorState};

use crate::error::ApiResult;
use crate::model::Cached;

use super::{EntityCommand, EntityCore, PlatformEntity, initial_state, unsupported};

/// Numeric or text sensor.
///
/// The value is passed through untyped; unit and device class are
/// descriptor metadata and rendered alongside the value so the host
/// never has to re-fetch the descriptor.
pub struct SensorEntity {
    core: EntityCore,
    state: Cached<SensorState>,
}

impl SensorEntity {
    #[must_use]
    pub fn new(core: EntityCore) -> Self {
        let state = Cached::new(initial_state(core.descriptor()));
        Self { core, state }
    }
}

#[async_trait]
impl PlatformEntity for SensorEntity {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn state_json(&self) -> Value {
        let descriptor = self.core.descriptor();
        json!({
            "state": self.state.get().state,
            "unit_of_measurement": descriptor.unit_of_measurement,
            "device_class": descriptor.device_class,
        })
    }

    fn handle_state_changed(&self, event: &StateChangedEvent) {
        let incoming: SensorState = state::decode(&event.state);
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
