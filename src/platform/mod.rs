//! Plumbing towards the host entity framework.
//!
//! The host framework itself is an external collaborator; this module
//! only models the contract the bridge consumes from it: a per-entity
//! state writer, device records keyed by IEEE address, and a
//! publish/subscribe dispatcher used to fan out "entities added" and
//! "device removed" signals to the per-platform setup routines.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast::{Receiver, Sender};
use uuid::Uuid;

use zrt::model::{DeviceModel, Eui64};
use zrt::platform::Platform;

use crate::entity::DynEntity;

/// Host hook that re-renders one entity from its current cached state.
pub trait StateWriter: Send + Sync {
    fn write_state(&self, unique_id: &str, state: &Value);
}

/// Default writer for headless operation: render to the log only.
pub struct LogWriter;

impl StateWriter for LogWriter {
    fn write_state(&self, unique_id: &str, state: &Value) {
        log::trace!("State for {unique_id}: {state}");
    }
}

/// Handle given to an adapter when it is attached to the host.
#[derive(Clone)]
pub struct EntityContext {
    pub writer: Arc<dyn StateWriter>,
}

impl EntityContext {
    #[must_use]
    pub fn new(writer: Arc<dyn StateWriter>) -> Self {
        Self { writer }
    }
}

/// Signals fanned out to the per-platform setup routines.
#[derive(Clone)]
pub enum HostSignal {
    EntitiesAdded {
        platform: Platform,
        entities: Vec<DynEntity>,
    },
    DeviceRemoved {
        ieee: Eui64,
    },
}

impl fmt::Debug for HostSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntitiesAdded { platform, entities } => f
                .debug_struct("EntitiesAdded")
                .field("platform", platform)
                .field("entities", &entities.len())
                .finish(),
            Self::DeviceRemoved { ieee } => {
                f.debug_struct("DeviceRemoved").field("ieee", ieee).finish()
            }
        }
    }
}

/// Broadcast-based publish/subscribe for [`HostSignal`]s.
#[derive(Clone)]
pub struct Dispatcher {
    updates: Sender<Arc<HostSignal>>,
}

impl Dispatcher {
    const BUFFER_SIZE: usize = 64;

    #[must_use]
    pub fn new() -> Self {
        Self {
            updates: Sender::new(Self::BUFFER_SIZE),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> Receiver<Arc<HostSignal>> {
        self.updates.subscribe()
    }

    pub fn publish(&self, signal: HostSignal) {
        log::debug!("Host signal: {signal:?}");
        /* a send error only means there are no subscribers right now */
        let _ = self.updates.send(Arc::new(signal));
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// One host-side device record.
#[derive(Clone, Debug)]
pub struct DeviceRecord {
    pub id: Uuid,
    pub ieee: Eui64,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub created: DateTime<Utc>,
}

/// Host device registry, keyed by IEEE address.
#[derive(Debug, Default)]
pub struct DeviceRecords {
    records: HashMap<Eui64, DeviceRecord>,
}

impl DeviceRecords {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record for `device`, or return the existing one.
    pub fn get_or_create(&mut self, device: &DeviceModel, fallback_name: &str) -> &DeviceRecord {
        self.records.entry(device.ieee).or_insert_with(|| {
            let name = device
                .name
                .clone()
                .unwrap_or_else(|| fallback_name.to_string());
            DeviceRecord {
                id: Uuid::new_v4(),
                ieee: device.ieee,
                name,
                manufacturer: device.manufacturer.clone(),
                model: device.model.clone(),
                created: Utc::now(),
            }
        })
    }

    #[must_use]
    pub fn get(&self, ieee: Eui64) -> Option<&DeviceRecord> {
        self.records.get(&ieee)
    }

    pub fn remove(&mut self, ieee: Eui64) -> Option<DeviceRecord> {
        self.records.remove(&ieee)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
