//! Synchronization and event routing for one runtime connection.
//!
//! The backend owns the proxy cache and the adapter map for a single
//! runtime server. It performs the initial full enumeration, keeps the
//! caches in step with runtime events, and routes entity state changes
//! to the adapter that owns them.

pub mod client;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use itertools::Itertools;
use tokio::sync::broadcast::error::RecvError;

use zrt::event::{RuntimeEvent, StateChangedEvent};
use zrt::model::{DeviceModel, Eui64, GroupModel};

use crate::entity::{DynEntity, build_entity};
use crate::error::{ApiError, ApiResult};
use crate::gateway::client::Controller;
use crate::model::proxy::{DeviceProxy, GroupProxy, ParentHandle};
use crate::platform::{DeviceRecords, Dispatcher, EntityContext, HostSignal};
use crate::registry::registry;

pub struct GatewayBackend {
    name: String,
    controller: Controller,
    devices: HashMap<Eui64, Arc<DeviceProxy>>,
    groups: HashMap<u16, Arc<GroupProxy>>,
    /// Adapter map, keyed by unique id. The key set is the idempotence
    /// guard: an entity already present is never rebuilt.
    entities: HashMap<String, DynEntity>,
    records: DeviceRecords,
    dispatcher: Dispatcher,
    context: EntityContext,
    coordinator_name: String,
}

impl GatewayBackend {
    #[must_use]
    pub fn new(
        name: String,
        controller: Controller,
        dispatcher: Dispatcher,
        context: EntityContext,
        coordinator_name: String,
    ) -> Self {
        Self {
            name,
            controller,
            devices: HashMap::new(),
            groups: HashMap::new(),
            entities: HashMap::new(),
            records: DeviceRecords::new(),
            dispatcher,
            context,
            coordinator_name,
        }
    }

    #[must_use]
    pub const fn controller(&self) -> &Controller {
        &self.controller
    }

    #[must_use]
    pub fn entity(&self, unique_id: &str) -> Option<&DynEntity> {
        self.entities.get(unique_id)
    }

    #[must_use]
    pub const fn records(&self) -> &DeviceRecords {
        &self.records
    }

    /// Full enumeration: fetch the device and group inventories, build
    /// adapters for everything new, then attach and announce them.
    ///
    /// All staging happens before the first attach, so a failed fetch
    /// leaves the host completely untouched.
    pub async fn run_sync(&mut self) -> ApiResult<()> {
        let devices = self.controller.load_devices().await?;
        let groups = self.controller.load_groups().await?;
        log::info!(
            "{}: enumerated {} devices, {} groups",
            self.name,
            devices.len(),
            groups.len()
        );

        let mut fresh = Vec::new();
        for device in devices.into_values() {
            fresh.extend(self.sync_device(device));
        }
        for group in groups.into_values() {
            fresh.extend(self.sync_group(group));
        }

        self.attach_and_publish(fresh.clone());
        self.refresh_missing(&fresh).await;
        Ok(())
    }

    /// Ingest one device model. Returns only adapters that did not
    /// exist before; calling this again with the same model yields
    /// nothing.
    fn sync_device(&mut self, device: DeviceModel) -> Vec<DynEntity> {
        let proxy = match self.devices.entry(device.ieee) {
            Entry::Occupied(entry) => {
                entry.get().update_model(device.clone());
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry
                .insert(DeviceProxy::new(device.clone(), self.controller.clone()))
                .clone(),
        };

        let fallback_name = if device.is_coordinator() {
            self.coordinator_name.clone()
        } else {
            device.ieee.to_string()
        };
        self.records.get_or_create(&device, &fallback_name);

        let parent = ParentHandle::Device(proxy);
        self.build_new_entities(&parent, device.entities.values())
    }

    fn sync_group(&mut self, group: GroupModel) -> Vec<DynEntity> {
        let proxy = match self.groups.entry(group.id) {
            Entry::Occupied(entry) => {
                entry.get().update_model(group.clone());
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry
                .insert(GroupProxy::new(group.clone(), self.controller.clone()))
                .clone(),
        };

        let parent = ParentHandle::Group(proxy);
        self.build_new_entities(&parent, group.entities.values())
    }

    fn build_new_entities<'a>(
        &mut self,
        parent: &ParentHandle,
        descriptors: impl Iterator<Item = &'a zrt::model::EntityDescriptor>,
    ) -> Vec<DynEntity> {
        let mut fresh = Vec::new();
        for descriptor in descriptors {
            if self.entities.contains_key(&descriptor.unique_id) {
                continue;
            }

            let kind = registry().lookup(descriptor.platform, &descriptor.class_name);
            let Some(entity) = build_entity(kind, parent, descriptor) else {
                log::warn!(
                    "{}: skipping {}: no adapter for {:?} class {:?}",
                    self.name,
                    descriptor.unique_id,
                    descriptor.platform,
                    descriptor.class_name
                );
                continue;
            };

            self.entities
                .insert(descriptor.unique_id.clone(), entity.clone());
            fresh.push(entity);
        }
        fresh
    }

    /// Attach adapters to the host and announce them, one signal per
    /// platform. No signal is published for an empty batch.
    fn attach_and_publish(&self, fresh: Vec<DynEntity>) {
        for entity in &fresh {
            entity.attach(self.context.clone());
        }
        for (platform, entities) in fresh
            .into_iter()
            .into_group_map_by(|entity| entity.platform())
        {
            self.dispatcher
                .publish(HostSignal::EntitiesAdded { platform, entities });
        }
    }

    /// Ask the runtime to publish state for entities that came without
    /// a snapshot, so they leave "unknown" as soon as possible.
    async fn refresh_missing(&self, fresh: &[DynEntity]) {
        for entity in fresh {
            if entity.core().descriptor().state.is_none() {
                if let Err(err) = entity.core().refresh().await {
                    log::warn!(
                        "{}: state refresh failed for {}: {err}",
                        self.name,
                        entity.unique_id()
                    );
                }
            }
        }
    }

    /// Tear down one device: detach its adapters, wait for every
    /// detachment to settle, then drop the record and announce the
    /// removal.
    async fn remove_device(&mut self, ieee: Eui64) {
        let Some(proxy) = self.devices.remove(&ieee) else {
            return;
        };

        let mut removed = Vec::new();
        self.entities.retain(|_, entity| {
            let owned = entity
                .core()
                .parent()
                .device()
                .is_some_and(|device| device.ieee() == ieee);
            if owned {
                removed.push(entity.clone());
            }
            !owned
        });

        for entity in &removed {
            entity.detach();
        }
        proxy.removal().wait().await;

        self.records.remove(ieee);
        self.dispatcher.publish(HostSignal::DeviceRemoved { ieee });
        log::info!(
            "{}: removed device {ieee} ({} entities)",
            self.name,
            removed.len()
        );
    }

    async fn remove_group(&mut self, group_id: u16) {
        let Some(proxy) = self.groups.remove(&group_id) else {
            return;
        };

        let mut removed = Vec::new();
        self.entities.retain(|_, entity| {
            let owned = match entity.core().parent() {
                ParentHandle::Group(group) => group.id() == group_id,
                ParentHandle::Device(_) => false,
            };
            if owned {
                removed.push(entity.clone());
            }
            !owned
        });

        for entity in &removed {
            entity.detach();
        }
        proxy.removal().wait().await;
        log::info!("{}: removed group {group_id}", self.name);
    }

    fn route_state_changed(&self, event: &StateChangedEvent) {
        if let Some(entity) = self.entities.get(&event.unique_id) {
            entity.handle_state_changed(event);
        } else {
            log::debug!(
                "{}: state change for unknown entity {}",
                self.name,
                event.unique_id
            );
        }
    }

    fn set_device_availability(&self, ieee: Eui64, available: bool) {
        if let Some(proxy) = self.devices.get(&ieee) {
            proxy.set_available(available);
        }
    }

    pub async fn handle_event(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::DeviceJoined { ieee, nwk } => {
                /* entities only exist after the interview completes */
                log::info!("{}: device {ieee} joining (nwk {nwk:#06x})", self.name);
            }
            RuntimeEvent::DeviceFullyInitialized { device } => {
                let fresh = self.sync_device(device);
                self.attach_and_publish(fresh.clone());
                self.refresh_missing(&fresh).await;
            }
            RuntimeEvent::DeviceLeft { ieee } | RuntimeEvent::DeviceRemoved { ieee } => {
                self.remove_device(ieee).await;
            }
            RuntimeEvent::DeviceOffline { ieee } => {
                self.set_device_availability(ieee, false);
            }
            RuntimeEvent::DeviceOnline { ieee } => {
                self.set_device_availability(ieee, true);
            }
            RuntimeEvent::GroupAdded { group } => {
                let fresh = self.sync_group(group);
                self.attach_and_publish(fresh);
            }
            RuntimeEvent::GroupRemoved { group_id } => {
                self.remove_group(group_id).await;
            }
            RuntimeEvent::PlatformEntityStateChanged(event) => {
                self.route_state_changed(&event);
            }
            RuntimeEvent::Unknown => {
                log::debug!("{}: ignoring unknown runtime event", self.name);
            }
        }
    }

    /// Run until the connection drops: full sync, then the event loop.
    ///
    /// A lagged event subscription triggers a resync instead of
    /// guessing which updates were lost.
    pub async fn run(&mut self) -> ApiResult<()> {
        let mut events = self.controller.events();
        self.run_sync().await?;

        loop {
            match events.recv().await {
                Ok(event) => self.handle_event(event).await,
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("{}: dropped {missed} runtime events, resyncing", self.name);
                    self.run_sync().await?;
                }
                Err(RecvError::Closed) => {
                    return Err(ApiError::not_ready("runtime connection lost"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use zrt::command::CommandResponse;
    use zrt::event::{RuntimeEvent, StateChangedEvent};
    use zrt::model::DeviceModel;
    use zrt::platform::Platform;

    use crate::entity::testing::RecordingWriter;
    use crate::gateway::client::testing::MockSession;
    use crate::platform::{Dispatcher, EntityContext, HostSignal};

    use super::GatewayBackend;

    const SWITCH_ID: &str = "00:0d:6f:00:0a:bc:de:f0-1-6";
    const SENSOR_ID: &str = "00:0d:6f:00:0a:bc:de:f0-1-1026";

    fn device(ieee: &str, nwk: u16) -> DeviceModel {
        serde_json::from_value(json!({
            "ieee": ieee,
            "nwk": nwk,
            "name": "Test device",
            "entities": {
                SWITCH_ID: {
                    "platform": "switch",
                    "class_name": "Switch",
                    "unique_id": SWITCH_ID,
                    "name": "Switch",
                    "state": {"state": false},
                },
                SENSOR_ID: {
                    "platform": "sensor",
                    "class_name": "Temperature",
                    "unique_id": SENSOR_ID,
                    "name": "Temperature",
                    "state": {"state": 20.0},
                },
            },
        }))
        .unwrap()
    }

    fn backend(session: &Arc<MockSession>) -> (GatewayBackend, Arc<RecordingWriter>, Dispatcher) {
        let writer = RecordingWriter::new();
        let dispatcher = Dispatcher::new();
        let backend = GatewayBackend::new(
            "test".to_string(),
            session.controller(),
            dispatcher.clone(),
            EntityContext::new(writer.clone()),
            "Zigbee Coordinator".to_string(),
        );
        (backend, writer, dispatcher)
    }

    fn inventory_response(devices: serde_json::Value) -> CommandResponse {
        let mut response = CommandResponse::ok(1);
        response.data.insert("devices".to_string(), devices);
        response
    }

    #[tokio::test]
    async fn full_sync_builds_and_attaches_entities() {
        let session = MockSession::new();
        let ieee = "00:0d:6f:00:0a:bc:de:f0";
        session.enqueue(inventory_response(json!({ieee: device(ieee, 0x1234)})));

        let (mut backend, writer, dispatcher) = backend(&session);
        let mut signals = dispatcher.subscribe();

        backend.run_sync().await.unwrap();

        assert!(backend.entity(SWITCH_ID).is_some());
        assert!(backend.entity(SENSOR_ID).is_some());
        /* both adapters rendered their initial state on attach */
        assert_eq!(writer.states().len(), 2);

        let mut platforms = Vec::new();
        while let Ok(signal) = signals.try_recv() {
            if let HostSignal::EntitiesAdded { platform, .. } = &*signal {
                platforms.push(*platform);
            }
        }
        platforms.sort_by_key(|p| format!("{p:?}"));
        assert_eq!(platforms, vec![Platform::Sensor, Platform::Switch]);
    }

    #[tokio::test]
    async fn repeated_initialization_is_idempotent() {
        let session = MockSession::new();
        let ieee = "00:0d:6f:00:0a:bc:de:f0";
        session.enqueue(inventory_response(json!({ieee: device(ieee, 0x1234)})));

        let (mut backend, _writer, dispatcher) = backend(&session);
        backend.run_sync().await.unwrap();
        let mut signals = dispatcher.subscribe();

        backend
            .handle_event(RuntimeEvent::DeviceFullyInitialized {
                device: device(ieee, 0x1234),
            })
            .await;

        /* nothing new: no signal, same adapter set */
        assert!(signals.try_recv().is_err());
        assert!(backend.entity(SWITCH_ID).is_some());
    }

    #[tokio::test]
    async fn unregistered_class_is_skipped_not_fatal() {
        let session = MockSession::new();
        let ieee = "00:0d:6f:00:0a:bc:de:f0";
        session.enqueue(inventory_response(json!({
            ieee: {
                "ieee": ieee,
                "nwk": 0x4242,
                "entities": {
                    "odd-1": {
                        "platform": "switch",
                        "class_name": "QuantumToggle",
                        "unique_id": "odd-1",
                        "name": "Odd",
                    },
                    "ok-1": {
                        "platform": "switch",
                        "class_name": "Switch",
                        "unique_id": "ok-1",
                        "name": "Fine",
                    },
                },
            },
        })));

        let (mut backend, _writer, _dispatcher) = backend(&session);
        backend.run_sync().await.unwrap();

        assert!(backend.entity("odd-1").is_none());
        assert!(backend.entity("ok-1").is_some());
    }

    #[tokio::test]
    async fn devices_without_entities_publish_no_batches() {
        let session = MockSession::new();
        session.enqueue(inventory_response(json!({
            "00:0d:6f:00:0a:bc:de:f0": {"ieee": "00:0d:6f:00:0a:bc:de:f0", "nwk": 0x0001},
            "00:0d:6f:00:0a:bc:de:f1": {"ieee": "00:0d:6f:00:0a:bc:de:f1", "nwk": 0x0002},
        })));

        let (mut backend, _writer, dispatcher) = backend(&session);
        let mut signals = dispatcher.subscribe();
        backend.run_sync().await.unwrap();

        assert!(signals.try_recv().is_err());
        /* the device records still exist for host lookups */
        assert_eq!(backend.records().len(), 2);
    }

    #[tokio::test]
    async fn coordinator_record_uses_configured_name() {
        let session = MockSession::new();
        let ieee = "00:0d:6f:00:00:00:00:01";
        session.enqueue(inventory_response(json!({
            ieee: {"ieee": ieee, "nwk": 0x0000},
        })));

        let (mut backend, _writer, _dispatcher) = backend(&session);
        backend.run_sync().await.unwrap();

        let record = backend.records().get(ieee.parse().unwrap()).unwrap();
        assert_eq!(record.name, "Zigbee Coordinator");
    }

    #[tokio::test]
    async fn removal_detaches_before_announcing() {
        let session = MockSession::new();
        let ieee = "00:0d:6f:00:0a:bc:de:f0";
        session.enqueue(inventory_response(json!({ieee: device(ieee, 0x1234)})));

        let (mut backend, _writer, dispatcher) = backend(&session);
        backend.run_sync().await.unwrap();
        let mut signals = dispatcher.subscribe();

        let eui = ieee.parse().unwrap();
        tokio::time::timeout(
            Duration::from_millis(200),
            backend.handle_event(RuntimeEvent::DeviceRemoved { ieee: eui }),
        )
        .await
        .expect("removal must not hang once all entities detached");

        assert!(backend.entity(SWITCH_ID).is_none());
        assert_eq!(backend.records().len(), 0);

        let signal = signals.try_recv().unwrap();
        assert!(matches!(&*signal, HostSignal::DeviceRemoved { ieee } if *ieee == eui));
    }

    #[tokio::test]
    async fn state_changes_route_to_the_owning_adapter() {
        let session = MockSession::new();
        let ieee = "00:0d:6f:00:0a:bc:de:f0";
        session.enqueue(inventory_response(json!({ieee: device(ieee, 0x1234)})));

        let (mut backend, writer, _dispatcher) = backend(&session);
        backend.run_sync().await.unwrap();

        backend
            .handle_event(RuntimeEvent::PlatformEntityStateChanged(
                StateChangedEvent {
                    unique_id: SWITCH_ID.to_string(),
                    platform: Platform::Switch,
                    device_ieee: Some(ieee.parse().unwrap()),
                    group_id: None,
                    state: json!({"state": true}),
                },
            ))
            .await;

        assert_eq!(writer.last(), Some(json!({"state": true})));
    }

    #[tokio::test]
    async fn offline_event_flips_availability() {
        let session = MockSession::new();
        let ieee = "00:0d:6f:00:0a:bc:de:f0";
        session.enqueue(inventory_response(json!({ieee: device(ieee, 0x1234)})));

        let (mut backend, _writer, _dispatcher) = backend(&session);
        backend.run_sync().await.unwrap();

        let eui: zrt::model::Eui64 = ieee.parse().unwrap();
        backend
            .handle_event(RuntimeEvent::DeviceOffline { ieee: eui })
            .await;
        assert!(!backend.devices[&eui].available());

        backend
            .handle_event(RuntimeEvent::DeviceOnline { ieee: eui })
            .await;
        assert!(backend.devices[&eui].available());
    }
}
