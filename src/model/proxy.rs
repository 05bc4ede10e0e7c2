//! Cached views of runtime devices and groups.
//!
//! Proxies are the bridge-side stand-ins for objects the runtime owns.
//! They hold the last model snapshot received on the socket, so host
//! lookups never block on a round-trip.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

use zrt::command::EntityRef;
use zrt::model::{DeviceModel, Eui64, GroupModel};

use crate::gateway::client::Controller;
use crate::model::Cached;

/// Counts entities still attached to the host for one proxy.
///
/// Removal must not complete while any adapter is still live: each
/// attach registers here, each detach resolves, and the removal path
/// waits for the count to reach zero.
#[derive(Debug, Default)]
pub struct RemovalTracker {
    pending: AtomicUsize,
    done: Notify,
}

impl RemovalTracker {
    pub fn register(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    pub fn resolve(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.done.notify_waiters();
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until all registered entities have resolved.
    ///
    /// Returns immediately when nothing is pending. The permit is
    /// acquired before the counter is read, so a resolve racing with
    /// this call cannot be missed.
    pub async fn wait(&self) {
        loop {
            let notified = self.done.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Bridge-side cache of one runtime device.
pub struct DeviceProxy {
    ieee: Eui64,
    model: Cached<DeviceModel>,
    controller: Controller,
    removal: RemovalTracker,
}

impl DeviceProxy {
    #[must_use]
    pub fn new(model: DeviceModel, controller: Controller) -> Arc<Self> {
        Arc::new(Self {
            ieee: model.ieee,
            model: Cached::new(model),
            controller,
            removal: RemovalTracker::default(),
        })
    }

    #[must_use]
    pub const fn ieee(&self) -> Eui64 {
        self.ieee
    }

    #[must_use]
    pub fn is_coordinator(&self) -> bool {
        self.model.get().is_coordinator()
    }

    /// Display name, falling back to the IEEE address.
    #[must_use]
    pub fn name(&self) -> String {
        self.model
            .get()
            .name
            .unwrap_or_else(|| self.ieee.to_string())
    }

    #[must_use]
    pub fn available(&self) -> bool {
        self.model.get().available
    }

    pub fn set_available(&self, available: bool) {
        self.model.update(|model| model.available = available);
    }

    #[must_use]
    pub fn model(&self) -> DeviceModel {
        self.model.get()
    }

    pub fn update_model(&self, model: DeviceModel) {
        debug_assert_eq!(model.ieee, self.ieee);
        self.model.set(model);
    }

    #[must_use]
    pub const fn controller(&self) -> &Controller {
        &self.controller
    }

    #[must_use]
    pub const fn removal(&self) -> &RemovalTracker {
        &self.removal
    }
}

/// Bridge-side cache of one runtime group.
pub struct GroupProxy {
    id: u16,
    model: Cached<GroupModel>,
    controller: Controller,
    removal: RemovalTracker,
}

impl GroupProxy {
    #[must_use]
    pub fn new(model: GroupModel, controller: Controller) -> Arc<Self> {
        Arc::new(Self {
            id: model.id,
            model: Cached::new(model),
            controller,
            removal: RemovalTracker::default(),
        })
    }

    #[must_use]
    pub const fn id(&self) -> u16 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.model.get().name
    }

    #[must_use]
    pub fn model(&self) -> GroupModel {
        self.model.get()
    }

    pub fn update_model(&self, model: GroupModel) {
        debug_assert_eq!(model.id, self.id);
        self.model.set(model);
    }

    #[must_use]
    pub const fn controller(&self) -> &Controller {
        &self.controller
    }

    #[must_use]
    pub const fn removal(&self) -> &RemovalTracker {
        &self.removal
    }
}

/// The owner of a platform entity: either a device or a group.
#[derive(Clone)]
pub enum ParentHandle {
    Device(Arc<DeviceProxy>),
    Group(Arc<GroupProxy>),
}

impl ParentHandle {
    #[must_use]
    pub fn controller(&self) -> &Controller {
        match self {
            Self::Device(device) => device.controller(),
            Self::Group(group) => group.controller(),
        }
    }

    #[must_use]
    pub fn removal(&self) -> &RemovalTracker {
        match self {
            Self::Device(device) => device.removal(),
            Self::Group(group) => group.removal(),
        }
    }

    /// Wire address for a command against one of our entities.
    #[must_use]
    pub fn entity_ref(&self, unique_id: &str) -> EntityRef {
        match self {
            Self::Device(device) => EntityRef {
                unique_id: unique_id.to_string(),
                ieee: Some(device.ieee()),
                group_id: None,
            },
            Self::Group(group) => EntityRef {
                unique_id: unique_id.to_string(),
                ieee: None,
                group_id: Some(group.id()),
            },
        }
    }

    /// Groups have no availability tracking and always report `true`.
    #[must_use]
    pub fn available(&self) -> bool {
        match self {
            Self::Device(device) => device.available(),
            Self::Group(_) => true,
        }
    }

    #[must_use]
    pub const fn device(&self) -> Option<&Arc<DeviceProxy>> {
        match self {
            Self::Device(device) => Some(device),
            Self::Group(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::RemovalTracker;

    #[tokio::test]
    async fn wait_returns_immediately_when_nothing_pending() {
        let tracker = RemovalTracker::default();
        tokio::time::timeout(Duration::from_millis(100), tracker.wait())
            .await
            .expect("wait should not block with zero pending");
    }

    #[tokio::test]
    async fn wait_blocks_until_all_resolved() {
        let tracker = Arc::new(RemovalTracker::default());
        tracker.register();
        tracker.register();
        assert_eq!(tracker.pending(), 2);

        let waiter = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.wait().await }
        });

        tracker.resolve();
        assert!(!waiter.is_finished());

        tracker.resolve();
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("wait should finish after last resolve")
            .unwrap();
    }
}
