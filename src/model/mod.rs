pub mod proxy;

use std::sync::Mutex;

/// Small poison-tolerant cell for denormalized state copies.
///
/// All writers run on the bridge event loop and all critical sections
/// are short; the mutex only exists so host-side readers can take
/// synchronous snapshots.
#[derive(Debug, Default)]
pub struct Cached<T>(Mutex<T>);

impl<T: Clone> Cached<T> {
    pub const fn new(value: T) -> Self {
        Self(Mutex::new(value))
    }

    pub fn get(&self) -> T {
        match self.0.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, value: T) {
        self.update(|slot| *slot = value);
    }

    pub fn update(&self, func: impl FnOnce(&mut T)) {
        match self.0.lock() {
            Ok(mut guard) => func(&mut guard),
            Err(poisoned) => func(&mut poisoned.into_inner()),
        }
    }
}
