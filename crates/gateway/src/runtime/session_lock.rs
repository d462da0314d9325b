//! Per-session concurrency control.
//!
//! Ensures only one turn runs per session at a time; a second message
//! arriving while a turn is in flight waits for the permit. The same map
//! serializes scheduled-task runs per project (keyed `project:<id>`).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Manages per-key run locks. Each key maps to a `Semaphore(1)`;
/// acquiring the permit gives exclusive access for one turn.
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the run lock for a key. The permit auto-releases on drop,
    /// including on cancellation unwind.
    pub async fn acquire(&self, key: &str) -> OwnedSemaphorePermit {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.acquire_owned()
            .await
            .expect("session lock semaphore is never closed")
    }

    /// Number of tracked keys (for monitoring).
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    /// Drop entries whose permit is currently free.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}
