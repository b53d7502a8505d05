//! Per-session mutual exclusion for cart read-modify-write sequences.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::{Mutex, OwnedMutexGuard};

use greenhouse_core::SessionId;

/// One async mutex per active session.
///
/// Idle locks are evicted after 10 minutes. Cart saves are version-checked,
/// so a lock evicted while held degrades to a save conflict.
#[derive(Clone)]
pub struct SessionLocks {
    locks: Cache<SessionId, Arc<Mutex<()>>>,
}

impl SessionLocks {
    #[must_use]
    pub fn new() -> Self {
        let locks = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(Duration::from_secs(600))
            .build();
        Self { locks }
    }

    /// Wait for exclusive access to `session_id`'s cart.
    pub async fn acquire(&self, session_id: &SessionId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .get_with_by_ref(session_id, async { Arc::new(Mutex::new(())) })
            .await;
        lock.lock_owned().await
    }
}

impl Default for SessionLocks {
    fn default() -> Self {
        Self::new()
    }
}
