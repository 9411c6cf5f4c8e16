//! Per-replica recovery lock (`spec.md` §5: "each replica has at most one
//! outstanding RecoveryStrategy at a time, enforced by a per-core recovery
//! lock").

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use kimberlite_types::cluster::ReplicaId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A table of one `tokio::sync::Mutex` per [`ReplicaId`] that has ever
/// attempted recovery, created lazily on first use.
#[derive(Clone, Default)]
pub struct RecoveryLockTable {
    locks: Arc<StdMutex<HashMap<ReplicaId, Arc<Mutex<()>>>>>,
}

impl RecoveryLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, replica_id: ReplicaId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .expect("recovery lock table mutex poisoned")
            .entry(replica_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquires the lock for `replica_id`, blocking if another recovery
    /// attempt for the same replica is already in flight. The returned
    /// guard releases the lock on drop.
    pub async fn acquire(&self, replica_id: ReplicaId) -> OwnedMutexGuard<()> {
        self.lock_for(replica_id).lock_owned().await
    }
}
