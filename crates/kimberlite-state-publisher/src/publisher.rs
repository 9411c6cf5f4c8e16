//! Coalescing state-transition publisher (`spec.md` §4.9, component C9).
//!
//! A recovery attempt moves a replica through several states in quick
//! succession (`DOWN` -> `RECOVERING` -> `BUFFERING` -> ... -> `ACTIVE`).
//! Writing each transition straight to the coordination store would mean
//! one versioned `setData` per hop; instead this publisher buffers
//! transitions in memory and flushes "only the latest state per replica"
//! on a timer, trading a little publish latency for far fewer round
//! trips under churn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kimberlite_coordination::{CoordinationError, CoordinationStore, NodeVersion};
use kimberlite_types::cluster::{CollectionName, ReplicaId, ReplicaState};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::wire::StateDelta;

/// Default interval between coalesced flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

type PendingKey = (CollectionName, ReplicaId);

/// Handle to a running publisher worker. Cloning shares the same
/// channel and background task.
#[derive(Clone)]
pub struct StatePublisher {
    tx: mpsc::UnboundedSender<(PendingKey, ReplicaState)>,
}

impl StatePublisher {
    /// Spawns the coalescing worker against `store`, flushing at most
    /// once per `flush_interval`.
    pub fn spawn(store: Arc<dyn CoordinationStore>, flush_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(store, flush_interval, rx));
        Self { tx }
    }

    /// Queues a replica state transition for the next flush. Only the
    /// most recent call for a given `(collection, replica)` pair before
    /// a flush survives to be written.
    pub fn publish(
        &self,
        collection: CollectionName,
        replica: ReplicaId,
        new_state: ReplicaState,
    ) -> Result<()> {
        self.tx
            .send(((collection, replica), new_state))
            .map_err(|_| Error::WorkerGone)
    }

    /// Convenience for the common election-time call:
    /// `spec.md` §4.8 "the latter is also used during election to
    /// declare leadership."
    pub fn publish_leader(&self, collection: CollectionName, replica: ReplicaId) -> Result<()> {
        self.publish(collection, replica, ReplicaState::Leader)
    }
}

async fn run_worker(
    store: Arc<dyn CoordinationStore>,
    flush_interval: Duration,
    mut rx: mpsc::UnboundedReceiver<(PendingKey, ReplicaState)>,
) {
    let mut pending: HashMap<PendingKey, ReplicaState> = HashMap::new();
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some((key, state)) => {
                        pending.insert(key, state);
                    }
                    None => {
                        flush(&store, std::mem::take(&mut pending)).await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                if !pending.is_empty() {
                    flush(&store, std::mem::take(&mut pending)).await;
                }
            }
        }
    }
}

/// Groups the coalesced buffer by collection and writes each
/// collection's delta blob with a single CAS retry on version
/// mismatch, matching `spec.md` §4.1's "optimistic `setData`, retry
/// once the caller re-reads the current version" pattern used
/// throughout this workspace.
async fn flush(store: &Arc<dyn CoordinationStore>, pending: HashMap<PendingKey, ReplicaState>) {
    let mut by_collection: HashMap<CollectionName, Vec<(ReplicaId, ReplicaState)>> = HashMap::new();
    for ((collection, replica), state) in pending {
        by_collection.entry(collection).or_default().push((replica, state));
    }

    for (collection, entries) in by_collection {
        if let Err(err) = publish_one(store, &collection, &entries).await {
            tracing::warn!(collection = %collection, %err, "failed to publish state-updates delta");
        }
    }
}

async fn publish_one(
    store: &Arc<dyn CoordinationStore>,
    collection: &CollectionName,
    entries: &[(ReplicaId, ReplicaState)],
) -> Result<()> {
    let path = state_updates_path(collection);

    let mut delta = StateDelta::default();
    for (replica, state) in entries {
        delta.insert(*replica, *state);
    }
    if delta.is_empty() {
        return Ok(());
    }
    let bytes = delta.to_json().expect("StateDelta serializes infallibly");

    let expected = match store.exists(&path).await? {
        Some(version) => version,
        None => NodeVersion::INITIAL,
    };

    match store.set_data(&path, bytes.clone(), expected).await {
        Ok(_) => Ok(()),
        Err(CoordinationError::VersionMismatch { .. }) => {
            let (_, current) = store.get(&path).await?;
            store.set_data(&path, bytes, current).await?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn state_updates_path(collection: &CollectionName) -> String {
    format!("/collections/{}/state-updates", collection.as_str())
}
