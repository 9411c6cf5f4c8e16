//! The single fetch-queue worker (`spec.md` §4.2).
//!
//! "A single worker owns a queue of fetch requests. It polls with a short
//! wait (≤ 5s), then coalesces everything currently queued into a map
//! {collection → {justStates?}}." For each collection in the batch: if
//! any request asked for structure, fetch the full document and replace;
//! otherwise fetch only the state-updates delta and merge per replica id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kimberlite_coordination::{CoordinationError, CoordinationStore, NodeVersion};
use kimberlite_types::{cluster::Collection, CollectionName};
use tokio::sync::{mpsc, Notify, RwLock};

use crate::paths::{full_doc_path, state_updates_path};

const POLL_WAIT: Duration = Duration::from_secs(5);

/// One queued fetch request. `just_states = false` means "fetch the full
/// structural document"; `true` means "fetch only the state-updates delta".
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub collection: CollectionName,
    pub just_states: bool,
}

/// The live projection of one watched collection, plus the two
/// independent version counters that gate each update path
/// (`spec.md` §3/§4.2).
pub(crate) struct ClusterProjection {
    pub collection: Collection,
    pub full_doc_version: NodeVersion,
    pub state_updates_version: NodeVersion,
}

pub(crate) type ProjectionMap = Arc<RwLock<HashMap<CollectionName, ClusterProjection>>>;
pub(crate) type NotifyMap = Arc<std::sync::Mutex<HashMap<CollectionName, Arc<Notify>>>>;

pub(crate) fn notify_for(notifies: &NotifyMap, name: &CollectionName) -> Arc<Notify> {
    notifies
        .lock()
        .expect("cluster notify map lock poisoned")
        .entry(name.clone())
        .or_insert_with(|| Arc::new(Notify::new()))
        .clone()
}

/// Runs until the request channel closes. Spawned once per
/// [`crate::ClusterStateReader`].
pub(crate) async fn run(
    mut requests: mpsc::Receiver<FetchRequest>,
    store: Arc<dyn CoordinationStore>,
    projections: ProjectionMap,
    notifies: NotifyMap,
) {
    loop {
        // Poll for the first request of a new batch with a ≤5s wait, per
        // §4.2, so the worker also wakes periodically even when idle.
        let first = match tokio::time::timeout(POLL_WAIT, requests.recv()).await {
            Ok(Some(req)) => req,
            Ok(None) => {
                tracing::debug!("fetch queue worker shutting down: channel closed");
                return;
            }
            Err(_elapsed) => continue,
        };

        // Coalesce: fold the first request plus everything else already
        // sitting in the channel into one batch keyed by collection. A
        // later `!just_states` (structural) request wins over an earlier
        // `just_states` one for the same collection in this batch.
        let mut batch: HashMap<CollectionName, bool> = HashMap::new();
        batch.insert(first.collection, !first.just_states);
        while let Ok(req) = requests.try_recv() {
            let wants_structure = batch.entry(req.collection).or_insert(false);
            *wants_structure = *wants_structure || !req.just_states;
        }

        for (collection, wants_structure) in batch {
            process_one(&store, &projections, &notifies, collection, wants_structure).await;
        }
    }
}

async fn process_one(
    store: &Arc<dyn CoordinationStore>,
    projections: &ProjectionMap,
    notifies: &NotifyMap,
    name: CollectionName,
    wants_structure: bool,
) {
    let result = if wants_structure {
        fetch_full_doc(store, projections, &name).await
    } else {
        fetch_state_updates(store, projections, &name).await
    };

    if let Err(err) = result {
        tracing::warn!(collection = %name, error = %err, "cluster-state fetch failed");
        return;
    }

    notify_for(notifies, &name).notify_waiters();
}

async fn fetch_full_doc(
    store: &Arc<dyn CoordinationStore>,
    projections: &ProjectionMap,
    name: &CollectionName,
) -> Result<(), CoordinationError> {
    let (bytes, version) = match store.get(&full_doc_path(name)).await {
        Ok(v) => v,
        Err(CoordinationError::NoNode(_)) => return Ok(()),
        Err(err) => return Err(err),
    };

    let incoming: Collection = match serde_json::from_slice(&bytes) {
        Ok(c) => c,
        Err(err) => {
            tracing::warn!(collection = %name, %err, "malformed collection document, discarding");
            return Ok(());
        }
    };

    let mut projections = projections.write().await;
    match projections.get(name) {
        // Full-doc replacement takes the incoming (version, bytes) iff
        // its version is strictly greater than the one currently held.
        Some(existing) if version <= existing.full_doc_version => {
            tracing::debug!(collection = %name, ?version, current = ?existing.full_doc_version,
                "discarding stale full collection document");
        }
        Some(existing) => {
            projections.insert(
                name.clone(),
                ClusterProjection {
                    collection: incoming,
                    full_doc_version: version,
                    state_updates_version: existing.state_updates_version,
                },
            );
        }
        None => {
            projections.insert(
                name.clone(),
                ClusterProjection {
                    collection: incoming,
                    full_doc_version: version,
                    state_updates_version: NodeVersion::INITIAL,
                },
            );
        }
    }
    Ok(())
}

async fn fetch_state_updates(
    store: &Arc<dyn CoordinationStore>,
    projections: &ProjectionMap,
    name: &CollectionName,
) -> Result<(), CoordinationError> {
    let (bytes, version) = match store.get(&state_updates_path(name)).await {
        Ok(v) => v,
        Err(CoordinationError::NoNode(_)) => return Ok(()),
        Err(err) => return Err(err),
    };

    let mut projections = projections.write().await;
    let Some(projection) = projections.get_mut(name) else {
        // We have no structural placement yet for this collection's
        // replicas; a delta keyed only by replica-id is unusable until
        // the first full document arrives.
        tracing::debug!(collection = %name, "state-updates delta arrived before any full document");
        return Ok(());
    };

    if version <= projection.state_updates_version {
        tracing::debug!(collection = %name, ?version, current = ?projection.state_updates_version,
            "discarding stale state-updates delta");
        return Ok(());
    }

    let delta: HashMap<u64, u8> = match serde_json::from_slice(&bytes) {
        Ok(d) => d,
        Err(err) => {
            tracing::warn!(collection = %name, %err, "malformed state-updates delta, discarding");
            return Ok(());
        }
    };

    for (replica_id_raw, code) in delta {
        let replica_id = kimberlite_types::ReplicaId::new(replica_id_raw);
        let Some(new_state) = kimberlite_types::cluster::ReplicaState::from_code(code) else {
            tracing::warn!(collection = %name, code, "unknown replica state code in delta, skipping");
            continue;
        };
        let Some((shard_id, _)) = projection.collection.find_replica(replica_id) else {
            tracing::debug!(collection = %name, %replica_id,
                "state-updates delta references unknown replica, skipping");
            continue;
        };
        let shard_id = shard_id.clone();
        if let Some(shard) = projection.collection.shards.get_mut(&shard_id) {
            // `Shard::update_replica_state` applies the single-leader
            // demotion rule from §4.2 before the next full refresh.
            shard.update_replica_state(replica_id, new_state);
        }
    }

    projection.state_updates_version = version;
    Ok(())
}
