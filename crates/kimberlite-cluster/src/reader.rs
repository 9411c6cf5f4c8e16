//! Public contract of the cluster-state reader (`spec.md` §4.2):
//! `watch`, `getCollection`, `waitForState`, `requestUpdate`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use kimberlite_coordination::{CoordinationStore, WatchEvent};
use kimberlite_types::{
    cluster::{Collection, NodeName},
    CollectionName,
};
use tokio::sync::{mpsc, RwLock};

use crate::error::{Error, Result};
use crate::paths::{full_doc_path, live_nodes_root, state_updates_path};
use crate::worker::{self, notify_for, FetchRequest, NotifyMap, ProjectionMap};

/// Live projection of watched collections, fed by a single coalescing
/// fetch-queue worker task (`spec.md` §4.2, component C2).
#[derive(Clone)]
pub struct ClusterStateReader {
    store: Arc<dyn CoordinationStore>,
    projections: ProjectionMap,
    notifies: NotifyMap,
    live_nodes: Arc<RwLock<HashSet<NodeName>>>,
    request_tx: mpsc::Sender<FetchRequest>,
    watched: Arc<StdMutex<HashSet<CollectionName>>>,
}

impl ClusterStateReader {
    /// Spawns the fetch-queue worker and returns a handle to it.
    pub fn spawn(store: Arc<dyn CoordinationStore>) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let projections: ProjectionMap = Arc::new(RwLock::new(HashMap::new()));
        let notifies: NotifyMap = Arc::new(StdMutex::new(HashMap::new()));

        tokio::spawn(worker::run(rx, store.clone(), projections.clone(), notifies.clone()));

        Self {
            store,
            projections,
            notifies,
            live_nodes: Arc::new(RwLock::new(HashSet::new())),
            request_tx: tx,
            watched: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    /// Starts receiving updates for `collection`. Idempotent: a second
    /// call for an already-watched collection is a no-op.
    pub async fn watch(&self, collection: &CollectionName) {
        {
            let mut watched = self.watched.lock().expect("watched-set lock poisoned");
            if !watched.insert(collection.clone()) {
                return;
            }
        }
        self.request_update(collection.clone(), false).await.ok();
        self.refresh_live_nodes().await;

        let reader = self.clone();
        let collection = collection.clone();
        tokio::spawn(async move { reader.watch_loop(collection).await });
    }

    /// One-shot watches are re-registered after every fire (`spec.md`
    /// §4.1/§4.2), driving both the full-document path and the
    /// state-updates path into the same fetch-request channel.
    async fn watch_loop(&self, collection: CollectionName) {
        loop {
            let full_watch = self.store.watch(&full_doc_path(&collection)).await;
            let delta_watch = self.store.watch(&state_updates_path(&collection)).await;
            let (Ok(full_watch), Ok(delta_watch)) = (full_watch, delta_watch) else {
                tracing::warn!(%collection, "failed to register cluster-state watch, stopping");
                return;
            };

            let event = tokio::select! {
                ev = full_watch.changed() => ev.map(|e| (e, false)),
                ev = delta_watch.changed() => ev.map(|e| (e, true)),
            };

            match event {
                Ok((WatchEvent::SessionExpired, _)) => {
                    tracing::warn!(%collection, "coordination session expired, stopping watch loop");
                    return;
                }
                Ok((_, just_states)) => {
                    if self.request_update(collection.clone(), just_states).await.is_err() {
                        return;
                    }
                }
                Err(_) => {
                    tracing::warn!(%collection, "cluster-state watch channel closed");
                    return;
                }
            }
        }
    }

    async fn refresh_live_nodes(&self) {
        if let Ok(names) = self.store.children(live_nodes_root()).await {
            let mut live = self.live_nodes.write().await;
            *live = names.into_iter().map(NodeName::new).collect();
        }
    }

    /// Lock-free (read-locked) snapshot of the latest projection.
    pub async fn get_collection(&self, name: &CollectionName) -> Option<Collection> {
        self.projections
            .read()
            .await
            .get(name)
            .map(|p| p.collection.clone())
    }

    pub async fn live_nodes(&self) -> HashSet<NodeName> {
        self.live_nodes.read().await.clone()
    }

    /// Enqueues a fetch. `just_states = false` requests the full
    /// structural document; `true` requests only the state-updates delta.
    pub async fn request_update(&self, name: CollectionName, just_states: bool) -> Result<()> {
        self.request_tx
            .send(FetchRequest {
                collection: name,
                just_states,
            })
            .await
            .map_err(|_| Error::WorkerGone)
    }

    /// Blocks until `predicate(live_nodes, collection)` is true or
    /// `timeout` elapses, re-evaluating on every projection change
    /// (`spec.md` §4.2).
    pub async fn wait_for_state<P>(
        &self,
        name: &CollectionName,
        timeout: Duration,
        mut predicate: P,
    ) -> Result<()>
    where
        P: FnMut(&HashSet<NodeName>, Option<&Collection>) -> bool,
    {
        let notify = notify_for(&self.notifies, name);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Arm the notification *before* checking the predicate so a
            // change that lands between the check and the wait is never
            // missed.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let projections = self.projections.read().await;
                let collection = projections.get(name).map(|p| &p.collection);
                let live = self.live_nodes.read().await;
                if predicate(&live, collection) {
                    return Ok(());
                }
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(Error::WaitForStateTimeout(name.to_string()));
            }

            tokio::select! {
                () = &mut notified => continue,
                () = tokio::time::sleep(remaining) => {
                    return Err(Error::WaitForStateTimeout(name.to_string()));
                }
            }
        }
    }
}
