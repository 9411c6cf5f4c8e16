//! Process-wide recovery host: the long-lived resources a single node
//! shares across every replica's recovery attempts.
//!
//! `spec.md` §5 calls out the coordination-store client and the HTTP
//! client pool as resources shared across all recovery attempts on a
//! node, and the cluster-state projection as fan-out broadcast from a
//! single fetch-queue worker (`spec.md` §3, "Ownership"). `RecoveryHost`
//! is where those shared handles live; callers construct one per node and
//! call [`RecoveryHost::recover`] once per replica that needs to catch up.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use kimberlite_cluster::ClusterStateReader;
use kimberlite_coordination::CoordinationStore;
use kimberlite_fingerprint::CommittedIndexView;
use kimberlite_recovery::{
    BackgroundReplication, HttpLeaderClients, IndexWriterControl, LeaderClients,
    NoopBackgroundReplication, NoopIndexWriterControl, RecoveryHandles, RecoveryLockTable,
    RecoveryOutcome, RecoveryRequest,
};
use kimberlite_state_publisher::StatePublisher;
use kimberlite_update_log::UpdateLog;

/// Shared recovery resources for one node: the coordination-store client,
/// the cluster-state fetch-queue worker, the state publisher, and the
/// leader-client factory that turns a base URL into HTTP handles.
///
/// Every replica on the node recovers through the same `RecoveryHost`; the
/// update log, local index view, and per-replica recovery lock are
/// supplied fresh for each call since those are owned by the replica's
/// core, not the node (`spec.md` §3, "Ownership").
#[derive(Clone)]
pub struct RecoveryHost {
    cluster: ClusterStateReader,
    state_publisher: StatePublisher,
    leader_clients: Arc<dyn LeaderClients>,
    locks: RecoveryLockTable,
}

impl RecoveryHost {
    /// Spawns the cluster-state fetch-queue worker and the state
    /// publisher's flush loop, and wires them to `reqwest`-backed leader
    /// clients.
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self::with_leader_clients(store, Arc::new(HttpLeaderClients::default()))
    }

    /// As [`RecoveryHost::new`], but with a caller-supplied
    /// [`LeaderClients`] factory — tests substitute fakes here.
    pub fn with_leader_clients(
        store: Arc<dyn CoordinationStore>,
        leader_clients: Arc<dyn LeaderClients>,
    ) -> Self {
        let cluster = ClusterStateReader::spawn(store.clone());
        let state_publisher =
            StatePublisher::spawn(store, kimberlite_state_publisher::DEFAULT_FLUSH_INTERVAL);
        Self {
            cluster,
            state_publisher,
            leader_clients,
            locks: RecoveryLockTable::new(),
        }
    }

    /// The shared cluster-state projection, for callers that need to
    /// `watch` a collection or read it directly outside of recovery.
    pub fn cluster(&self) -> &ClusterStateReader {
        &self.cluster
    }

    /// The shared state publisher, for callers that need to announce a
    /// transition outside of a recovery attempt (e.g. declaring
    /// leadership after winning an election).
    pub fn state_publisher(&self) -> &StatePublisher {
        &self.state_publisher
    }

    /// Runs one replica's recovery attempt end-to-end
    /// (`spec.md` §4.7/§2), using this host's shared cluster reader,
    /// state publisher, and leader-client factory.
    #[allow(clippy::too_many_arguments)]
    pub async fn recover(
        &self,
        request: RecoveryRequest,
        update_log: UpdateLog,
        local_index: Arc<dyn CommittedIndexView>,
        dest_dir: PathBuf,
        cancel: CancellationToken,
    ) -> RecoveryOutcome {
        self.recover_with(
            request,
            update_log,
            local_index,
            dest_dir,
            Arc::new(NoopIndexWriterControl),
            Arc::new(NoopBackgroundReplication),
            cancel,
        )
        .await
    }

    /// As [`RecoveryHost::recover`], with explicit index-writer and
    /// background-replication controls for replica kinds that need them
    /// (`spec.md` §5: quiesce/reopen around a full fetch; §4.7: pause
    /// background replication for PULL replicas).
    #[allow(clippy::too_many_arguments)]
    pub async fn recover_with(
        &self,
        request: RecoveryRequest,
        update_log: UpdateLog,
        local_index: Arc<dyn CommittedIndexView>,
        dest_dir: PathBuf,
        index_writer: Arc<dyn IndexWriterControl>,
        background_replication: Arc<dyn BackgroundReplication>,
        cancel: CancellationToken,
    ) -> RecoveryOutcome {
        let handles = RecoveryHandles {
            cluster: self.cluster.clone(),
            update_log,
            local_index,
            state_publisher: self.state_publisher.clone(),
            leader_clients: self.leader_clients.clone(),
            index_writer,
            background_replication,
            dest_dir,
            locks: self.locks.clone(),
        };
        kimberlite_recovery::recover(&handles, &request, cancel).await
    }
}

/// Default poll interval `waitForState`-style callers should use when
/// re-checking whether a replica's recovery has completed out of band
/// (`spec.md` §4.2 guides `waitForState`'s own wait; this is a sane
/// default for that use, not a spec-mandated constant).
pub const DEFAULT_RECOVERY_POLL_INTERVAL: Duration = Duration::from_millis(500);
