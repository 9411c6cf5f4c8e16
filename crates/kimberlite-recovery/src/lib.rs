//! The `RecoveryStrategy` state machine (`spec.md` §4.7, component C7):
//! orchestrates a single replica's recovery attempt end-to-end, including
//! retries, leader re-checks, and the final `ACTIVE`/`RECOVERY_FAILED`
//! publish.
//!
//! This crate is the seam where C2 (cluster state), C3 (update log), C5
//! (PeerSync), C6 (full fetch), C8 (election/prep-recovery), and C9
//! (state publisher) all meet; see [`strategy::recover`] for the
//! top-level entry point.

mod backoff;
mod config;
mod locks;
mod outcome;
mod strategy;
mod traits;

pub use config::RecoveryConfig;
pub use locks::RecoveryLockTable;
pub use outcome::{PhaseError, RecoveryOutcome};
pub use strategy::{recover, RecoveryHandles, RecoveryRequest};
pub use traits::{
    BackgroundReplication, HttpLeaderClients, IndexWriterControl, LeaderClients,
    NoopBackgroundReplication, NoopIndexWriterControl,
};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kimberlite_cluster::ClusterStateReader;
    use kimberlite_coordination::{CoordinationStore, InMemoryStore, NodeVersion};
    use kimberlite_election::{PrepRecoveryHandle, PrepRecoveryRequest, PrepRecoveryResponse};
    use kimberlite_fingerprint::{CommittedIndexView, Fingerprint, AT_HEAD};
    use kimberlite_full_fetch::LeaderReplicationHandle;
    use kimberlite_full_fetch::wire::RemoteFile;
    use kimberlite_peer_sync::LeaderHandle;
    use kimberlite_types::{Collection, CollectionName, NodeName, Replica, ReplicaId, ReplicaKind, ReplicaState, Shard, ShardId, Version};
    use kimberlite_update_log::{LogRecord, OpKind, UpdateLog, VersionSpec};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    fn leader_replica(base_url: &str) -> Replica {
        Replica::new(
            ReplicaId::new(1),
            "core_node1",
            NodeName::new("node1:8983_solr"),
            base_url,
            ReplicaKind::Nrt,
            ShardId::new("shard1"),
        )
    }

    fn follower_replica() -> Replica {
        let mut r = Replica::new(
            ReplicaId::new(2),
            "core_node2",
            NodeName::new("node2:8983_solr"),
            "http://node2:8983/solr",
            ReplicaKind::Nrt,
            ShardId::new("shard1"),
        );
        r.state = ReplicaState::Down;
        r
    }

    async fn seed_collection(store: &Arc<dyn CoordinationStore>) {
        let shard_id = ShardId::new("shard1");
        let mut shard = Shard::new(shard_id.clone());
        let mut leader = leader_replica("http://leader:8983/solr");
        leader.state = ReplicaState::Leader;
        shard.replicas.insert(ReplicaId::new(1), leader);
        shard.replicas.insert(ReplicaId::new(2), follower_replica());
        shard.leader = Some(ReplicaId::new(1));
        let mut collection = Collection::new(CollectionName::new("c1"));
        collection.shards.insert(shard_id, shard);

        store
            .set_data(
                "/collections/c1/state.json",
                serde_json::to_vec(&collection).unwrap(),
                NodeVersion::INITIAL,
            )
            .await
            .unwrap();
    }

    struct FakeLeaderClients {
        peer_sync: Arc<dyn LeaderHandle>,
        replication: Arc<dyn LeaderReplicationHandle>,
        prep: Arc<dyn PrepRecoveryHandle>,
    }

    impl LeaderClients for FakeLeaderClients {
        fn peer_sync_handle(&self, _base_url: &str) -> Arc<dyn LeaderHandle> {
            self.peer_sync.clone()
        }
        fn replication_handle(&self, _base_url: &str) -> Arc<dyn LeaderReplicationHandle> {
            self.replication.clone()
        }
        fn prep_recovery_handle(&self, _base_url: &str) -> Arc<dyn PrepRecoveryHandle> {
            self.prep.clone()
        }
    }

    struct AlwaysAckPrep;

    #[async_trait]
    impl PrepRecoveryHandle for AlwaysAckPrep {
        async fn prep_recovery(
            &self,
            _request: &PrepRecoveryRequest,
        ) -> kimberlite_election::Result<PrepRecoveryResponse> {
            Ok(PrepRecoveryResponse { success: true })
        }
    }

    struct FakeIndex {
        docs: Mutex<Vec<(u64, Version)>>,
    }

    impl CommittedIndexView for FakeIndex {
        fn documents_up_to(&self, max_version_specified: i64) -> Vec<(u64, Version)> {
            self.docs
                .lock()
                .unwrap()
                .iter()
                .copied()
                .filter(|(_, v)| v.as_i64() <= max_version_specified)
                .collect()
        }
    }

    struct FakePeerSyncLeader {
        versions: Vec<Version>,
        fingerprint: Fingerprint,
        updates: HashMap<i64, LogRecord>,
    }

    #[async_trait]
    impl LeaderHandle for FakePeerSyncLeader {
        async fn recent_versions_and_fingerprint(
            &self,
            n_updates: usize,
        ) -> kimberlite_peer_sync::Result<(Vec<Version>, Fingerprint)> {
            let mut v = self.versions.clone();
            v.truncate(n_updates);
            Ok((v, self.fingerprint))
        }

        async fn get_updates(&self, spec: &VersionSpec) -> kimberlite_peer_sync::Result<Vec<LogRecord>> {
            let VersionSpec::List(versions) = spec else {
                panic!("test fake only supports List specs");
            };
            Ok(versions
                .iter()
                .filter_map(|v| self.updates.get(&v.as_i64()).cloned())
                .collect())
        }

        async fn fingerprint(&self, _max_version: i64) -> kimberlite_peer_sync::Result<Fingerprint> {
            Ok(self.fingerprint)
        }
    }

    struct UnreachableReplication;

    #[async_trait]
    impl LeaderReplicationHandle for UnreachableReplication {
        async fn commit(&self) -> kimberlite_full_fetch::Result<()> {
            Ok(())
        }
        async fn list_files(&self, _skip: bool) -> kimberlite_full_fetch::Result<Vec<RemoteFile>> {
            Ok(Vec::new())
        }
        async fn fetch_file(&self, _name: &str, _offset: u64) -> kimberlite_full_fetch::Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    /// Scenario S-recovery-1: an NRT replica catches up via PeerSync and
    /// reaches `ACTIVE` in one attempt.
    #[tokio::test]
    async fn recovers_via_peer_sync_on_the_happy_path() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
        seed_collection(&store).await;
        let cluster = ClusterStateReader::spawn(store.clone());
        let name = CollectionName::new("c1");
        cluster.watch(&name).await;
        cluster
            .wait_for_state(&name, Duration::from_secs(2), |_l, c| c.is_some())
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let update_log = UpdateLog::open(
            dir.path(),
            vec![LogRecord::new(Version::new(100), OpKind::Add, vec![])],
        );

        let mut updates = HashMap::new();
        updates.insert(101, LogRecord::new(Version::new(101), OpKind::Add, vec![]));
        let leader_fp = Fingerprint::compute(
            &FakeIndex {
                docs: Mutex::new(vec![(1, Version::new(100)), (2, Version::new(101))]),
            },
            AT_HEAD,
        );
        let peer_sync_leader: Arc<dyn LeaderHandle> = Arc::new(FakePeerSyncLeader {
            versions: vec![Version::new(101), Version::new(100)],
            fingerprint: leader_fp,
            updates,
        });

        let local_index: Arc<dyn CommittedIndexView> = Arc::new(FakeIndex {
            docs: Mutex::new(vec![(1, Version::new(100)), (2, Version::new(101))]),
        });

        let publisher = kimberlite_state_publisher::StatePublisher::spawn(store.clone(), Duration::from_millis(20));

        let handles = RecoveryHandles {
            cluster,
            update_log,
            local_index,
            state_publisher: publisher,
            leader_clients: Arc::new(FakeLeaderClients {
                peer_sync: peer_sync_leader,
                replication: Arc::new(UnreachableReplication),
                prep: Arc::new(AlwaysAckPrep),
            }),
            index_writer: Arc::new(NoopIndexWriterControl),
            background_replication: Arc::new(NoopBackgroundReplication),
            dest_dir: dir.path().join("index"),
            locks: RecoveryLockTable::new(),
        };

        let request = RecoveryRequest {
            collection: CollectionName::new("c1"),
            shard_id: ShardId::new("shard1"),
            replica_id: ReplicaId::new(2),
            replica_kind: ReplicaKind::Nrt,
            core_name: "core_node2".to_string(),
            config: RecoveryConfig::default(),
        };

        let outcome = recover(&handles, &request, tokio_util::sync::CancellationToken::new()).await;
        assert_eq!(outcome, RecoveryOutcome::Recovered);
    }

    #[tokio::test]
    async fn stops_immediately_when_this_replica_is_already_the_leader() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
        let shard_id = ShardId::new("shard1");
        let mut shard = Shard::new(shard_id.clone());
        let mut me = follower_replica();
        me.id = ReplicaId::new(2);
        me.state = ReplicaState::Leader;
        shard.replicas.insert(ReplicaId::new(2), me);
        shard.leader = Some(ReplicaId::new(2));
        let mut collection = Collection::new(CollectionName::new("c1"));
        collection.shards.insert(shard_id.clone(), shard);
        store
            .set_data(
                "/collections/c1/state.json",
                serde_json::to_vec(&collection).unwrap(),
                NodeVersion::INITIAL,
            )
            .await
            .unwrap();

        let cluster = ClusterStateReader::spawn(store.clone());
        let name = CollectionName::new("c1");
        cluster.watch(&name).await;
        cluster
            .wait_for_state(&name, Duration::from_secs(2), |_l, c| c.is_some())
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let update_log = UpdateLog::open(dir.path(), Vec::new());
        let publisher = kimberlite_state_publisher::StatePublisher::spawn(store.clone(), Duration::from_millis(20));

        let handles = RecoveryHandles {
            cluster,
            update_log,
            local_index: Arc::new(FakeIndex { docs: Mutex::new(Vec::new()) }),
            state_publisher: publisher,
            leader_clients: Arc::new(FakeLeaderClients {
                peer_sync: Arc::new(FakePeerSyncLeader {
                    versions: Vec::new(),
                    fingerprint: Fingerprint::compute(&FakeIndex { docs: Mutex::new(Vec::new()) }, AT_HEAD),
                    updates: HashMap::new(),
                }),
                replication: Arc::new(UnreachableReplication),
                prep: Arc::new(AlwaysAckPrep),
            }),
            index_writer: Arc::new(NoopIndexWriterControl),
            background_replication: Arc::new(NoopBackgroundReplication),
            dest_dir: dir.path().join("index"),
            locks: RecoveryLockTable::new(),
        };

        let request = RecoveryRequest {
            collection: CollectionName::new("c1"),
            shard_id: ShardId::new("shard1"),
            replica_id: ReplicaId::new(2),
            replica_kind: ReplicaKind::Nrt,
            core_name: "core_node2".to_string(),
            config: RecoveryConfig::default(),
        };

        let outcome = recover(&handles, &request, tokio_util::sync::CancellationToken::new()).await;
        assert_eq!(outcome, RecoveryOutcome::SkippedIsLeader);
    }
}
