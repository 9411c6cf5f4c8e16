//! Cross-crate recovery scenarios that only make sense wired across
//! several crates at once (`spec.md` §8: scenarios S3/S5/S6, round-trip
//! properties R1/R3, invariants 2 and 4). Everything that can be proven
//! inside a single crate lives in that crate's own `#[cfg(test)]` module
//! instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use kimberlite_coordination::{CoordinationStore, InMemoryStore};
use kimberlite_election::PrepRecoveryHandle;
use kimberlite_full_fetch::LeaderReplicationHandle;
use kimberlite_peer_sync::LeaderHandle;
use kimberlite_recovery::{
    recover, LeaderClients, NoopBackgroundReplication, NoopIndexWriterControl, RecoveryConfig,
    RecoveryHandles, RecoveryLockTable, RecoveryOutcome, RecoveryRequest,
};
use kimberlite_state_publisher::StatePublisher;
use kimberlite_types::{CollectionName, ReplicaId, ReplicaKind, ReplicaState, ShardId};
use kimberlite_update_log::UpdateLog;

use kimberlite_test_harness::fixtures::{
    elect_new_leader, fingerprint_of, seed_single_shard_collection, FakeIndex, FakeLeader,
};

/// A [`LeaderClients`] factory over a fixed table of fixture leaders
/// keyed by base URL, for scenarios where the leader a replica talks to
/// changes mid-recovery.
struct MapLeaderClients {
    leaders: HashMap<String, Arc<FakeLeader>>,
}

impl MapLeaderClients {
    fn new(leaders: HashMap<String, Arc<FakeLeader>>) -> Arc<Self> {
        Arc::new(Self { leaders })
    }

    fn get(&self, base_url: &str) -> Arc<FakeLeader> {
        self.leaders
            .get(base_url)
            .cloned()
            .unwrap_or_else(|| panic!("no fixture leader registered for {base_url}"))
    }
}

impl LeaderClients for MapLeaderClients {
    fn peer_sync_handle(&self, base_url: &str) -> Arc<dyn LeaderHandle> {
        self.get(base_url)
    }
    fn replication_handle(&self, base_url: &str) -> Arc<dyn LeaderReplicationHandle> {
        self.get(base_url)
    }
    fn prep_recovery_handle(&self, base_url: &str) -> Arc<dyn PrepRecoveryHandle> {
        self.get(base_url)
    }
}

fn fast_retry_config() -> RecoveryConfig {
    RecoveryConfig {
        starting_recovery_delay: Duration::from_millis(30),
        max_retries: 5,
        ..Default::default()
    }
}

async fn state_updates_decoded(
    store: &Arc<dyn CoordinationStore>,
    collection: &str,
) -> Vec<(ReplicaId, ReplicaState)> {
    match store.get(&format!("/collections/{collection}/state-updates")).await {
        Ok((bytes, _)) => kimberlite_state_publisher::wire::StateDelta::decode(&bytes).unwrap(),
        Err(_) => Vec::new(),
    }
}

/// Scenario S3: the leader changes mid-recovery. The first attempt
/// fails against the original leader; by the time the retry loop's
/// `CHECK_LEADER` step runs again, the cluster projection already
/// reflects the new leader, and the second attempt recovers against it.
#[tokio::test]
async fn s3_leader_changes_mid_recovery_restarts_against_new_leader() {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
    seed_single_shard_collection(&store, "c1", "shard1", 1, "http://leader1", 2).await;

    let cluster = kimberlite_cluster::ClusterStateReader::spawn(store.clone());
    let name = CollectionName::new("c1");
    cluster.watch(&name).await;
    cluster
        .wait_for_state(&name, Duration::from_secs(2), |_l, c| c.is_some())
        .await
        .unwrap();

    let fp = fingerprint_of(&[]);
    let leader1 = FakeLeader::new(vec![], fp); // fetch_fails: true by default
    let leader3 = Arc::new(FakeLeader {
        versions: vec![],
        fingerprint: Mutex::new(fp),
        updates: HashMap::new(),
        prep_success: true,
        fetch_fails: false,
    });

    let mut table = HashMap::new();
    table.insert("http://leader1".to_string(), leader1);
    table.insert("http://leader3".to_string(), leader3);
    let leader_clients = MapLeaderClients::new(table);

    let dir = tempfile::tempdir().unwrap();
    let update_log = UpdateLog::open(dir.path(), Vec::new());
    let local_index: Arc<dyn kimberlite_fingerprint::CommittedIndexView> = FakeIndex::new(Vec::new());
    let state_publisher = StatePublisher::spawn(store.clone(), Duration::from_millis(20));

    let handles = RecoveryHandles {
        cluster: cluster.clone(),
        update_log,
        local_index,
        state_publisher,
        leader_clients,
        index_writer: Arc::new(NoopIndexWriterControl),
        background_replication: Arc::new(NoopBackgroundReplication),
        dest_dir: dir.path().join("index"),
        locks: RecoveryLockTable::new(),
    };

    let request = RecoveryRequest {
        collection: name.clone(),
        shard_id: ShardId::new("shard1"),
        replica_id: ReplicaId::new(2),
        replica_kind: ReplicaKind::Nrt,
        core_name: "core_node2".to_string(),
        config: fast_retry_config(),
    };

    let cancel = CancellationToken::new();

    let elect = async {
        tokio::time::sleep(Duration::from_millis(15)).await;
        elect_new_leader(&store, "c1", "shard1", 3, "http://leader3", &[1]).await;
    };

    let (outcome, ()) = tokio::join!(recover(&handles, &request, cancel), elect);

    assert_eq!(outcome, RecoveryOutcome::Recovered);

    let collection = cluster.get_collection(&name).await.unwrap();
    let shard = collection.shards.get(&ShardId::new("shard1")).unwrap();
    assert_eq!(shard.leader, Some(ReplicaId::new(3)));

    tokio::time::sleep(Duration::from_millis(60)).await;
    let delta = state_updates_decoded(&store, "c1").await;
    assert!(delta.contains(&(ReplicaId::new(2), ReplicaState::Active)));
}

/// Scenario S5: recovery is cancelled while waiting to retry. The
/// attempt exits with `AbortedClosing` and never publishes `ACTIVE`.
#[tokio::test]
async fn s5_recovery_aborted_by_close() {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
    seed_single_shard_collection(&store, "c1", "shard1", 1, "http://leader1", 2).await;

    let cluster = kimberlite_cluster::ClusterStateReader::spawn(store.clone());
    let name = CollectionName::new("c1");
    cluster.watch(&name).await;
    cluster
        .wait_for_state(&name, Duration::from_secs(2), |_l, c| c.is_some())
        .await
        .unwrap();

    let leader = FakeLeader::new(vec![], fingerprint_of(&[])); // fetch always fails
    let mut table = HashMap::new();
    table.insert("http://leader1".to_string(), leader);
    let leader_clients = MapLeaderClients::new(table);

    let dir = tempfile::tempdir().unwrap();
    let update_log = UpdateLog::open(dir.path(), Vec::new());
    let local_index: Arc<dyn kimberlite_fingerprint::CommittedIndexView> = FakeIndex::new(Vec::new());
    let state_publisher = StatePublisher::spawn(store.clone(), Duration::from_millis(20));

    let handles = RecoveryHandles {
        cluster,
        update_log,
        local_index,
        state_publisher,
        leader_clients,
        index_writer: Arc::new(NoopIndexWriterControl),
        background_replication: Arc::new(NoopBackgroundReplication),
        dest_dir: dir.path().join("index"),
        locks: RecoveryLockTable::new(),
    };

    let mut config = fast_retry_config();
    config.starting_recovery_delay = Duration::from_millis(300);
    let request = RecoveryRequest {
        collection: name,
        shard_id: ShardId::new("shard1"),
        replica_id: ReplicaId::new(2),
        replica_kind: ReplicaKind::Nrt,
        core_name: "core_node2".to_string(),
        config,
    };

    let cancel = CancellationToken::new();
    let closer = {
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        }
    };

    let (outcome, ()) = tokio::join!(recover(&handles, &request, cancel), closer);
    assert_eq!(outcome, RecoveryOutcome::AbortedClosing);

    let delta = state_updates_decoded(&store, "c1").await;
    assert!(!delta.contains(&(ReplicaId::new(2), ReplicaState::Active)));
}

/// Scenario S6: every attempt fails until `maxRetries` is exhausted.
/// `RECOVERY_FAILED` is published exactly once, and recovery does not
/// retry beyond the configured bound.
#[tokio::test]
async fn s6_exceeded_max_retries_publishes_recovery_failed_once() {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
    seed_single_shard_collection(&store, "c1", "shard1", 1, "http://leader1", 2).await;

    let cluster = kimberlite_cluster::ClusterStateReader::spawn(store.clone());
    let name = CollectionName::new("c1");
    cluster.watch(&name).await;
    cluster
        .wait_for_state(&name, Duration::from_secs(2), |_l, c| c.is_some())
        .await
        .unwrap();

    let leader = FakeLeader::new(vec![], fingerprint_of(&[])); // every full-copy fetch fails
    let mut table = HashMap::new();
    table.insert("http://leader1".to_string(), leader);
    let leader_clients = MapLeaderClients::new(table);

    let dir = tempfile::tempdir().unwrap();
    let update_log = UpdateLog::open(dir.path(), Vec::new());
    let local_index: Arc<dyn kimberlite_fingerprint::CommittedIndexView> = FakeIndex::new(Vec::new());
    let state_publisher = StatePublisher::spawn(store.clone(), Duration::from_millis(20));

    let handles = RecoveryHandles {
        cluster,
        update_log,
        local_index,
        state_publisher,
        leader_clients,
        index_writer: Arc::new(NoopIndexWriterControl),
        background_replication: Arc::new(NoopBackgroundReplication),
        dest_dir: dir.path().join("index"),
        locks: RecoveryLockTable::new(),
    };

    let mut config = fast_retry_config();
    config.max_retries = 3;
    config.starting_recovery_delay = Duration::from_millis(5);
    let request = RecoveryRequest {
        collection: name,
        shard_id: ShardId::new("shard1"),
        replica_id: ReplicaId::new(2),
        replica_kind: ReplicaKind::Nrt,
        core_name: "core_node2".to_string(),
        config,
    };

    let outcome = recover(&handles, &request, CancellationToken::new()).await;
    assert_eq!(outcome, RecoveryOutcome::FailedMaxRetries);

    tokio::time::sleep(Duration::from_millis(40)).await;
    let delta = state_updates_decoded(&store, "c1").await;
    assert!(delta.contains(&(ReplicaId::new(2), ReplicaState::RecoveryFailed)));
    assert!(!delta.contains(&(ReplicaId::new(2), ReplicaState::Active)));
}

/// Invariant 2: `ACTIVE` is never published without a preceding
/// successful fetch. A PULL replica whose every `REPLICATE_ONLY` fetch
/// fails ends in `RECOVERY_FAILED`, never `ACTIVE`.
#[tokio::test]
async fn invariant2_active_requires_a_successful_fetch() {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
    seed_single_shard_collection(&store, "c1", "shard1", 1, "http://leader1", 2).await;

    let cluster = kimberlite_cluster::ClusterStateReader::spawn(store.clone());
    let name = CollectionName::new("c1");
    cluster.watch(&name).await;
    cluster
        .wait_for_state(&name, Duration::from_secs(2), |_l, c| c.is_some())
        .await
        .unwrap();

    let leader = FakeLeader::new(vec![], fingerprint_of(&[])); // fetch_fails: true
    let mut table = HashMap::new();
    table.insert("http://leader1".to_string(), leader);
    let leader_clients = MapLeaderClients::new(table);

    let dir = tempfile::tempdir().unwrap();
    let update_log = UpdateLog::open(dir.path(), Vec::new());
    let local_index: Arc<dyn kimberlite_fingerprint::CommittedIndexView> = FakeIndex::new(Vec::new());
    let state_publisher = StatePublisher::spawn(store.clone(), Duration::from_millis(20));

    let handles = RecoveryHandles {
        cluster,
        update_log,
        local_index,
        state_publisher,
        leader_clients,
        index_writer: Arc::new(NoopIndexWriterControl),
        background_replication: Arc::new(NoopBackgroundReplication),
        dest_dir: dir.path().join("index"),
        locks: RecoveryLockTable::new(),
    };

    let mut config = fast_retry_config();
    config.max_retries = 1;
    let request = RecoveryRequest {
        collection: name,
        shard_id: ShardId::new("shard1"),
        replica_id: ReplicaId::new(2),
        replica_kind: ReplicaKind::Pull,
        core_name: "core_node2".to_string(),
        config,
    };

    let outcome = recover(&handles, &request, CancellationToken::new()).await;
    assert_eq!(outcome, RecoveryOutcome::FailedMaxRetries);

    tokio::time::sleep(Duration::from_millis(40)).await;
    let delta = state_updates_decoded(&store, "c1").await;
    assert!(!delta.contains(&(ReplicaId::new(2), ReplicaState::Active)));
}

/// Invariant 4: for a single (collection, replica) key, a newer
/// state-updates version never loses to an older one in the projection,
/// even across several rapid transitions.
#[tokio::test]
async fn invariant4_newer_state_updates_version_always_wins() {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
    seed_single_shard_collection(&store, "c1", "shard1", 1, "http://leader1", 2).await;

    let cluster = kimberlite_cluster::ClusterStateReader::spawn(store.clone());
    let name = CollectionName::new("c1");
    cluster.watch(&name).await;
    cluster
        .wait_for_state(&name, Duration::from_secs(2), |_l, c| c.is_some())
        .await
        .unwrap();

    let publisher = StatePublisher::spawn(store.clone(), Duration::from_millis(15));
    let replica = ReplicaId::new(2);

    let transitions = [
        ReplicaState::Recovering,
        ReplicaState::Buffering,
        ReplicaState::Active,
        ReplicaState::Down,
        ReplicaState::Recovering,
    ];

    for expected in transitions {
        publisher.publish(name.clone(), replica, expected).unwrap();
        cluster
            .wait_for_state(&name, Duration::from_secs(2), |_l, c| {
                c.and_then(|c| c.find_replica(replica))
                    .map(|(_, r)| r.state == expected)
                    .unwrap_or(false)
            })
            .await
            .unwrap();

        // The projection must show exactly the transition just
        // published, never an earlier one racing back in.
        let collection = cluster.get_collection(&name).await.unwrap();
        let (_, found) = collection.find_replica(replica).unwrap();
        assert_eq!(found.state, expected);
    }
}

/// R1: running recovery twice in a row on a replica that is already
/// caught up converges to the same `ACTIVE` outcome both times.
#[tokio::test]
async fn r1_rerunning_recovery_on_an_already_caught_up_replica_is_a_noop() {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
    seed_single_shard_collection(&store, "c1", "shard1", 1, "http://leader1", 2).await;

    let cluster = kimberlite_cluster::ClusterStateReader::spawn(store.clone());
    let name = CollectionName::new("c1");
    cluster.watch(&name).await;
    cluster
        .wait_for_state(&name, Duration::from_secs(2), |_l, c| c.is_some())
        .await
        .unwrap();

    let leader = Arc::new(FakeLeader {
        versions: vec![],
        fingerprint: Mutex::new(fingerprint_of(&[])),
        updates: HashMap::new(),
        prep_success: true,
        fetch_fails: false,
    });
    let mut table = HashMap::new();
    table.insert("http://leader1".to_string(), leader);
    let leader_clients = MapLeaderClients::new(table);

    let dir = tempfile::tempdir().unwrap();
    let update_log = UpdateLog::open(dir.path(), Vec::new());
    let local_index: Arc<dyn kimberlite_fingerprint::CommittedIndexView> = FakeIndex::new(Vec::new());
    let state_publisher = StatePublisher::spawn(store.clone(), Duration::from_millis(20));

    let handles = RecoveryHandles {
        cluster,
        update_log,
        local_index,
        state_publisher,
        leader_clients,
        index_writer: Arc::new(NoopIndexWriterControl),
        background_replication: Arc::new(NoopBackgroundReplication),
        dest_dir: dir.path().join("index"),
        locks: RecoveryLockTable::new(),
    };

    let request = RecoveryRequest {
        collection: name,
        shard_id: ShardId::new("shard1"),
        replica_id: ReplicaId::new(2),
        replica_kind: ReplicaKind::Nrt,
        core_name: "core_node2".to_string(),
        config: fast_retry_config(),
    };

    let first = recover(&handles, &request, CancellationToken::new()).await;
    assert_eq!(first, RecoveryOutcome::Recovered);
    tokio::time::sleep(Duration::from_millis(40)).await;
    let after_first = state_updates_decoded(&store, "c1").await;
    assert!(after_first.contains(&(ReplicaId::new(2), ReplicaState::Active)));

    let second = recover(&handles, &request, CancellationToken::new()).await;
    assert_eq!(second, RecoveryOutcome::Recovered);
    tokio::time::sleep(Duration::from_millis(40)).await;
    let after_second = state_updates_decoded(&store, "c1").await;
    assert!(after_second.contains(&(ReplicaId::new(2), ReplicaState::Active)));
}

/// R3: publishing `LEADER`, then `ACTIVE`, then `LEADER` again converges
/// the projection back to `LEADER`.
#[tokio::test]
async fn r3_publishing_leader_then_active_then_leader_converges_to_leader() {
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
    seed_single_shard_collection(&store, "c1", "shard1", 1, "http://leader1", 2).await;

    let cluster = kimberlite_cluster::ClusterStateReader::spawn(store.clone());
    let name = CollectionName::new("c1");
    cluster.watch(&name).await;
    cluster
        .wait_for_state(&name, Duration::from_secs(2), |_l, c| c.is_some())
        .await
        .unwrap();

    let publisher = StatePublisher::spawn(store.clone(), Duration::from_millis(15));
    let replica = ReplicaId::new(2);
    let shard_id = ShardId::new("shard1");

    publisher.publish_leader(name.clone(), replica).unwrap();
    cluster
        .wait_for_state(&name, Duration::from_secs(2), |_l, c| {
            c.and_then(|c| c.shards.get(&shard_id).map(|s| s.leader == Some(replica)))
                .unwrap_or(false)
        })
        .await
        .unwrap();

    publisher.publish(name.clone(), replica, ReplicaState::Active).unwrap();
    cluster
        .wait_for_state(&name, Duration::from_secs(2), |_l, c| {
            c.and_then(|c| c.find_replica(replica))
                .map(|(_, r)| r.state == ReplicaState::Active)
                .unwrap_or(false)
        })
        .await
        .unwrap();
    let mid = cluster.get_collection(&name).await.unwrap();
    assert_eq!(mid.shards.get(&shard_id).unwrap().leader, None);

    publisher.publish_leader(name.clone(), replica).unwrap();
    cluster
        .wait_for_state(&name, Duration::from_secs(2), |_l, c| {
            c.and_then(|c| c.shards.get(&shard_id).map(|s| s.leader == Some(replica)))
                .unwrap_or(false)
        })
        .await
        .unwrap();

    let final_collection = cluster.get_collection(&name).await.unwrap();
    let shard = final_collection.shards.get(&shard_id).unwrap();
    assert_eq!(shard.leader, Some(replica));
    assert_eq!(shard.replicas.get(&replica).unwrap().state, ReplicaState::Leader);
}
