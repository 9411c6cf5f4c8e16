//! Shared fixtures for cross-crate recovery scenarios.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use kimberlite_coordination::{CoordinationStore, NodeVersion};
use kimberlite_election::{PrepRecoveryHandle, PrepRecoveryRequest, PrepRecoveryResponse};
use kimberlite_fingerprint::{CommittedIndexView, Fingerprint, AT_HEAD};
use kimberlite_full_fetch::wire::RemoteFile;
use kimberlite_full_fetch::LeaderReplicationHandle;
use kimberlite_peer_sync::LeaderHandle;
use kimberlite_types::{
    Collection, CollectionName, NodeName, Replica, ReplicaId, ReplicaKind, ReplicaState, Shard,
    ShardId, Version,
};
use kimberlite_update_log::{LogRecord, VersionSpec};

/// An in-memory index whose visible documents can be mutated mid-test,
/// for scenarios that apply updates and then recompute a fingerprint.
pub struct FakeIndex {
    pub docs: Mutex<Vec<(u64, Version)>>,
}

impl FakeIndex {
    pub fn new(docs: Vec<(u64, Version)>) -> Arc<Self> {
        Arc::new(Self { docs: Mutex::new(docs) })
    }
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

/// A leader double that answers PeerSync, full-fetch, and prep-recovery
/// calls from a fixed script. Good enough for scenarios that need one
/// leader behaving consistently across a whole recovery attempt.
pub struct FakeLeader {
    pub versions: Vec<Version>,
    pub fingerprint: Mutex<Fingerprint>,
    pub updates: HashMap<i64, LogRecord>,
    pub prep_success: bool,
    pub fetch_fails: bool,
}

impl FakeLeader {
    pub fn new(versions: Vec<Version>, fingerprint: Fingerprint) -> Arc<Self> {
        Arc::new(Self {
            versions,
            fingerprint: Mutex::new(fingerprint),
            updates: HashMap::new(),
            prep_success: true,
            fetch_fails: true,
        })
    }
}

#[async_trait]
impl LeaderHandle for FakeLeader {
    async fn recent_versions_and_fingerprint(
        &self,
        n_updates: usize,
    ) -> kimberlite_peer_sync::Result<(Vec<Version>, Fingerprint)> {
        let mut v = self.versions.clone();
        v.truncate(n_updates);
        Ok((v, *self.fingerprint.lock().unwrap()))
    }

    async fn get_updates(&self, spec: &VersionSpec) -> kimberlite_peer_sync::Result<Vec<LogRecord>> {
        let VersionSpec::List(versions) = spec else {
            panic!("fixture leader only supports List specs");
        };
        Ok(versions.iter().filter_map(|v| self.updates.get(&v.as_i64()).cloned()).collect())
    }

    async fn fingerprint(&self, _max_version: i64) -> kimberlite_peer_sync::Result<Fingerprint> {
        Ok(*self.fingerprint.lock().unwrap())
    }
}

#[async_trait]
impl LeaderReplicationHandle for FakeLeader {
    async fn commit(&self) -> kimberlite_full_fetch::Result<()> {
        Ok(())
    }
    async fn list_files(&self, _skip: bool) -> kimberlite_full_fetch::Result<Vec<RemoteFile>> {
        if self.fetch_fails {
            Err(kimberlite_full_fetch::Error::Io(std::io::Error::other(
                "fixture leader refuses full-copy requests",
            )))
        } else {
            Ok(Vec::new())
        }
    }
    async fn fetch_file(&self, _name: &str, _offset: u64) -> kimberlite_full_fetch::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl PrepRecoveryHandle for FakeLeader {
    async fn prep_recovery(
        &self,
        _request: &PrepRecoveryRequest,
    ) -> kimberlite_election::Result<PrepRecoveryResponse> {
        Ok(PrepRecoveryResponse { success: self.prep_success })
    }
}

/// Seeds `store` with a single-shard collection whose leader is
/// `leader_id` and whose only follower is `follower_id`, both NRT.
pub async fn seed_single_shard_collection(
    store: &Arc<dyn CoordinationStore>,
    collection: &str,
    shard: &str,
    leader_id: u64,
    leader_base_url: &str,
    follower_id: u64,
) {
    let shard_id = ShardId::new(shard);
    let mut s = Shard::new(shard_id.clone());

    let mut leader = Replica::new(
        ReplicaId::new(leader_id),
        format!("core_node{leader_id}"),
        NodeName::new(format!("node{leader_id}:8983_solr")),
        leader_base_url,
        ReplicaKind::Nrt,
        shard_id.clone(),
    );
    leader.state = ReplicaState::Leader;
    s.replicas.insert(ReplicaId::new(leader_id), leader);

    let mut follower = Replica::new(
        ReplicaId::new(follower_id),
        format!("core_node{follower_id}"),
        NodeName::new(format!("node{follower_id}:8983_solr")),
        format!("http://node{follower_id}:8983/solr"),
        ReplicaKind::Nrt,
        shard_id.clone(),
    );
    follower.state = ReplicaState::Down;
    s.replicas.insert(ReplicaId::new(follower_id), follower);

    s.leader = Some(ReplicaId::new(leader_id));

    let mut coll = Collection::new(CollectionName::new(collection));
    coll.shards.insert(shard_id, s);

    store
        .set_data(
            &format!("/collections/{collection}/state.json"),
            serde_json::to_vec(&coll).unwrap(),
            NodeVersion::INITIAL,
        )
        .await
        .unwrap();
}

/// Re-publishes the collection document with a brand new leader for the
/// same shard, at the next version, simulating an election outcome
/// changing mid-recovery (`spec.md` §8 scenario S3).
pub async fn elect_new_leader(
    store: &Arc<dyn CoordinationStore>,
    collection: &str,
    shard: &str,
    new_leader_id: u64,
    new_leader_base_url: &str,
    keep_replica_ids: &[u64],
) {
    let path = format!("/collections/{collection}/state.json");
    let (bytes, version) = store.get(&path).await.unwrap();
    let mut coll: Collection = serde_json::from_slice(&bytes).unwrap();
    let shard_id = ShardId::new(shard);
    let s = coll.shards.get_mut(&shard_id).expect("shard must already exist");

    for id in keep_replica_ids {
        if let Some(r) = s.replicas.get_mut(&ReplicaId::new(*id)) {
            if r.state == ReplicaState::Leader {
                r.state = ReplicaState::Down;
            }
        }
    }

    let mut new_leader = Replica::new(
        ReplicaId::new(new_leader_id),
        format!("core_node{new_leader_id}"),
        NodeName::new(format!("node{new_leader_id}:8983_solr")),
        new_leader_base_url,
        ReplicaKind::Nrt,
        shard_id.clone(),
    );
    new_leader.state = ReplicaState::Leader;
    s.replicas.insert(ReplicaId::new(new_leader_id), new_leader);
    s.leader = Some(ReplicaId::new(new_leader_id));

    store
        .set_data(&path, serde_json::to_vec(&coll).unwrap(), version)
        .await
        .unwrap();
}

/// A fingerprint over `docs` computed at `+inf`, for tests that just need
/// a leader/follower pair to agree.
pub fn fingerprint_of(docs: &[(u64, Version)]) -> Fingerprint {
    Fingerprint::compute(&FakeIndex { docs: Mutex::new(docs.to_vec()) }, AT_HEAD)
}
