//! The follower-side leader consult (`spec.md` §4.8): "The follower
//! consults `isLeader(replicaName)` locally." The ephemeral-sequence
//! election algorithm itself runs inside the coordination store and is
//! out of scope (`spec.md` §1); this crate only reads the outcome
//! through the C2 cluster-state projection.

use kimberlite_cluster::ClusterStateReader;
use kimberlite_types::{cluster::ReplicaId, CollectionName, ShardId};

/// True iff `replica_id` is currently recorded as the leader of
/// `shard_id` within `collection`'s live projection.
///
/// `spec.md` §4.7: "If this replica **is** the elected leader of its
/// shard per local leader-elector, STOP immediately" and §4.7's
/// "Re-check-leader discipline" both consult this.
pub async fn is_leader(
    cluster: &ClusterStateReader,
    collection: &CollectionName,
    shard_id: &ShardId,
    replica_id: ReplicaId,
) -> bool {
    let Some(collection) = cluster.get_collection(collection).await else {
        return false;
    };
    collection
        .shards
        .get(shard_id)
        .map(|shard| shard.leader == Some(replica_id))
        .unwrap_or(false)
}

/// Resolves the current leader's base URL for a shard, if one is
/// recorded. Used by `kimberlite-recovery` to target PeerSync,
/// prep-recovery, and full-fetch calls at the right leader.
pub async fn current_leader_base_url(
    cluster: &ClusterStateReader,
    collection: &CollectionName,
    shard_id: &ShardId,
) -> Option<String> {
    let collection = cluster.get_collection(collection).await?;
    let shard = collection.shards.get(shard_id)?;
    let leader_id = shard.leader?;
    shard.replicas.get(&leader_id).map(|r| r.base_url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kimberlite_coordination::InMemoryStore;
    use kimberlite_types::cluster::{Collection, NodeName, Replica, ReplicaKind, ReplicaState, Shard};
    use kimberlite_coordination::{CoordinationStore, NodeVersion};
    use std::sync::Arc;

    #[tokio::test]
    async fn is_leader_reflects_shard_projection() {
        let store = Arc::new(InMemoryStore::new());
        let shard_id = ShardId::new("shard1");
        let mut shard = Shard::new(shard_id.clone());
        let replica = Replica::new(
            ReplicaId::new(1),
            "core_node1",
            NodeName::new("node1:8983_solr"),
            "http://node1:8983/solr",
            ReplicaKind::Nrt,
            shard_id.clone(),
        );
        shard.replicas.insert(ReplicaId::new(1), replica);
        shard.leader = Some(ReplicaId::new(1));
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

        let reader = ClusterStateReader::spawn(store);
        let name = CollectionName::new("c1");
        reader.watch(&name).await;
        reader
            .wait_for_state(&name, std::time::Duration::from_secs(2), |_l, c| c.is_some())
            .await
            .unwrap();

        assert!(is_leader(&reader, &name, &shard_id, ReplicaId::new(1)).await);
        assert!(!is_leader(&reader, &name, &shard_id, ReplicaId::new(2)).await);
    }
}
