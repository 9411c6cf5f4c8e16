//! The cluster-state data model (`spec.md` §3): collections, shards,
//! replicas, and the signed update-log version.
//!
//! Values here are plain data — no cross-references via `Rc`/`RefCell`.
//! Per the arena pattern in `spec.md` §9 ("Cyclic references... Represent
//! the projection as arena-allocated nodes referenced by stable integer
//! ids"), a [`Shard`] holds its [`Replica`]s directly (keyed by
//! [`ReplicaId`]) and each [`Replica`] carries its own `shard_id` back
//! reference, rather than a borrowed pointer back to its shard.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Generation;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable, numeric identifier for a replica, assigned once and never reused
/// for a different physical replica (`spec.md` §3: "internal-id (stable,
/// numeric)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(u64);

impl ReplicaId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replica#{}", self.0)
    }
}

/// A shard's name, unique within its collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardId(String);

impl ShardId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A collection's name, unique cluster-wide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionName(String);

impl CollectionName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live node's identity, as registered under `/live_nodes/<nodeName>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Replica
// ============================================================================

/// The replication role a replica plays (`spec.md` §4.7 and GLOSSARY).
///
/// NRT and TLOG replicas both consult the update log and can run
/// `PeerSync`; PULL replicas never write locally and only replicate the
/// index (`REPLICATE_ONLY` strategy, no buffering, no replay).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicaKind {
    /// Indexes locally in near-real-time; participates in `PeerSync`.
    Nrt,
    /// Buffers writes to a transaction log; participates in `PeerSync`.
    Tlog,
    /// Read-only; only pulls the index from its leader.
    Pull,
}

impl ReplicaKind {
    /// NRT and TLOG replicas consult the update log during recovery.
    pub fn uses_update_log(&self) -> bool {
        !matches!(self, ReplicaKind::Pull)
    }
}

impl fmt::Display for ReplicaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplicaKind::Nrt => "NRT",
            ReplicaKind::Tlog => "TLOG",
            ReplicaKind::Pull => "PULL",
        };
        write!(f, "{s}")
    }
}

/// A replica's lifecycle state within the cluster-state projection.
///
/// Matches the coordination-store's compact state codes used in the
/// state-updates delta blob (`spec.md` §6): 1 = `Leader`, 2 =
/// `RecoveringFromLeader` (the demotion code applied to a stale leader
/// during delta-merge), plus the remaining states carried in full
/// collection documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicaState {
    Down,
    Recovering,
    Buffering,
    Active,
    Leader,
    RecoveryFailed,
}

impl ReplicaState {
    /// Decodes the compact numeric code used in the state-updates delta
    /// blob. Only codes 1 (`LEADER`) and 2 (`recovering-from-leader`) are
    /// specified explicitly by `spec.md` §4.2/§6; the rest follow the same
    /// small-integer convention for round-tripping through JSON.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ReplicaState::Down),
            1 => Some(ReplicaState::Leader),
            2 => Some(ReplicaState::Recovering),
            3 => Some(ReplicaState::Buffering),
            4 => Some(ReplicaState::Active),
            5 => Some(ReplicaState::RecoveryFailed),
            _ => None,
        }
    }

    pub fn to_code(self) -> u8 {
        match self {
            ReplicaState::Down => 0,
            ReplicaState::Leader => 1,
            ReplicaState::Recovering => 2,
            ReplicaState::Buffering => 3,
            ReplicaState::Active => 4,
            ReplicaState::RecoveryFailed => 5,
        }
    }

    pub fn is_leader(&self) -> bool {
        matches!(self, ReplicaState::Leader)
    }
}

impl fmt::Display for ReplicaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplicaState::Down => "down",
            ReplicaState::Recovering => "recovering",
            ReplicaState::Buffering => "buffering",
            ReplicaState::Active => "active",
            ReplicaState::Leader => "leader",
            ReplicaState::RecoveryFailed => "recovery_failed",
        };
        write!(f, "{s}")
    }
}

/// A single replica of a shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub id: ReplicaId,
    pub name: String,
    pub node: NodeName,
    pub base_url: String,
    pub kind: ReplicaKind,
    pub state: ReplicaState,
    /// Back-reference to the owning shard, per the arena pattern in
    /// `spec.md` §9 (no borrowed pointer back to the `Shard`).
    pub shard_id: ShardId,
}

impl Replica {
    pub fn new(
        id: ReplicaId,
        name: impl Into<String>,
        node: NodeName,
        base_url: impl Into<String>,
        kind: ReplicaKind,
        shard_id: ShardId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            node,
            base_url: base_url.into(),
            kind,
            state: ReplicaState::Down,
            shard_id,
        }
    }
}

// ============================================================================
// Shard
// ============================================================================

/// A shard's coarse-grained health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShardState {
    Active,
    Inactive,
    Construction,
    Recovery,
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShardState::Active => "active",
            ShardState::Inactive => "inactive",
            ShardState::Construction => "construction",
            ShardState::Recovery => "recovery",
        };
        write!(f, "{s}")
    }
}

/// A partition of a collection: a set of replicas serving the same key
/// range, at most one of which is the leader (`spec.md` §3 invariant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub id: ShardId,
    pub state: ShardState,
    pub replicas: HashMap<ReplicaId, Replica>,
    pub leader: Option<ReplicaId>,
}

impl Shard {
    pub fn new(id: ShardId) -> Self {
        Self {
            id,
            state: ShardState::Active,
            replicas: HashMap::new(),
            leader: None,
        }
    }

    /// Returns true iff at most one replica in this shard is `LEADER` and,
    /// when `leader` is set, it matches that replica
    /// (`spec.md` §8 Invariant 1).
    pub fn satisfies_single_leader_invariant(&self) -> bool {
        let leaders: Vec<ReplicaId> = self
            .replicas
            .values()
            .filter(|r| r.state.is_leader())
            .map(|r| r.id)
            .collect();
        match leaders.len() {
            0 => self.leader.is_none(),
            1 => self.leader == Some(leaders[0]),
            _ => false,
        }
    }

    /// Applies a state-update to one replica of this shard, enforcing the
    /// single-leader invariant: if `replica_id` transitions to `LEADER`,
    /// every *other* replica of this shard that was `LEADER` is demoted to
    /// `Recovering` (`spec.md` §4.2's "recovering-from-leader", code 2).
    pub fn update_replica_state(&mut self, replica_id: ReplicaId, new_state: ReplicaState) {
        if new_state == ReplicaState::Leader {
            for (id, replica) in self.replicas.iter_mut() {
                if *id != replica_id && replica.state == ReplicaState::Leader {
                    replica.state = ReplicaState::Recovering;
                }
            }
            self.leader = Some(replica_id);
        } else if self.leader == Some(replica_id) {
            self.leader = None;
        }

        if let Some(replica) = self.replicas.get_mut(&replica_id) {
            replica.state = new_state;
        }
    }
}

// ============================================================================
// Collection
// ============================================================================

/// A named collection, partitioned into shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub name: CollectionName,
    pub generation: Generation,
    pub shards: HashMap<ShardId, Shard>,
}

impl Collection {
    pub fn new(name: CollectionName) -> Self {
        Self {
            name,
            generation: Generation::INITIAL,
            shards: HashMap::new(),
        }
    }

    /// Looks up the replica with the given id across all shards of this
    /// collection. Used to resolve a state-updates delta entry, which is
    /// keyed only by replica id.
    pub fn find_replica(&self, replica_id: ReplicaId) -> Option<(&ShardId, &Replica)> {
        self.shards
            .values()
            .find_map(|shard| shard.replicas.get(&replica_id).map(|r| (&shard.id, r)))
    }

    pub fn find_replica_mut(&mut self, replica_id: ReplicaId) -> Option<&mut Replica> {
        self.shards
            .values_mut()
            .find_map(|shard| shard.replicas.get_mut(&replica_id))
    }
}

// ============================================================================
// Update-log Version
// ============================================================================

/// A signed update-log version (`spec.md` §3): the sign bit encodes
/// delete-by-id vs add; delete-by-query is tracked by a separate op-code
/// word, since a single query deletion has no single document version to
/// carry the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(i64);

impl Version {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// The ordering key used by `recentVersions`/`PeerSync`: sorted by
    /// absolute value descending (`spec.md` §3/§4.5).
    pub fn abs_order_key(&self) -> u64 {
        self.0.unsigned_abs()
    }

    /// True if this version's sign marks it a delete-by-id.
    pub fn is_delete_by_id(&self) -> bool {
        self.0 < 0
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    /// Orders by absolute value, matching `recentVersions`'s
    /// "sorted by absolute value descending" contract when reversed.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.abs_order_key().cmp(&other.abs_order_key())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
