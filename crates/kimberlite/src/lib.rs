//! # Kimberlite
//!
//! Replica recovery core for a sharded, replicated search-index cluster.
//!
//! A shard's replicas fall behind their leader when they are down,
//! partitioned, or simply missed a burst of writes. Kimberlite wires the
//! recovery components (`spec.md` §2, components C1-C9) into a single
//! entry point a host process calls to bring one replica back to
//! `ACTIVE`:
//!
//! - a coordination-store client ([`kimberlite_coordination`]);
//! - a cluster-state projection and fetch queue ([`kimberlite_cluster`]);
//! - a recovery-aware update log ([`kimberlite_update_log`]);
//! - an index fingerprint ([`kimberlite_fingerprint`]);
//! - PeerSync-with-leader delta catch-up ([`kimberlite_peer_sync`]);
//! - full-index fetch ([`kimberlite_full_fetch`]);
//! - leader election consult and prep-recovery ([`kimberlite_election`]);
//! - a state publisher ([`kimberlite_state_publisher`]);
//! - and the [`kimberlite_recovery`] state machine that drives all of the
//!   above through one replica's recovery attempt.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          Kimberlite                              │
//! │  ┌────────────┐   ┌─────────┐   ┌───────────┐   ┌──────────┐ │
//! │  │Coordination│ → │ Cluster │ → │ Recovery  │ → │  State   │ │
//! │  │   store    │   │  state  │   │ strategy  │   │publisher │ │
//! │  └────────────┘   └─────────┘   └───────────┘   └──────────┘ │
//! │                                       │                        │
//! │                      ┌────────────────┼────────────────┐       │
//! │                      ▼                ▼                ▼       │
//! │                 ┌─────────┐    ┌───────────┐    ┌───────────┐ │
//! │                 │PeerSync │    │Full fetch │    │ Election/ │ │
//! │                 │         │    │           │    │Prep-recov.│ │
//! │                 └─────────┘    └───────────┘    └───────────┘ │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```ignore
//! use kimberlite::{RecoveryHost, RecoveryRequest, RecoveryConfig};
//!
//! let host = RecoveryHost::new(store.clone());
//! let outcome = host
//!     .recover(request, handles, cancellation_token)
//!     .await;
//! ```

mod error;
mod host;

pub use error::{Error, Result};
pub use host::RecoveryHost;

// Re-export the data model recovery operates on (`spec.md` §3).
pub use kimberlite_types::{
    Collection, CollectionName, NodeName, Replica, ReplicaId, ReplicaKind, ReplicaState, Shard,
    ShardId, ShardState, Version,
};

// Re-export the coordination-store contract (component C1).
pub use kimberlite_coordination::{CoordinationStore, NodeVersion};

// Re-export the cluster-state projection and fetch queue (component C2).
pub use kimberlite_cluster::ClusterStateReader;

// Re-export the update log (component C3).
pub use kimberlite_update_log::{LogRecord, OpKind, UpdateLog, VersionSpec};

// Re-export the index fingerprint (component C4).
pub use kimberlite_fingerprint::{CommittedIndexView, Fingerprint, AT_HEAD};

// Re-export PeerSync (component C5).
pub use kimberlite_peer_sync::PeerSyncConfig;

// Re-export the full-index fetcher (component C6).
pub use kimberlite_full_fetch::{FetchResult, FullFetchOptions};

// Re-export the recovery state machine (component C7).
pub use kimberlite_recovery::{
    recover, BackgroundReplication, HttpLeaderClients, IndexWriterControl, LeaderClients,
    NoopBackgroundReplication, NoopIndexWriterControl, RecoveryConfig, RecoveryHandles,
    RecoveryLockTable, RecoveryOutcome, RecoveryRequest,
};

// Re-export leader election and prep-recovery (component C8).
pub use kimberlite_election::{is_leader, prep_recovery_with_retry};

// Re-export the state publisher (component C9).
pub use kimberlite_state_publisher::StatePublisher;

// Re-export configuration loading.
pub use kimberlite_config::RecoveryFileConfig;
