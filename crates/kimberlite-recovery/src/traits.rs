//! Collaborator seams this crate consumes as opaque primitives
//! (`spec.md` §1: "recovery consumes... operations as opaque primitives").
//! Real implementations live in the out-of-scope index engine; tests
//! substitute no-ops or fakes.

use std::sync::Arc;

use async_trait::async_trait;

use kimberlite_election::{HttpPrepRecoveryClient, PrepRecoveryHandle};
use kimberlite_full_fetch::{HttpReplicationClient, LeaderReplicationHandle};
use kimberlite_peer_sync::{HttpLeaderClient, LeaderHandle};

/// Quiesces and reopens the replica's local index writer around a full
/// fetch (`spec.md` §5: "recovery must quiesce the writer... apply the
/// new files, and reopen").
#[async_trait]
pub trait IndexWriterControl: Send + Sync {
    async fn quiesce(&self);
    async fn reopen(&self);
}

/// A control that performs no quiescing, for replica kinds or tests where
/// the underlying index engine handles this itself.
pub struct NoopIndexWriterControl;

#[async_trait]
impl IndexWriterControl for NoopIndexWriterControl {
    async fn quiesce(&self) {}
    async fn reopen(&self) {}
}

/// Pauses and resumes a PULL replica's background index replication
/// around a `REPLICATE_ONLY` fetch (`spec.md` §4.7: "stop background
/// replication during fetch, then restart it").
#[async_trait]
pub trait BackgroundReplication: Send + Sync {
    async fn pause(&self);
    async fn resume(&self);
}

pub struct NoopBackgroundReplication;

#[async_trait]
impl BackgroundReplication for NoopBackgroundReplication {
    async fn pause(&self) {}
    async fn resume(&self) {}
}

/// Builds the three per-leader HTTP handles a recovery attempt needs,
/// keyed by the leader's base URL resolved fresh at `CHECK_LEADER`
/// (`spec.md` §5: "HTTP client pool shared across all recovery attempts
/// on a node; per-attempt clients inherit connection pool but set
/// distinct timeouts").
pub trait LeaderClients: Send + Sync {
    fn peer_sync_handle(&self, base_url: &str) -> Arc<dyn LeaderHandle>;
    fn replication_handle(&self, base_url: &str) -> Arc<dyn LeaderReplicationHandle>;
    fn prep_recovery_handle(&self, base_url: &str) -> Arc<dyn PrepRecoveryHandle>;
}

/// `reqwest`-backed [`LeaderClients`], constructing a fresh client per
/// base URL for each attempt.
#[derive(Default)]
pub struct HttpLeaderClients;

impl LeaderClients for HttpLeaderClients {
    fn peer_sync_handle(&self, base_url: &str) -> Arc<dyn LeaderHandle> {
        Arc::new(HttpLeaderClient::new(base_url))
    }

    fn replication_handle(&self, base_url: &str) -> Arc<dyn LeaderReplicationHandle> {
        Arc::new(HttpReplicationClient::new(base_url))
    }

    fn prep_recovery_handle(&self, base_url: &str) -> Arc<dyn PrepRecoveryHandle> {
        Arc::new(HttpPrepRecoveryClient::new(base_url))
    }
}
