//! Coordination-store client contract (`spec.md` §4.1, component C1).
//!
//! `spec.md` treats the ZooKeeper-like coordination service as an external
//! collaborator: "we assume a store offering `get(path) -> (bytes,
//! version)`, `watch`, `create/ephemeral`, versioned `setData`, and session
//! events." This crate defines that contract as [`CoordinationStore`], an
//! object-safe async trait, plus:
//!
//! - [`InMemoryStore`], a `tokio::sync::Mutex`-guarded in-process tree used
//!   by every test in this workspace (the real backend is out of scope per
//!   `spec.md` §1).
//! - [`RetryingStore`], a decorator implementing the `ConnectionLoss`
//!   exponential-backoff-with-ceiling policy from §4.1 around any other
//!   implementation.
//!
//! Watches are one-shot: a call to [`CoordinationStore::watch`] resolves
//! the returned [`Watch`] exactly once, after which the caller must call
//! `watch` again to keep observing the path — mirroring the "callback
//! fires once per change; re-register after each fire" contract in §4.1.

mod error;
mod in_memory;
mod retrying;
mod session;

pub use error::{CoordinationError, Result};
pub use in_memory::InMemoryStore;
pub use retrying::{RetryingStore, RetryPolicy};
pub use session::{SessionState, SessionWatch};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An optimistic-concurrency version number attached to every stored node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeVersion(u64);

impl NodeVersion {
    pub const INITIAL: NodeVersion = NodeVersion(0);

    pub fn new(v: u64) -> Self {
        Self(v)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        NodeVersion(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for NodeVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// What changed at a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// The node's data or version changed.
    DataChanged,
    /// The node (or one of its children, for a children-watch) was created.
    Created,
    /// The node was deleted (e.g. an ephemeral vanished on session expiry).
    Deleted,
    /// The session expired; all watches on this session are invalidated.
    SessionExpired,
}

/// A pending, one-shot watch registration.
///
/// Resolves when the watched path changes, or when the session expires.
/// After it resolves, register a new watch if continued observation is
/// needed — watches do not auto-renew.
pub struct Watch {
    rx: tokio::sync::oneshot::Receiver<WatchEvent>,
}

impl Watch {
    pub(crate) fn new(rx: tokio::sync::oneshot::Receiver<WatchEvent>) -> Self {
        Self { rx }
    }

    /// Waits for this watch to fire.
    pub async fn changed(self) -> Result<WatchEvent> {
        self.rx
            .await
            .map_err(|_| CoordinationError::SessionExpired)
    }
}

/// The coordination-store client contract (`spec.md` §4.1).
///
/// All paths are absolute, `/`-separated strings following the layout in
/// `spec.md` §6 (`/collections/<name>/state.json`, `/live_nodes/<node>`,
/// etc). Implementations must treat the keyspace as hierarchical only to
/// the extent that [`CoordinationStore::children`] lists entries logically
/// nested under a prefix; there is no requirement that intermediate path
/// segments themselves be addressable nodes.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Reads a node's data and version. `Err(NoNode)` if absent.
    async fn get(&self, path: &str) -> Result<(Vec<u8>, NodeVersion)>;

    /// Writes `data` iff `expected_version` matches the node's current
    /// version (or the node doesn't exist yet and `expected_version` is
    /// [`NodeVersion::INITIAL`]). Returns the new version.
    ///
    /// `Err(VersionMismatch)` if the expectation is stale.
    async fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        expected_version: NodeVersion,
    ) -> Result<NodeVersion>;

    /// Creates an ephemeral node, replacing any with the same path. The
    /// node is removed automatically when this client's session expires.
    async fn create_ephemeral(&self, path: &str, data: Vec<u8>) -> Result<()>;

    /// Returns the node's version if it exists, or `None`.
    async fn exists(&self, path: &str) -> Result<Option<NodeVersion>>;

    /// Lists the names of children logically nested under `path`.
    async fn children(&self, path: &str) -> Result<Vec<String>>;

    /// Registers a one-shot watch on `path`. See [`Watch`].
    async fn watch(&self, path: &str) -> Result<Watch>;

    /// The current session lifecycle state.
    fn session_state(&self) -> SessionState;
}
