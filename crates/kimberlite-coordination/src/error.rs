//! Failure taxonomy for the coordination-store client (`spec.md` §4.1).

use crate::NodeVersion;

/// Errors a [`crate::CoordinationStore`] call can return.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    /// The path is absent. Expected in several control paths (e.g. probing
    /// whether a leader ephemeral exists before an election completes).
    #[error("no node at path: {0}")]
    NoNode(String),

    /// An optimistic `setData` lost the race: the caller's expected
    /// version no longer matches.
    #[error("version mismatch at {path}: expected {expected}, actual {actual}")]
    VersionMismatch {
        path: String,
        expected: NodeVersion,
        actual: NodeVersion,
    },

    /// The session expired. Fatal for any lock or ephemeral derived from
    /// it; higher layers must tear down and rebuild their session.
    #[error("session expired")]
    SessionExpired,

    /// A transient connectivity failure. Callers retry with exponential
    /// backoff up to a configured ceiling (see [`crate::RetryingStore`]).
    #[error("connection loss: {0}")]
    ConnectionLoss(String),
}

pub type Result<T> = std::result::Result<T, CoordinationError>;
