//! Errors for the cluster-state reader and fetch queue (`spec.md` §4.2).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// `waitForState` did not observe a satisfying projection before its
    /// deadline.
    #[error("timed out waiting for state on collection {0}")]
    WaitForStateTimeout(String),

    /// The fetch-queue worker's channel was dropped (the worker task
    /// panicked or was shut down).
    #[error("fetch queue worker is no longer running")]
    WorkerGone,

    /// The coordination store returned an error while fetching a
    /// collection document or state-updates blob.
    #[error("coordination store error: {0}")]
    Coordination(#[from] kimberlite_coordination::CoordinationError),

    /// A collection document or state-updates blob failed to parse.
    #[error("malformed cluster-state document at {path}: {reason}")]
    MalformedDocument { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
