//! Errors for the PeerSync leader transport (`spec.md` §4.5/§6).

use thiserror::Error;

/// Transport-level failures talking to the leader. These are distinct
/// from [`crate::PeerSyncOutcome`]'s failure reasons: a transport error
/// always maps to `PeerSyncOutcome::failure`, but the outcome also
/// records protocol-level causes (overlap check, too-large delta) that
/// never touch the network.
#[derive(Error, Debug)]
pub enum Error {
    #[error("leader request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("leader returned malformed response: {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
