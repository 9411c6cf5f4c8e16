//! Top-level and per-phase results for a recovery attempt (`spec.md` §7).

use thiserror::Error;

/// What a full recovery run (all retries included) ended in, per `spec.md`
/// §6's exit codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The strategy ran to completion and the replica published `ACTIVE`.
    Recovered,
    /// `spec.md` §4.7: "If this replica is the elected leader of its
    /// shard... STOP immediately: it is illegal for a leader to be
    /// recovering." No attempt was made.
    SkippedIsLeader,
    /// Every attempt up to `maxRetries` failed; `RECOVERY_FAILED` was
    /// published.
    FailedMaxRetries,
    /// The attempt observed cancellation at a suspension point or phase
    /// boundary before it could complete.
    AbortedClosing,
}

/// Why a single phase within one recovery attempt failed (`spec.md` §7).
/// The outer retry loop decides retry-vs-escalate-vs-abort from this.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhaseError {
    /// A leader call failed for a reason expected to clear on retry
    /// (connection refused, timeout, 5xx).
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// The cluster projection no longer names a leader for this shard.
    #[error("no leader currently recorded for this shard")]
    LeaderGone,

    /// A coordination-store write lost an optimistic-concurrency race
    /// against a concurrent state change.
    #[error("cluster-state version went stale mid-attempt")]
    StaleStateVersion,

    /// The leader's response didn't match the expected wire shape.
    #[error("protocol mismatch talking to leader: {0}")]
    ProtocolMismatch(String),

    /// A fetched file's checksum didn't match, or local state was
    /// otherwise inconsistent in a way retrying the same attempt can't
    /// fix.
    #[error("local corruption detected: {0}")]
    LocalCorruption(String),

    /// The attempt observed cancellation or a coordination-store session
    /// expiry mid-phase.
    #[error("closing or coordination session expired")]
    ClosingOrSessionExpired,

    /// `spec.md` §4.7's STOP condition, surfaced as a phase error so
    /// `check_leader` can report it through the same channel as other
    /// phases before the outer loop maps it to `RecoveryOutcome::SkippedIsLeader`.
    #[error("this replica is the shard's current leader")]
    AlreadyLeader,

    /// `updateLog.applyBufferedUpdates()` completed with `failed: true`,
    /// or timed out.
    #[error("replaying buffered updates failed: {0}")]
    ReplayFailure(String),
}
