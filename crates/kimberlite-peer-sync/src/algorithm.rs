//! The PeerSync-with-leader delta catch-up algorithm (`spec.md` §4.5).

use std::collections::HashSet;

use kimberlite_fingerprint::{CommittedIndexView, Fingerprint, AT_HEAD};
use kimberlite_types::cluster::Version;
use kimberlite_update_log::{LogRecord, OpKind, UpdateLog, VersionSpec};

use crate::client::LeaderHandle;

/// PeerSync tuning (`spec.md` §4.5 inputs): `nUpdates` is the window
/// size, and `doFingerprint` gates the early-exit and final verification
/// steps that require computing our own fingerprint.
#[derive(Debug, Clone, Copy)]
pub struct PeerSyncConfig {
    pub n_updates: usize,
    pub do_fingerprint: bool,
}

impl Default for PeerSyncConfig {
    /// `nUpdates = 100` is `spec.md` §4.5's example window size.
    fn default() -> Self {
        Self {
            n_updates: 100,
            do_fingerprint: true,
        }
    }
}

/// Why a PeerSync attempt failed, surfaced for logging and for
/// `kimberlite-recovery`'s escalation-to-`FULL_COPY` decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerSyncFailure {
    /// Step 1: the follower has no starting versions — no frame of
    /// reference to catch up from.
    #[error("follower update log is empty, no frame of reference for PeerSync")]
    EmptyLog,
    /// Step 6: `|startingVersions[0]| < smallestNewUpdate` — too much has
    /// happened since we went down.
    #[error("overlap check failed: follower has fallen too far behind the leader's recent window")]
    OverlapCheckFailed,
    /// Step 8: leader's lowest version exceeds our highest — no overlap
    /// at all between the two windows.
    #[error("leader and follower version windows do not overlap")]
    UnableToSync,
    /// Step 8: the computed missing-version set exceeds `nUpdates`.
    #[error("missing update set ({missing} entries) exceeds the PeerSync window ({window})")]
    TooManyMissing { missing: usize, window: usize },
    /// Talking to the leader failed outright (network, non-2xx, bad JSON).
    #[error("leader request failed: {0}")]
    LeaderUnreachable(String),
    /// Step 9: the leader's response didn't contain exactly the
    /// requested number of entries.
    #[error("leader returned {got} updates, expected exactly {expected}")]
    IncompleteResponse { got: usize, expected: usize },
    /// Step 13: our post-replay fingerprint didn't match the leader's.
    #[error("fingerprint mismatch after applying missed updates")]
    FingerprintMismatch,
}

/// The caller-visible result of a PeerSync attempt (`spec.md` §4.5's
/// `PeerSyncResult.success()`/`.failure()`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerSyncOutcome {
    /// Done, no further work. `updates_applied` is zero for the
    /// already-in-sync fast paths (steps 3 and 8a).
    Success { updates_applied: u64 },
    /// The caller must escalate to full-copy recovery (`spec.md` §4.5).
    Failure(PeerSyncFailure),
}

impl PeerSyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PeerSyncOutcome::Success { .. })
    }
}

/// The `[lo, hi)` percentile pick used for `ourLowThreshold`/
/// `ourHighThreshold` (`spec.md` §4.5 step 5). `spec.md` does not pin an
/// interpolation method; a plain sorted-index pick is used (see
/// `DESIGN.md`). `versions` must already be sorted by absolute value
/// descending, matching `recentVersions`'s contract.
fn percentile(versions: &[Version], p: f64) -> Option<Version> {
    if versions.is_empty() {
        return None;
    }
    let idx = ((versions.len() as f64) * p) as usize;
    Some(versions[idx.min(versions.len() - 1)])
}

/// Runs one PeerSync attempt against `leader`, using `log` as the
/// follower's update log and `local_index` to compute our own
/// fingerprint for verification (`spec.md` §4.5).
pub async fn run_peer_sync(
    leader: &dyn LeaderHandle,
    log: &UpdateLog,
    local_index: &dyn CommittedIndexView,
    config: PeerSyncConfig,
) -> PeerSyncOutcome {
    // Step 1: no frame of reference without starting versions.
    let starting_versions = log.starting_versions();
    if starting_versions.is_empty() {
        return PeerSyncOutcome::Failure(PeerSyncFailure::EmptyLog);
    }

    // Step 2: leader's recent versions + fingerprint at +∞.
    let (leader_versions, leader_fingerprint) =
        match leader.recent_versions_and_fingerprint(config.n_updates).await {
            Ok(v) => v,
            Err(err) => return PeerSyncOutcome::Failure(PeerSyncFailure::LeaderUnreachable(err.to_string())),
        };

    // Step 3: fast exit if we're already byte-equal to the leader.
    if config.do_fingerprint {
        let our_fingerprint = Fingerprint::compute(local_index, AT_HEAD);
        if our_fingerprint.matches(&leader_fingerprint) {
            return PeerSyncOutcome::Success { updates_applied: 0 };
        }
    }

    // Step 4: our own recent versions and currently-buffered versions.
    let our_recent = log.recent_versions(config.n_updates);
    let our_buffered = log.buffered_versions();

    // Step 5: thresholds, computed for operator diagnostics. `spec.md`
    // does not specify further consumption beyond step 5 itself.
    let our_low_threshold = percentile(&starting_versions, 0.8);
    let our_high_threshold = percentile(&starting_versions, 0.2);
    tracing::debug!(
        ?our_low_threshold,
        ?our_high_threshold,
        "peer sync thresholds computed"
    );

    // Step 6: overlap check. `smallestNewUpdate` is the smallest (by
    // absolute value) entry in our recent-versions window; if it's
    // empty, nothing from `startingVersions` can be below it, which
    // correctly makes the overlap check below a no-op.
    let smallest_new_update = our_recent.last().map(Version::abs_order_key).unwrap_or(0);
    let newest_starting = starting_versions[0].abs_order_key();
    if newest_starting < smallest_new_update {
        return PeerSyncOutcome::Failure(PeerSyncFailure::OverlapCheckFailed);
    }

    // Step 7: merge-anchor — starting versions older than our recent
    // window are already known to us and extend our coverage set.
    let merged_anchor: Vec<Version> = starting_versions
        .iter()
        .copied()
        .filter(|v| v.abs_order_key() < smallest_new_update)
        .collect();

    let our_set: HashSet<i64> = our_recent
        .iter()
        .chain(merged_anchor.iter())
        .chain(our_buffered.iter())
        .map(Version::as_i64)
        .collect();

    // Step 8: ALREADY_IN_SYNC / UNABLE_TO_SYNC / compute missing.
    let all_covered = leader_versions.iter().all(|v| our_set.contains(&v.as_i64()));
    if all_covered {
        return PeerSyncOutcome::Success { updates_applied: 0 };
    }

    let leader_lowest = leader_versions
        .last()
        .map(Version::abs_order_key)
        .unwrap_or(0);
    let our_highest = our_set.iter().map(|v| v.unsigned_abs()).max().unwrap_or(0);
    if leader_lowest > our_highest {
        return PeerSyncOutcome::Failure(PeerSyncFailure::UnableToSync);
    }

    let missing: Vec<Version> = leader_versions
        .iter()
        .copied()
        .filter(|v| !our_set.contains(&v.as_i64()))
        .collect();

    if missing.len() > config.n_updates {
        return PeerSyncOutcome::Failure(PeerSyncFailure::TooManyMissing {
            missing: missing.len(),
            window: config.n_updates,
        });
    }

    // Step 9: fetch exactly the missing versions.
    let spec = VersionSpec::List(missing.clone());
    let fetched = match leader.get_updates(&spec).await {
        Ok(records) => records,
        Err(err) => return PeerSyncOutcome::Failure(PeerSyncFailure::LeaderUnreachable(err.to_string())),
    };
    if fetched.len() != missing.len() {
        return PeerSyncOutcome::Failure(PeerSyncFailure::IncompleteResponse {
            got: fetched.len(),
            expected: missing.len(),
        });
    }

    // Step 10: merge in our own buffered updates.
    let mut merged: Vec<LogRecord> = fetched;
    merged.extend(log.buffered_records());

    // Step 11: gap handling for deletes. If nothing past the leader's
    // `maxVersionEncountered` is a delete, ADDs past that point can be
    // safely dropped (the leader will resend them once it catches up
    // past us); otherwise apply everything unpruned.
    let max_version_encountered = leader_fingerprint.max_version_encountered;
    let has_unsafe_delete_in_gap = merged.iter().any(|r| {
        r.version.as_i64() > max_version_encountered
            && matches!(r.op, OpKind::DeleteById | OpKind::DeleteByQuery)
    });
    let to_apply: Vec<LogRecord> = if has_unsafe_delete_in_gap {
        merged
    } else {
        merged
            .into_iter()
            .filter(|r| !(r.version.as_i64() > max_version_encountered && r.op == OpKind::Add))
            .collect()
    };

    // Step 12: apply.
    let applied_count = to_apply.len() as u64;
    log.apply_recovered_updates(to_apply);

    // Step 13: verify.
    if config.do_fingerprint {
        let our_fingerprint = Fingerprint::compute(local_index, AT_HEAD);
        if !our_fingerprint.matches(&leader_fingerprint) {
            return PeerSyncOutcome::Failure(PeerSyncFailure::FingerprintMismatch);
        }
    }

    PeerSyncOutcome::Success {
        updates_applied: applied_count,
    }
}
