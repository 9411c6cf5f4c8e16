//! Tuning knobs for a recovery attempt (`spec.md` §4.7).

use std::time::Duration;

/// `spec.md` §4.7: configuration for the retry/backoff loop and the
/// phases it drives.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryConfig {
    /// `startingRecoveryDelayMs`, the delay used for attempts `[1, 20)`.
    pub starting_recovery_delay: Duration,
    /// Attempts at or beyond which recovery gives up and publishes
    /// `RECOVERY_FAILED`.
    pub max_retries: u32,
    /// `PeerSyncWithLeader`'s window size and fingerprint-verification
    /// toggle (`spec.md` §4.5).
    pub peer_sync: kimberlite_peer_sync::PeerSyncConfig,
    /// Full-index fetch options (`spec.md` §4.6), applied when PeerSync
    /// is skipped or fails.
    pub full_fetch: kimberlite_full_fetch::FullFetchOptions,
    /// Prep-recovery timeout and bounded retry count (`spec.md` §4.8:
    /// "Timeout = 8s default, bounded retries").
    pub prep_recovery_timeout: Duration,
    pub prep_recovery_max_attempts: u32,
    /// Bound on `updateLog.applyBufferedUpdates()` (`spec.md` §5: "bounded
    /// timeout, default 10 min").
    pub apply_buffered_updates_timeout: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            starting_recovery_delay: Duration::from_millis(100),
            max_retries: 500,
            peer_sync: kimberlite_peer_sync::PeerSyncConfig::default(),
            full_fetch: kimberlite_full_fetch::FullFetchOptions::default(),
            prep_recovery_timeout: Duration::from_secs(8),
            prep_recovery_max_attempts: 10,
            apply_buffered_updates_timeout: Duration::from_secs(600),
        }
    }
}
