//! Configuration loading for the replica recovery core.
//!
//! [`kimberlite_recovery::RecoveryConfig`] and its peer-sync/full-fetch
//! sub-configs carry documented `Default` impls (`spec.md` §4.7/§4.5/§4.6).
//! This crate layers the usual multi-source precedence chain on top of
//! those defaults, the way `kimberlite-cluster`'s supervisor loads its own
//! tuning knobs: built-in defaults, then a project-tracked TOML file, then
//! a local gitignored override, then `KMB_RECOVERY_*` environment
//! variables (highest precedence).

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Flat, serde-friendly mirror of [`kimberlite_recovery::RecoveryConfig`]
/// (plus its `peer_sync`/`full_fetch` sub-configs), suitable for TOML
/// files and `KMB_RECOVERY_*` environment variables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecoveryFileConfig {
    /// `startingRecoveryDelayMs`, the delay used for attempts `[1, 20)`
    /// (`spec.md` §4.7).
    pub starting_recovery_delay_ms: u64,
    /// Attempts at or beyond which recovery gives up and publishes
    /// `RECOVERY_FAILED` (`spec.md` §4.7).
    pub max_retries: u32,
    /// PeerSync's missed-updates window size (`spec.md` §4.5's
    /// `nUpdates`).
    pub peer_sync_n_updates: u64,
    /// Whether PeerSync verifies success via fingerprint comparison
    /// (`spec.md` §4.5 step 3/13).
    pub peer_sync_do_fingerprint: bool,
    /// `spec.md` §9's advisory `skipCommitOnMasterVersionZero` flag,
    /// only ever set for TLOG replicas.
    pub full_fetch_skip_commit_on_zero_master_version: bool,
    pub full_fetch_download_tlog: bool,
    /// Prep-recovery timeout in seconds (`spec.md` §4.8: "Timeout = 8s
    /// default").
    pub prep_recovery_timeout_secs: u64,
    pub prep_recovery_max_attempts: u32,
    /// Bound on `updateLog.applyBufferedUpdates()` in seconds
    /// (`spec.md` §5: "bounded timeout, default 10 min").
    pub apply_buffered_updates_timeout_secs: u64,
}

impl Default for RecoveryFileConfig {
    fn default() -> Self {
        let defaults = kimberlite_recovery::RecoveryConfig::default();
        Self {
            starting_recovery_delay_ms: defaults.starting_recovery_delay.as_millis() as u64,
            max_retries: defaults.max_retries,
            peer_sync_n_updates: defaults.peer_sync.n_updates as u64,
            peer_sync_do_fingerprint: defaults.peer_sync.do_fingerprint,
            full_fetch_skip_commit_on_zero_master_version: defaults
                .full_fetch
                .skip_commit_on_zero_master_version,
            full_fetch_download_tlog: defaults.full_fetch.download_tlog,
            prep_recovery_timeout_secs: defaults.prep_recovery_timeout.as_secs(),
            prep_recovery_max_attempts: defaults.prep_recovery_max_attempts,
            apply_buffered_updates_timeout_secs: defaults.apply_buffered_updates_timeout.as_secs(),
        }
    }
}

impl RecoveryFileConfig {
    /// Load from default locations (project dir = current directory).
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load from a specific project directory.
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Materialize into the strongly-typed config the recovery crates
    /// actually consume.
    pub fn to_recovery_config(self) -> kimberlite_recovery::RecoveryConfig {
        kimberlite_recovery::RecoveryConfig {
            starting_recovery_delay: Duration::from_millis(self.starting_recovery_delay_ms),
            max_retries: self.max_retries,
            peer_sync: kimberlite_peer_sync::PeerSyncConfig {
                n_updates: self.peer_sync_n_updates as usize,
                do_fingerprint: self.peer_sync_do_fingerprint,
            },
            full_fetch: kimberlite_full_fetch::FullFetchOptions {
                skip_commit_on_zero_master_version: self.full_fetch_skip_commit_on_zero_master_version,
                download_tlog: self.full_fetch_download_tlog,
            },
            prep_recovery_timeout: Duration::from_secs(self.prep_recovery_timeout_secs),
            prep_recovery_max_attempts: self.prep_recovery_max_attempts,
            apply_buffered_updates_timeout: Duration::from_secs(self.apply_buffered_updates_timeout_secs),
        }
    }
}
