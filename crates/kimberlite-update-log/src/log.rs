//! The recovery-aware update log (`spec.md` §3/§4.3, component C3).

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use kimberlite_types::cluster::Version;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::types::{LogMode, LogRecord, OpKind, RecoveryInfo, VersionSpec};

struct Inner {
    mode: LogMode,
    main: Vec<LogRecord>,
    buffer: Vec<LogRecord>,
    starting_versions: Vec<Version>,
}

/// Ordered, append-only record of updates with a BUFFERING mode for
/// recovery catch-up (`spec.md` §3/§4.3).
///
/// Persistence is modeled rather than implemented: the main and buffer
/// tlogs live in memory, while the `buffer/` marker subdirectory on disk
/// tracks whether we crashed mid-BUFFERING, matching the persistent
/// state layout in `spec.md` §6.
#[derive(Clone)]
pub struct UpdateLog {
    inner: Arc<Mutex<Inner>>,
    buffer_dir: PathBuf,
    had_old_buffer_log: bool,
}

impl UpdateLog {
    /// Opens the log rooted at `dir`, seeding the main tlog with
    /// `initial_main` (as if recovered from a prior process's on-disk
    /// segments). `startingVersions()` is a snapshot taken right here, at
    /// process start (`spec.md` §4.3).
    pub fn open(dir: impl Into<PathBuf>, initial_main: Vec<LogRecord>) -> Self {
        let dir = dir.into();
        let buffer_dir = dir.join("buffer");
        let had_old_buffer_log = buffer_dir.exists();

        let mut starting_versions: Vec<Version> = initial_main.iter().map(|r| r.version).collect();
        starting_versions.sort_by(|a, b| b.cmp(a));

        Self {
            inner: Arc::new(Mutex::new(Inner {
                mode: LogMode::Applying,
                main: initial_main,
                buffer: Vec::new(),
                starting_versions,
            })),
            buffer_dir,
            had_old_buffer_log,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("update log mutex poisoned")
    }

    pub fn mode(&self) -> LogMode {
        self.lock().mode
    }

    /// Appends atomically. While BUFFERING, writes go to the side-buffer
    /// tlog; otherwise they land on the main tlog and are immediately
    /// visible to `recentVersions`.
    pub fn append_update(&self, op: OpKind, version: Version, payload: Vec<u8>) {
        let record = LogRecord::new(version, op, payload);
        let mut inner = self.lock();
        match inner.mode {
            LogMode::Buffering => inner.buffer.push(record),
            LogMode::Applying | LogMode::Replaying => inner.main.push(record),
        }
    }

    /// Up to `n` newest versions, sorted by absolute value descending
    /// (`spec.md` §3/§8 Invariant 5). Reads only the main tlog: per
    /// Invariant 6, buffered writes must not be visible here until
    /// replayed.
    pub fn recent_versions(&self, n: usize) -> Vec<Version> {
        let inner = self.lock();
        let mut versions: Vec<Version> = inner.main.iter().map(|r| r.version).collect();
        versions.sort_by(|a, b| b.cmp(a));
        versions.truncate(n);
        versions
    }

    /// Materializes updates matching `spec`, in absolute-value descending
    /// order, from the main tlog.
    pub fn get_updates(&self, spec: &VersionSpec) -> Vec<LogRecord> {
        let inner = self.lock();
        let mut matched: Vec<LogRecord> = match spec {
            VersionSpec::List(versions) => {
                let wanted: HashSet<i64> = versions.iter().map(Version::as_i64).collect();
                inner
                    .main
                    .iter()
                    .filter(|r| wanted.contains(&r.version.as_i64()))
                    .cloned()
                    .collect()
            }
            VersionSpec::Ranges(ranges) => inner
                .main
                .iter()
                .filter(|r| {
                    let abs = r.version.abs_order_key();
                    ranges.iter().any(|(lo, hi)| abs >= *lo && abs < *hi)
                })
                .cloned()
                .collect(),
        };
        matched.sort_by(|a, b| b.version.cmp(&a.version));
        matched
    }

    /// `APPLYING -> BUFFERING`. Idempotent: calling this while already
    /// BUFFERING drops any prior buffer and starts fresh (`spec.md`
    /// §4.3).
    pub fn buffer_updates(&self) -> Result<()> {
        {
            let mut inner = self.lock();
            inner.mode = LogMode::Buffering;
            inner.buffer.clear();
        }
        std::fs::create_dir_all(&self.buffer_dir)?;
        Ok(())
    }

    /// `BUFFERING -> REPLAYING -> APPLYING`. Returns a handle that
    /// resolves with [`RecoveryInfo`] once the buffer has drained into
    /// the main log. On completion (success or failure) the buffer
    /// directory marker is removed and the mode returns to `APPLYING`.
    pub fn apply_buffered_updates(&self) -> JoinHandle<RecoveryInfo> {
        let inner = self.inner.clone();
        let buffer_dir = self.buffer_dir.clone();
        tokio::spawn(async move {
            let buffered = {
                let mut guard = inner.lock().expect("update log mutex poisoned");
                guard.mode = LogMode::Replaying;
                std::mem::take(&mut guard.buffer)
            };
            let count = buffered.len() as u64;

            {
                let mut guard = inner.lock().expect("update log mutex poisoned");
                guard.main.extend(buffered);
                guard.mode = LogMode::Applying;
            }
            let _ = std::fs::remove_dir_all(&buffer_dir);
            RecoveryInfo { failed: false, count }
        })
    }

    /// The versions present when this process started, used to bound
    /// "what happened while I was down" (`spec.md` §4.3/§4.5).
    pub fn starting_versions(&self) -> Vec<Version> {
        self.lock().starting_versions.clone()
    }

    /// The versions currently sitting in the side-buffer tlog, sorted by
    /// absolute value descending (`spec.md` §4.5 step 4: "current
    /// BUFFERED version set").
    pub fn buffered_versions(&self) -> Vec<Version> {
        let inner = self.lock();
        let mut versions: Vec<Version> = inner.buffer.iter().map(|r| r.version).collect();
        versions.sort_by(|a, b| b.cmp(a));
        versions
    }

    /// A clone of the records currently sitting in the side-buffer tlog
    /// (`spec.md` §4.5 step 10: "Merge in our own bufferedUpdates").
    pub fn buffered_records(&self) -> Vec<LogRecord> {
        self.lock().buffer.clone()
    }

    /// Appends recovered (catch-up) records directly to the main tlog,
    /// bypassing BUFFERING routing. Used by PeerSync/full-fetch to apply
    /// historical records fetched from the leader, which are distinct
    /// from the live writes BUFFERING exists to hold (`spec.md` §4.5
    /// step 12).
    pub fn apply_recovered_updates(&self, records: Vec<LogRecord>) {
        let mut inner = self.lock();
        inner.main.extend(records);
    }

    /// True iff we crashed mid-BUFFERING and the `buffer/` directory
    /// marker from the previous run is still on disk.
    pub fn exist_old_buffer_log(&self) -> bool {
        self.had_old_buffer_log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn v(raw: i64) -> Version {
        Version::new(raw)
    }

    #[test]
    fn recent_versions_sorted_by_absolute_value_descending() {
        let dir = tempdir().unwrap();
        let log = UpdateLog::open(dir.path(), Vec::new());
        for raw in [5, -20, 10, -1] {
            log.append_update(OpKind::Add, v(raw), vec![]);
        }
        let recent = log.recent_versions(10);
        let raws: Vec<i64> = recent.iter().map(Version::as_i64).collect();
        assert_eq!(raws, vec![-20, 10, 5, -1]);
    }

    #[test]
    fn recent_versions_respects_bound() {
        let dir = tempdir().unwrap();
        let log = UpdateLog::open(dir.path(), Vec::new());
        for raw in 1..=10 {
            log.append_update(OpKind::Add, v(raw), vec![]);
        }
        assert_eq!(log.recent_versions(3).len(), 3);
    }

    #[tokio::test]
    async fn buffering_hides_updates_until_replay_completes() {
        let dir = tempdir().unwrap();
        let log = UpdateLog::open(dir.path(), Vec::new());
        log.append_update(OpKind::Add, v(1), vec![]);

        log.buffer_updates().unwrap();
        log.append_update(OpKind::Add, v(2), vec![]);
        log.append_update(OpKind::DeleteById, v(-3), vec![]);

        // Invariant 6: recentVersions unchanged while buffering.
        assert_eq!(log.recent_versions(10), vec![v(1)]);
        assert_eq!(log.mode(), LogMode::Buffering);

        let info = log.apply_buffered_updates().await.unwrap();
        assert!(!info.failed);
        assert_eq!(info.count, 2);
        assert_eq!(log.mode(), LogMode::Applying);

        let mut raws: Vec<i64> = log.recent_versions(10).iter().map(Version::as_i64).collect();
        raws.sort_by_key(|r| std::cmp::Reverse(r.unsigned_abs()));
        assert_eq!(raws, vec![-3, 2, 1]);
    }

    #[tokio::test]
    async fn every_buffered_update_appears_exactly_once_after_replay() {
        let dir = tempdir().unwrap();
        let log = UpdateLog::open(dir.path(), Vec::new());
        log.buffer_updates().unwrap();
        let fed: Vec<i64> = (1..=20).collect();
        for raw in &fed {
            log.append_update(OpKind::Add, v(*raw), vec![]);
        }
        log.apply_buffered_updates().await.unwrap();

        let mut seen: Vec<i64> = log.get_updates(&VersionSpec::List(fed.iter().map(|r| v(*r)).collect()))
            .iter()
            .map(|r| r.version.as_i64())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, fed);
    }

    #[test]
    fn exist_old_buffer_log_detects_prior_crash() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("buffer")).unwrap();
        let log = UpdateLog::open(dir.path(), Vec::new());
        assert!(log.exist_old_buffer_log());
    }

    #[test]
    fn get_updates_by_range_matches_absolute_value_window() {
        let dir = tempdir().unwrap();
        let log = UpdateLog::open(dir.path(), Vec::new());
        for raw in [10, -20, 30, -40, 50] {
            log.append_update(OpKind::Add, v(raw), vec![]);
        }
        let got = log.get_updates(&VersionSpec::Ranges(vec![(15, 35)]));
        let raws: Vec<i64> = got.iter().map(|r| r.version.as_i64()).collect();
        assert_eq!(raws, vec![30, -20]);
    }
}
