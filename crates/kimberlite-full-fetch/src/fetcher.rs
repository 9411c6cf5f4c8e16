//! The staged full-index fetch (`spec.md` §4.6, component C6):
//! `commit_on_leader` → `list_remote_files` → `stream_missing_files` →
//! `atomic_swap`.

use std::path::{Path, PathBuf};

use kimberlite_types::Hash;

use crate::client::LeaderReplicationHandle;
use crate::error::{Error, Result};
use crate::wire::RemoteFile;

/// Options for one fetch attempt (`spec.md` §4.6).
#[derive(Debug, Clone, Copy, Default)]
pub struct FullFetchOptions {
    /// Advisory per `spec.md` §9's Open Question: only ever set for TLOG
    /// replicas; treated here as "best-effort — a commit failure with
    /// this set does not abort the fetch" rather than a hard requirement
    /// on the leader's commit contract.
    pub skip_commit_on_zero_master_version: bool,
    pub download_tlog: bool,
}

/// The outcome of a fetch attempt (`spec.md` §4.6:
/// `FetchResult{successful, message, exception?}`).
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub successful: bool,
    pub message: String,
    pub exception: Option<String>,
}

impl FetchResult {
    fn success(message: impl Into<String>) -> Self {
        Self {
            successful: true,
            message: message.into(),
            exception: None,
        }
    }

    fn failure(message: impl Into<String>, exception: impl Into<String>) -> Self {
        Self {
            successful: false,
            message: message.into(),
            exception: Some(exception.into()),
        }
    }
}

/// Pulls a consistent index snapshot from `leader` into `dest_dir`.
///
/// Idempotent on repeat (`spec.md` §4.6): files are staged under
/// `<dest_dir>.partial` and only swapped into `dest_dir` once every file
/// is present with the right size and checksum. A restarted fetch resumes
/// in place of re-downloading files it already staged correctly.
pub async fn fetch(
    leader: &dyn LeaderReplicationHandle,
    dest_dir: &Path,
    options: FullFetchOptions,
) -> FetchResult {
    match fetch_inner(leader, dest_dir, options).await {
        Ok(message) => FetchResult::success(message),
        Err(err) => FetchResult::failure("full index fetch failed", err.to_string()),
    }
}

async fn fetch_inner(
    leader: &dyn LeaderReplicationHandle,
    dest_dir: &Path,
    options: FullFetchOptions,
) -> Result<String> {
    if let Err(err) = leader.commit().await {
        if options.skip_commit_on_zero_master_version {
            tracing::warn!(%err, "commit-on-leader failed, proceeding (advisory per skipCommitOnMasterVersionZero)");
        } else {
            return Err(err);
        }
    }

    let files = leader.list_files(options.skip_commit_on_zero_master_version).await?;

    if destination_already_matches(dest_dir, &files).await {
        tracing::debug!(dest = %dest_dir.display(), "destination already matches leader snapshot, skipping download");
        return Ok("already up to date".to_string());
    }

    let staging_dir = staging_dir_for(dest_dir);
    tokio::fs::create_dir_all(&staging_dir).await?;

    for file in &files {
        stream_one_file(leader, &staging_dir, file).await?;
    }

    atomic_swap(dest_dir, &staging_dir).await?;

    Ok(format!("fetched {} files from leader", files.len()))
}

fn staging_dir_for(dest: &Path) -> PathBuf {
    let name = dest.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    dest.with_file_name(format!("{name}.partial"))
}

async fn destination_already_matches(dest_dir: &Path, files: &[RemoteFile]) -> bool {
    for file in files {
        let path = dest_dir.join(&file.name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() == file.size => continue,
            _ => return false,
        }
    }
    true
}

/// Downloads one file into the staging directory, resuming from the
/// locally-staged byte count if a prior attempt left a partial copy.
async fn stream_one_file(
    leader: &dyn LeaderReplicationHandle,
    staging_dir: &Path,
    file: &RemoteFile,
) -> Result<()> {
    let local_path = staging_dir.join(&file.name);

    let existing_len = match tokio::fs::metadata(&local_path).await {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };

    if existing_len == file.size {
        tracing::debug!(file = %file.name, "staged file already complete, skipping re-download");
        return Ok(());
    }
    if existing_len > file.size {
        // Stale/corrupt partial from a different snapshot; restart clean.
        tokio::fs::remove_file(&local_path).await.ok();
    }
    let offset = if existing_len <= file.size { existing_len } else { 0 };

    let bytes = leader.fetch_file(&file.name, offset).await?;

    if offset == 0 {
        tokio::fs::write(&local_path, &bytes).await?;
    } else {
        use tokio::io::AsyncWriteExt;
        let mut handle = tokio::fs::OpenOptions::new().append(true).open(&local_path).await?;
        handle.write_all(&bytes).await?;
    }

    let actual = checksum_file(&local_path).await?;
    if actual != file.checksum {
        return Err(Error::ChecksumMismatch {
            name: file.name.clone(),
            expected: file.checksum,
            actual,
        });
    }

    Ok(())
}

async fn checksum_file(path: &Path) -> Result<Hash> {
    let content = tokio::fs::read(path).await?;
    let digest = blake3::hash(&content);
    Ok(Hash::from_bytes(*digest.as_bytes()))
}

/// Swaps the staged snapshot into place. `dest_dir`'s prior contents (if
/// any) are moved aside and removed only after the new directory is
/// successfully in place, so a crash mid-swap never leaves `dest_dir`
/// half-written.
async fn atomic_swap(dest_dir: &Path, staging_dir: &Path) -> Result<()> {
    let backup_dir = dest_dir.with_file_name(format!(
        "{}.previous",
        dest_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
    ));

    if tokio::fs::metadata(dest_dir).await.is_ok() {
        tokio::fs::rename(dest_dir, &backup_dir).await?;
    }
    tokio::fs::rename(staging_dir, dest_dir).await?;
    tokio::fs::remove_dir_all(&backup_dir).await.ok();
    Ok(())
}
