//! The follower's replication-side handle to its leader (`spec.md` §6):
//! commit, list files, fetch file content.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::wire::{FetchIndexResponse, RemoteFile};

/// Idle timeout for full-fetch HTTP calls (`spec.md` §5: "default 60s for
/// fetches").
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Replication calls a follower issues against its leader during a full
/// index fetch (`spec.md` §4.6/§6). Object-safe so tests can substitute
/// an in-memory fake leader.
#[async_trait]
pub trait LeaderReplicationHandle: Send + Sync {
    /// `POST /update?commit=true&openSearcher=false&commit_end_point=terminal`:
    /// stabilizes the leader's current index view before streaming files.
    async fn commit(&self) -> Result<()>;

    /// `POST /replication?command=fetchindex&masterUrl=<leader>&...`'s
    /// streamed file-list portion: every segment file in the leader's
    /// current (just-committed) snapshot.
    async fn list_files(&self, skip_commit_on_zero_master_version: bool) -> Result<Vec<RemoteFile>>;

    /// Streams one file's bytes starting at `offset`, supporting resume
    /// of a partially-downloaded file.
    async fn fetch_file(&self, name: &str, offset: u64) -> Result<Vec<u8>>;
}

/// `reqwest`-backed [`LeaderReplicationHandle`].
pub struct HttpReplicationClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReplicationClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder with only timeout configured never fails");
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl LeaderReplicationHandle for HttpReplicationClient {
    async fn commit(&self) -> Result<()> {
        let url = format!("{}/update", self.base_url);
        self.client
            .post(&url)
            .query(&[
                ("commit", "true"),
                ("openSearcher", "false"),
                ("commit_end_point", "terminal"),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn list_files(&self, skip_commit_on_zero_master_version: bool) -> Result<Vec<RemoteFile>> {
        let url = format!("{}/replication", self.base_url);
        let resp: FetchIndexResponse = self
            .client
            .post(&url)
            .query(&[
                ("command", "fetchindex"),
                ("masterUrl", self.base_url.as_str()),
                (
                    "skipCommitOnMasterVersionZero",
                    if skip_commit_on_zero_master_version { "true" } else { "false" },
                ),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.files)
    }

    async fn fetch_file(&self, name: &str, offset: u64) -> Result<Vec<u8>> {
        let url = format!("{}/replication", self.base_url);
        let bytes = self
            .client
            .get(&url)
            .query(&[
                ("command", "filecontent"),
                ("file", name),
                ("offset", offset.to_string().as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}
