//! The follower's view of its leader: the three recovery-query calls
//! `spec.md` §6 requires (`getVersions`+fingerprint, `getUpdates`,
//! `getFingerprint`), plus the `reqwest`-backed HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use kimberlite_fingerprint::{Fingerprint, AT_HEAD};
use kimberlite_types::cluster::Version;
use kimberlite_update_log::{LogRecord, VersionSpec};

use crate::error::{Error, Result};
use crate::wire::{GetFingerprintResponse, GetUpdatesRequest, GetUpdatesResponse, GetVersionsResponse};

/// Default idle timeout for PeerSync's leader calls. `spec.md` §5 pins
/// the fetch idle timeout at 60s; PeerSync's own calls are smaller and
/// more frequent, so a dedicated, shorter timeout is used here.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// The follower's handle to its leader for PeerSync purposes
/// (`spec.md` §4.5, §6). Object-safe so [`crate::run_peer_sync`] can take
/// a `&dyn LeaderHandle` and tests can substitute an in-memory fake.
#[async_trait]
pub trait LeaderHandle: Send + Sync {
    /// `GET /get?getVersions=N&fingerprint=true&onlyIfLeader=true`: the
    /// leader's N newest versions, newest-first, plus its fingerprint at
    /// `+∞` (`spec.md` §4.5 step 2).
    async fn recent_versions_and_fingerprint(&self, n_updates: usize) -> Result<(Vec<Version>, Fingerprint)>;

    /// `POST /get?getUpdates=<spec>&skipDbq=true&onlyIfLeader=true`
    /// (`spec.md` §4.5 step 9).
    async fn get_updates(&self, spec: &VersionSpec) -> Result<Vec<LogRecord>>;

    /// `GET /get?getFingerprint=<maxVersion>&onlyIfLeader=true`
    /// (`spec.md` §6). `max_version = AT_HEAD` means "at head".
    async fn fingerprint(&self, max_version: i64) -> Result<Fingerprint>;
}

/// `reqwest`-backed [`LeaderHandle`] talking to a real leader base URL.
pub struct HttpLeaderClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLeaderClient {
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
impl LeaderHandle for HttpLeaderClient {
    async fn recent_versions_and_fingerprint(&self, n_updates: usize) -> Result<(Vec<Version>, Fingerprint)> {
        let url = format!("{}/get", self.base_url);
        let resp: GetVersionsResponse = self
            .client
            .get(&url)
            .query(&[
                ("getVersions", n_updates.to_string()),
                ("fingerprint", "true".to_string()),
                ("onlyIfLeader", "true".to_string()),
                ("distrib", "false".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok((resp.versions, resp.fingerprint))
    }

    async fn get_updates(&self, spec: &VersionSpec) -> Result<Vec<LogRecord>> {
        let url = format!("{}/get", self.base_url);
        let resp: GetUpdatesResponse = self
            .client
            .post(&url)
            .query(&[
                ("skipDbq", "true"),
                ("onlyIfLeader", "true"),
                ("distrib", "false"),
            ])
            .json(&GetUpdatesRequest { spec: spec.clone() })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.updates)
    }

    async fn fingerprint(&self, max_version: i64) -> Result<Fingerprint> {
        let url = format!("{}/get", self.base_url);
        let max_version = if max_version == AT_HEAD {
            i64::MAX
        } else {
            max_version
        };
        let resp: GetFingerprintResponse = self
            .client
            .get(&url)
            .query(&[
                ("getFingerprint", max_version.to_string()),
                ("onlyIfLeader", "true".to_string()),
                ("distrib", "false".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.fingerprint)
    }
}

/// Maps a transport failure into [`Error::MalformedResponse`] when the
/// shape is right but the content isn't usable (kept separate from
/// `reqwest::Error` so callers can distinguish network failure from
/// protocol mismatch, per `spec.md` §7's "Protocol mismatch" kind).
pub fn malformed(reason: impl Into<String>) -> Error {
    Error::MalformedResponse(reason.into())
}
