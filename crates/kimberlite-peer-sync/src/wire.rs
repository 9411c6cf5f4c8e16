//! JSON wire shapes for the follower→leader recovery calls (`spec.md` §6).
//!
//! `onlyIfLeader=true` and `distrib=false` are query parameters, not part
//! of the JSON body, so they live on [`crate::client::HttpLeaderClient`]
//! rather than here.

use kimberlite_fingerprint::Fingerprint;
use kimberlite_types::cluster::Version;
use kimberlite_update_log::{LogRecord, VersionSpec};
use serde::{Deserialize, Serialize};

/// `GET /get?getVersions=N&fingerprint=true&onlyIfLeader=true` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetVersionsResponse {
    pub versions: Vec<Version>,
    pub fingerprint: Fingerprint,
}

/// `POST /get?getUpdates=<spec>&skipDbq=true&onlyIfLeader=true` request
/// body. `<spec>` is carried in the body rather than hand-encoded into
/// the query string; the query-string encoding in `spec.md` §6 is a
/// transport detail the leader's own HTTP layer owns, out of scope here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUpdatesRequest {
    pub spec: VersionSpec,
}

/// `{updates: [[opCode, version, payload], ...]}`. [`LogRecord`] already
/// has the right shape (op, version, payload), so the response is just a
/// list of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUpdatesResponse {
    pub updates: Vec<LogRecord>,
}

/// `GET /get?getFingerprint=<maxVersion>&onlyIfLeader=true` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFingerprintResponse {
    pub fingerprint: Fingerprint,
}
