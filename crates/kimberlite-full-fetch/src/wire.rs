//! Wire shapes for the replication endpoints (`spec.md` §6).

use kimberlite_types::Hash;
use serde::{Deserialize, Serialize};

/// One file in the leader's current index snapshot, as returned by the
/// `fetchindex` command's streamed file list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub size: u64,
    pub checksum: Hash,
}

/// `POST /replication?command=fetchindex&masterUrl=<leader>&skipCommitOnMasterVersionZero=<bool>`
/// response: the file list for this snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchIndexResponse {
    pub files: Vec<RemoteFile>,
}
