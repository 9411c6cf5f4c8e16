//! Wire shapes for the prep-recovery handshake (`spec.md` §6):
//! `POST /admin/cores?action=PREPRECOVERY&coreName=<follower>&leaderName=<leader>&state=BUFFERING&checkIsLeader=true`.

use serde::{Deserialize, Serialize};

/// A prep-recovery request. `state` is always `"BUFFERING"` per
/// `spec.md` §4.8/§6: the follower only ever calls this right after it
/// has published itself as buffering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepRecoveryRequest {
    pub core_name: String,
    pub leader_name: String,
    pub state: String,
    pub check_is_leader: bool,
}

impl PrepRecoveryRequest {
    pub fn new(core_name: impl Into<String>, leader_name: impl Into<String>) -> Self {
        Self {
            core_name: core_name.into(),
            leader_name: leader_name.into(),
            state: "BUFFERING".to_string(),
            check_is_leader: true,
        }
    }
}

/// `{success: bool}` (`spec.md` §4.8/§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepRecoveryResponse {
    pub success: bool,
}
