//! The state-updates delta blob (`spec.md` §4.2/§6): a small JSON object
//! mapping replica internal-id to its compact state code, written under
//! `/collections/<name>/state-updates` so followers of the full collection
//! document can pick up a leader/state change without waiting for a full
//! document republish.

use std::collections::HashMap;

use kimberlite_types::cluster::{ReplicaId, ReplicaState};
use serde::{Deserialize, Serialize};

/// Wire shape of the state-updates blob: `{"<replicaId>": <code>, ...}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDelta(HashMap<String, u8>);

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, replica_id: ReplicaId, state: ReplicaState) {
        self.0.insert(replica_id.as_u64().to_string(), state.to_code());
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.0)
    }

    /// Decodes entries, skipping any code the caller's `ReplicaState`
    /// doesn't recognize rather than failing the whole blob.
    pub fn decode(bytes: &[u8]) -> serde_json::Result<Vec<(ReplicaId, ReplicaState)>> {
        let raw: HashMap<String, u8> = serde_json::from_slice(bytes)?;
        Ok(raw
            .into_iter()
            .filter_map(|(id, code)| {
                let id: u64 = id.parse().ok()?;
                let state = ReplicaState::from_code(code)?;
                Some((ReplicaId::new(id), state))
            })
            .collect())
    }
}
