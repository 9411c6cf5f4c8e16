//! Coordination-store path layout (`spec.md` §6).

use kimberlite_types::CollectionName;

pub fn full_doc_path(name: &CollectionName) -> String {
    format!("/collections/{}/state.json", name.as_str())
}

pub fn state_updates_path(name: &CollectionName) -> String {
    format!("/collections/{}/state-updates", name.as_str())
}

pub fn live_nodes_root() -> &'static str {
    "/live_nodes"
}
