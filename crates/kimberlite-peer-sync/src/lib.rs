//! PeerSync-with-leader delta catch-up (`spec.md` §4.5, component C5).
//!
//! If a follower is only "a few" updates behind its leader, PeerSync
//! fetches exactly those missing updates instead of copying the whole
//! index. See [`run_peer_sync`] for the algorithm and [`LeaderHandle`]
//! for the leader-side transport contract.

mod algorithm;
mod client;
mod error;
pub mod wire;

pub use algorithm::{run_peer_sync, PeerSyncConfig, PeerSyncFailure, PeerSyncOutcome};
pub use client::{HttpLeaderClient, LeaderHandle};
pub use error::{Error, Result};
