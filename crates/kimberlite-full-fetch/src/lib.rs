//! Full-index fetcher (`spec.md` §4.6, component C6): pulls a consistent
//! index snapshot from the leader when delta catch-up (PeerSync) is
//! insufficient.

mod client;
mod error;
mod fetcher;
pub mod wire;

pub use client::{HttpReplicationClient, LeaderReplicationHandle, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
pub use fetcher::{fetch, FetchResult, FullFetchOptions};
