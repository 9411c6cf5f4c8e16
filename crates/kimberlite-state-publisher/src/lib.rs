//! Coalescing publisher for replica state transitions (`spec.md` §4.9,
//! component C9).
//!
//! Recovery, election, and ordinary indexing all drive a replica through
//! [`kimberlite_types::cluster::ReplicaState`] transitions that the rest of
//! the cluster learns about via the coordination store. This crate owns the
//! write side of that path: batching transitions per collection and
//! flushing them as the compact delta blob described in `spec.md` §6,
//! rather than issuing one versioned write per hop.

mod error;
mod publisher;
pub mod wire;

pub use error::{Error, Result};
pub use publisher::{StatePublisher, DEFAULT_FLUSH_INTERVAL};
