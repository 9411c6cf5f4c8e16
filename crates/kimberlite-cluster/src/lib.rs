//! Cluster-state reader and fetch queue (`spec.md` §4.2, component C2).
//!
//! Maintains a live, in-memory projection of every watched collection:
//! its shards, replicas, and their lifecycle states. A single worker task
//! owns all fetches from the coordination store and coalesces bursts of
//! fetch requests into one round-trip per collection, per the algorithm
//! in §4.2.

mod error;
mod paths;
mod reader;
mod worker;

pub use error::{Error, Result};
pub use reader::ClusterStateReader;
pub use worker::FetchRequest;
