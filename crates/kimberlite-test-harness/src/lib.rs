//! Cross-crate integration scenarios for the replica recovery core.
//!
//! Every `#[cfg(test)]` module inside the individual recovery crates
//! covers that crate's own unit-level behavior; the scenarios in this
//! crate's `tests/` directory are the ones that only make sense wired
//! across several crates at once — a replica running the full
//! `RecoveryStrategy` state machine against an `InMemoryStore` and a
//! fake leader HTTP responder (`spec.md` §8, scenarios S1-S6, round-trip
//! properties R1-R3, and invariants 2 and 4).
//!
//! This crate has no runtime code of its own; it only exists to host
//! those integration tests and their shared fixtures.

pub mod fixtures;
