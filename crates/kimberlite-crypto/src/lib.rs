//! Checksum primitives shared by the recovery crates.
//!
//! Full-index fetch (`kimberlite-full-fetch`) uses [`crc32`] to verify
//! segment files as they stream in from the leader. Fingerprinting
//! (`kimberlite-fingerprint`) uses `blake3` directly rather than through
//! this crate, since its commutative-hash requirement doesn't fit the
//! streaming-checksum shape `crc32` provides.

pub mod crc32;

pub use crc32::{crc32, Crc32};
