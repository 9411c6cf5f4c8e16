//! Leader election consult and prep-recovery handshake (`spec.md` §4.8,
//! component C8).
//!
//! The ephemeral-sequence election algorithm itself lives in the
//! coordination store and is out of scope (`spec.md` §1): this crate
//! covers the follower-side [`is_leader`] consult against the C2
//! projection and the prep-recovery wire call a follower sends its
//! leader before fetching.

mod client;
mod error;
mod local;
mod prep;
pub mod wire;

pub use client::{HttpPrepRecoveryClient, PrepRecoveryHandle, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
pub use local::{current_leader_base_url, is_leader};
pub use prep::prep_recovery_with_retry;
