//! Recovery-aware update log (`spec.md` §3/§4.3, component C3).
//!
//! Three modes: APPLYING (normal), BUFFERING (incoming updates go to a
//! side-buffer tlog while the main index is untouched), REPLAYING
//! (draining the buffer into the main log). See [`UpdateLog`].

mod error;
mod log;
mod types;

pub use error::{Error, Result};
pub use log::UpdateLog;
pub use types::{LogMode, LogRecord, OpKind, RecoveryInfo, VersionSpec};
