//! Record and query types for the update log (`spec.md` §3/§4.3).

use kimberlite_types::cluster::Version;
use serde::{Deserialize, Serialize};

/// The operation a log entry represents. Add/delete-by-id are already
/// distinguished by [`Version`]'s sign bit; delete-by-query gets its own
/// op-code word because a query deletion has no single document version
/// to carry the sign (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Add,
    DeleteById,
    DeleteByQuery,
}

/// One entry in the update log. Also doubles as the wire shape for the
/// `getUpdates` response's `[opCode, version, payload]` entries
/// (`spec.md` §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub version: Version,
    pub op: OpKind,
    pub payload: Vec<u8>,
}

impl LogRecord {
    pub fn new(version: Version, op: OpKind, payload: Vec<u8>) -> Self {
        Self { version, op, payload }
    }
}

/// The update log's buffering state machine (`spec.md` §4.3):
/// `APPLYING --bufferUpdates--> BUFFERING --applyBufferedUpdates--> REPLAYING --(done)--> APPLYING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Applying,
    Buffering,
    Replaying,
}

/// A `getUpdates` request: either an explicit list of signed versions, or
/// a set of half-open `[lo, hi)` ranges keyed by absolute value
/// (`spec.md` §4.3/§6). Doubles as the wire encoding of the `<spec>`
/// query parameter in the `getUpdates` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionSpec {
    List(Vec<Version>),
    Ranges(Vec<(u64, u64)>),
}

/// The result of draining the buffer into the main log
/// (`spec.md` §4.3: `applyBufferedUpdates()` "completing with
/// RecoveryInfo{failed:bool}"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoveryInfo {
    pub failed: bool,
    pub count: u64,
}
