//! Index fingerprint (`spec.md` §4.4, component C4).
//!
//! A deterministic summary of committed index contents at a version
//! cutoff, comparable across replicas without transferring data: two
//! replicas that applied the same committed updates up to the same
//! cutoff must produce equal fingerprints.

use kimberlite_types::{cluster::Version, Hash};
use serde::{Deserialize, Serialize};

/// `maxVersion = MAX_INT64` means "at head" (`spec.md` §6).
pub const AT_HEAD: i64 = i64::MAX;

/// The opaque "on-disk index engine" primitive this component consumes
/// (`spec.md` §1: "recovery consumes its... operations as opaque
/// primitives"). A real implementation walks committed segments; tests
/// use an in-memory fake.
pub trait CommittedIndexView: Send + Sync {
    /// Every `(doc_id, version)` pair visible at `max_version_specified`,
    /// in any order — the hash accumulator is commutative specifically
    /// so order never matters here.
    fn documents_up_to(&self, max_version_specified: i64) -> Vec<(u64, Version)>;
}

/// A deterministic summary of committed index content at a version
/// cutoff (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub max_version_specified: i64,
    /// The largest version actually seen; may be less than
    /// `max_version_specified` if the index hasn't caught up that far.
    pub max_version_encountered: i64,
    pub max_doc: u64,
    pub num_docs: u64,
    pub hash: Hash,
}

impl Fingerprint {
    /// Computes a fingerprint by hashing every visible `(doc_id,
    /// version)` pair with `version <= max_version_specified` into a
    /// commutative (XOR) accumulator, so the result never depends on
    /// visitation order.
    pub fn compute(view: &dyn CommittedIndexView, max_version_specified: i64) -> Self {
        let docs = view.documents_up_to(max_version_specified);

        let mut hash = Hash::GENESIS;
        let mut max_version_encountered: i64 = 0;
        let mut max_doc: u64 = 0;

        for (doc_id, version) in &docs {
            hash.xor_with(&hash_doc_version(*doc_id, *version));
            max_version_encountered = max_version_encountered.max(version.as_i64());
            max_doc = max_doc.max(*doc_id);
        }

        Self {
            max_version_specified,
            max_version_encountered,
            max_doc,
            num_docs: docs.len() as u64,
            hash,
        }
    }

    /// `compare(a, b) == 0` in `spec.md` §4.4's terms: true iff the two
    /// fingerprints are semantically equal (same hash, doc count, and
    /// max version encountered). `max_version_specified` is deliberately
    /// excluded: two fingerprints computed at different cutoffs that
    /// happen to have seen the same committed content are still equal.
    pub fn matches(&self, other: &Fingerprint) -> bool {
        self.hash == other.hash
            && self.num_docs == other.num_docs
            && self.max_version_encountered == other.max_version_encountered
    }
}

fn hash_doc_version(doc_id: u64, version: Version) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&doc_id.to_le_bytes());
    hasher.update(&version.as_i64().to_le_bytes());
    Hash::from_bytes(*hasher.finalize().as_bytes())
}
