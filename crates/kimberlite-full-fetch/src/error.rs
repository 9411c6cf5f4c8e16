//! Errors for the full-index fetcher (`spec.md` §4.6).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("leader request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("staging directory I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: kimberlite_types::Hash,
        actual: kimberlite_types::Hash,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
