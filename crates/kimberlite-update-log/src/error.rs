//! Errors for the update log (`spec.md` §4.3).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A buffer-directory operation failed (creating/removing the
    /// `buffer/` marker subdirectory from `spec.md` §6).
    #[error("update log buffer-directory error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
