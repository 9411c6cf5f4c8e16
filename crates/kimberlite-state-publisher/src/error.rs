//! Errors for the state publisher (`spec.md` §4.9).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("state publisher worker is no longer running")]
    WorkerGone,

    #[error("coordination store error: {0}")]
    Coordination(#[from] kimberlite_coordination::CoordinationError),
}

pub type Result<T> = std::result::Result<T, Error>;
