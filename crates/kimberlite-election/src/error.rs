//! Errors for leader election consult and prep-recovery (`spec.md` §4.8).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("prep-recovery request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("prep-recovery timed out after {attempts} attempt(s)")]
    TimedOut { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
