//! Facade-level errors: configuration loading is the only fallible step
//! this crate introduces on top of the recovery components it wires
//! together.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load recovery configuration: {0}")]
    Config(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
