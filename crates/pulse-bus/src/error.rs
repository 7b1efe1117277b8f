//! Bus error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),
}

pub type BusResult<T> = Result<T, BusError>;
