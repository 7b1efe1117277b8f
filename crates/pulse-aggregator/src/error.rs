//! Aggregator error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type AggResult<T> = Result<T, AggregatorError>;
