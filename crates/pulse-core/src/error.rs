//! Error types for pulse-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown reason code: {0}")]
    UnknownReason(String),

    #[error("Unknown market type: {0}")]
    UnknownMarketType(String),

    #[error("Unknown block: {0}")]
    UnknownBlock(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
