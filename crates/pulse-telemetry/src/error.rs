//! Telemetry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Subscriber init error: {0}")]
    SubscriberInit(String),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
