//! Structured logging, Prometheus metrics, and status reporting for the
//! marketpulse readiness aggregator.

pub mod error;
pub mod logging;
pub mod metrics;
pub mod status_reporter;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use status_reporter::StatusReporter;
