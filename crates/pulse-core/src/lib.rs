//! Core domain types for the marketpulse readiness aggregator.
//!
//! This crate provides the fundamental types shared across the system:
//! - `Block`: the four coarse readiness dimensions
//! - `ReasonCode`: degradation reasons with their canonical ordering
//! - `MarketType`, `FeedKind`, `MetricKind`: feed classification
//! - `BucketClock`: event-time bucketing
//! - Event payloads and the published `MarketDataStatus`

pub mod block;
pub mod bucket;
pub mod error;
pub mod events;
pub mod feeds;
pub mod market;
pub mod reason;
pub mod status;

pub use block::Block;
pub use bucket::{BucketClock, MIN_BUCKET_MS};
pub use error::{CoreError, Result};
pub use events::{
    AggregatedPayload, BusEvent, ConfidencePayload, ConnectionPayload, EventMeta, QualityPayload,
    RawPayload,
};
pub use feeds::{DerivativeKind, FeedKind, FlowKind, MetricKind};
pub use market::{normalize_symbol, MarketType, UNKNOWN_SOURCE, UNKNOWN_SYMBOL};
pub use reason::{project_canonical, ReasonClass, ReasonCode};
pub use status::{BlockConfidence, MarketDataStatus};
