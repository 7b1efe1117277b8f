//! Bus event payloads.
//!
//! Field names follow the wire contract (camelCase). Every field an
//! upstream producer might omit is optional; the aggregator tolerates
//! malformed payloads defensively instead of rejecting them.

use crate::block::Block;
use crate::market::MarketType;
use crate::status::MarketDataStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Common event metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventMeta {
    /// Event timestamp in milliseconds since the UNIX epoch.
    pub ts: i64,
}

impl EventMeta {
    #[must_use]
    pub fn at(ts: i64) -> Self {
        Self { ts }
    }
}

/// A per-bucket aggregated metric event (canonical price, CVD, liquidity,
/// open interest, funding, liquidations).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedPayload {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub market_type: Option<MarketType>,
    #[serde(default)]
    pub stream_id: Option<String>,
    /// Fused confidence in [0,1]. Non-finite values are treated as 0.
    #[serde(default)]
    pub confidence_score: Option<f64>,
    /// Source-ids that contributed to this aggregate.
    #[serde(default)]
    pub sources_used: Option<Vec<String>>,
    /// Sources dropped from the fusion because they were stale.
    #[serde(default)]
    pub stale_sources_dropped: Option<u32>,
    #[serde(default)]
    pub mismatch_detected: Option<bool>,
    /// Fused value where the metric has one (canonical price).
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub meta: EventMeta,
}

/// A raw exchange-level event (trade, book update, ticker, kline, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPayload {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub market_type: Option<MarketType>,
    #[serde(default)]
    pub stream_id: Option<String>,
    /// Producing source-id; derived from the stream id when absent.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Index price carried by ticker events, when present.
    #[serde(default)]
    pub index_price: Option<Decimal>,
    #[serde(default)]
    pub meta: EventMeta,
}

impl RawPayload {
    /// Effective source-id: explicit field, else the first `:`-separated
    /// segment of the stream id, else `"unknown"`.
    #[must_use]
    pub fn source_id(&self) -> String {
        if let Some(source) = &self.source {
            if !source.is_empty() {
                return source.clone();
            }
        }
        self.stream_id
            .as_deref()
            .and_then(|id| id.split(':').next())
            .filter(|s| !s.is_empty())
            .unwrap_or(crate::market::UNKNOWN_SOURCE)
            .to_string()
    }
}

/// Connection lifecycle event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPayload {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub meta: EventMeta,
}

/// Externally detected data-quality signal (mismatch, gap, out-of-order).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityPayload {
    #[serde(default)]
    pub symbol: Option<String>,
    /// Block the signal concerns; defaults to `price` when absent.
    #[serde(default)]
    pub block: Option<Block>,
    /// Timestamp skew for out-of-order reports, in milliseconds.
    #[serde(default)]
    pub skew_ms: Option<i64>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub meta: EventMeta,
}

/// Externally published confidence for a metric cache key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidencePayload {
    #[serde(default)]
    pub symbol: Option<String>,
    /// Cache key the confidence applies to (e.g. `flow_spot`,
    /// `derivatives_funding`, or any externally defined key).
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub sources_used: Option<Vec<String>>,
    #[serde(default)]
    pub mismatch_detected: Option<bool>,
    #[serde(default)]
    pub meta: EventMeta,
}

/// Any event delivered over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BusEvent {
    Aggregated(AggregatedPayload),
    Raw(RawPayload),
    Connection(ConnectionPayload),
    Quality(QualityPayload),
    Confidence(ConfidencePayload),
    Status(MarketDataStatus),
}

impl BusEvent {
    /// Parse an event from its wire JSON.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize an event to wire JSON.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
