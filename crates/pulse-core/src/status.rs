//! The published readiness status payload.

use crate::block::Block;
use crate::events::EventMeta;
use crate::reason::ReasonCode;
use serde::{Deserialize, Serialize};

/// Per-block confidence vector, each component in [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockConfidence {
    pub price: f64,
    pub flow: f64,
    pub liquidity: f64,
    pub derivatives: f64,
}

impl BlockConfidence {
    /// Confidence of a single block.
    #[must_use]
    pub fn get(&self, block: Block) -> f64 {
        match block {
            Block::Price => self.price,
            Block::Flow => self.flow,
            Block::Liquidity => self.liquidity,
            Block::Derivatives => self.derivatives,
        }
    }

    pub fn set(&mut self, block: Block, value: f64) {
        match block {
            Block::Price => self.price = value,
            Block::Flow => self.flow = value,
            Block::Liquidity => self.liquidity = value,
            Block::Derivatives => self.derivatives = value,
        }
    }
}

/// Readiness status published on `system:market_data_status` once per
/// evaluation tick.
///
/// Invariants: `degraded == !degraded_reasons.is_empty()`;
/// `overall_confidence`, every block confidence, and `warming_progress`
/// lie in [0,1]; `degraded_reasons` is a subsequence of
/// [`ReasonCode::CANONICAL`]; all source lists are deduplicated and
/// lexicographically sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataStatus {
    pub overall_confidence: f64,
    pub block_confidence: BlockConfidence,
    pub degraded: bool,
    pub degraded_reasons: Vec<ReasonCode>,
    pub warming_up: bool,
    pub warming_progress: f64,
    pub warming_window_ms: i64,
    /// Count of distinct source-ids active this tick (raw or aggregated).
    pub active_sources: usize,
    /// Count of distinct source-ids contractually expected.
    pub expected_sources: usize,
    pub active_sources_agg: Vec<String>,
    pub active_sources_raw: Vec<String>,
    pub expected_sources_agg: Vec<String>,
    pub expected_sources_raw: Vec<String>,
    /// Worst overall confidence observed in the current UTC minute.
    pub worst_confidence_in_minute: f64,
    /// Union of raw (pre-hysteresis) reasons in the current UTC minute.
    pub minute_reasons: Vec<ReasonCode>,
    pub last_bucket_ts: i64,
    pub meta: EventMeta,
}
