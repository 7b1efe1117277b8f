//! Readiness aggregator configuration.

use crate::error::{AggResult, AggregatorError};
use pulse_core::{Block, DerivativeKind, FlowKind, MarketType, MIN_BUCKET_MS};
use pulse_registry::{BlockSources, ExpectedSourcesConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Confidence floors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Per-critical-block confidence floor.
    #[serde(default = "default_critical_block_threshold")]
    pub critical_block: f64,
    /// Overall confidence floor.
    #[serde(default = "default_overall_threshold")]
    pub overall: f64,
}

fn default_critical_block_threshold() -> f64 {
    0.55
}

fn default_overall_threshold() -> f64 {
    0.65
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            critical_block: default_critical_block_threshold(),
            overall: default_overall_threshold(),
        }
    }
}

/// Pre-normalisation block weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockWeights {
    #[serde(default = "default_price_weight")]
    pub price: f64,
    #[serde(default = "default_flow_weight")]
    pub flow: f64,
    #[serde(default = "default_liquidity_weight")]
    pub liquidity: f64,
    #[serde(default = "default_derivatives_weight")]
    pub derivatives: f64,
}

fn default_price_weight() -> f64 {
    0.4
}

fn default_flow_weight() -> f64 {
    0.3
}

fn default_liquidity_weight() -> f64 {
    0.15
}

fn default_derivatives_weight() -> f64 {
    0.15
}

impl BlockWeights {
    /// Pre-normalisation weight of a block, floored at 0.
    #[must_use]
    pub fn get(&self, block: Block) -> f64 {
        let raw = match block {
            Block::Price => self.price,
            Block::Flow => self.flow,
            Block::Liquidity => self.liquidity,
            Block::Derivatives => self.derivatives,
        };
        if raw.is_finite() {
            raw.max(0.0)
        } else {
            0.0
        }
    }
}

impl Default for BlockWeights {
    fn default() -> Self {
        Self {
            price: default_price_weight(),
            flow: default_flow_weight(),
            liquidity: default_liquidity_weight(),
            derivatives: default_derivatives_weight(),
        }
    }
}

/// Per-class hysteresis windows, all in milliseconds of event time.
///
/// A window of 0 makes the gate transparent for that transition.
/// `readiness_stability_window_ms` is an accepted alias for the hard exit
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HysteresisConfig {
    #[serde(default)]
    pub hard_fast_reason_enter_window_ms: i64,
    #[serde(default)]
    pub hard_reason_enter_window_ms: i64,
    #[serde(default)]
    pub soft_reason_enter_window_ms: i64,
    #[serde(default, alias = "readiness_stability_window_ms")]
    pub hard_reason_exit_window_ms: i64,
    #[serde(default)]
    pub soft_reason_exit_window_ms: i64,
}

/// Full aggregator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Evaluation bucket width in milliseconds (clamped to >= 100).
    #[serde(default = "default_bucket_ms")]
    pub bucket_ms: i64,
    /// Warming window; 0 disables warming, otherwise clamped to >= 1000.
    #[serde(default = "default_warming_window_ms")]
    pub warming_window_ms: i64,
    /// Suppress most reasons for this long after the first tick.
    #[serde(default)]
    pub startup_grace_window_ms: i64,
    /// Minimum spacing between identical status log lines.
    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: i64,
    /// Continuous data flow required after a disconnect before the
    /// WebSocket-degraded state clears (clamped to >= 1000).
    #[serde(default = "default_ws_recovery_window_ms")]
    pub ws_recovery_window_ms: i64,
    /// If > 0, raise a lag reason when the newest raw data is older.
    #[serde(default)]
    pub no_data_window_ms: i64,
    /// Default confidence staleness threshold; `None` means one bucket.
    #[serde(default)]
    pub confidence_stale_window_ms: Option<i64>,
    /// Staleness threshold for derivatives metrics; `None` falls back to
    /// the default threshold.
    #[serde(default)]
    pub derivatives_stale_window_ms: Option<i64>,
    /// Out-of-order skew tolerated before the lag flag is set.
    #[serde(default)]
    pub out_of_order_tolerance_ms: i64,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub weights: BlockWeights,
    /// Blocks that count toward the overall confidence and low-conf
    /// reasons.
    #[serde(default = "default_critical_blocks")]
    pub critical_blocks: BTreeSet<Block>,
    /// Global floor on the expected aggregated source count.
    #[serde(default)]
    pub expected_sources: usize,
    /// Flat per-block fallback expected lists.
    #[serde(default)]
    pub expected_sources_by_block: BlockSources,
    /// Hierarchical per-symbol/market-type expected config.
    #[serde(default)]
    pub expected_sources_config: ExpectedSourcesConfig,
    /// Flow sub-kinds the feed is expected to deliver.
    #[serde(default = "default_expected_flow_types")]
    pub expected_flow_types: BTreeSet<FlowKind>,
    /// Derivative sub-kinds the feed is expected to deliver.
    #[serde(default = "default_expected_derivative_kinds")]
    pub expected_derivative_kinds: BTreeSet<DerivativeKind>,
    /// When set, only events of this market type are recorded.
    #[serde(default)]
    pub target_market_type: Option<MarketType>,
    #[serde(default)]
    pub hysteresis: HysteresisConfig,
    /// Structured JSON status records; `None` falls back to the
    /// `MARKET_STATUS_JSON` environment variable.
    #[serde(default)]
    pub market_status_json: Option<bool>,
}

fn default_bucket_ms() -> i64 {
    1000
}

fn default_warming_window_ms() -> i64 {
    30 * 60 * 1000
}

fn default_log_interval_ms() -> i64 {
    60_000
}

fn default_ws_recovery_window_ms() -> i64 {
    5000
}

fn default_critical_blocks() -> BTreeSet<Block> {
    Block::ALL.into_iter().collect()
}

fn default_expected_flow_types() -> BTreeSet<FlowKind> {
    [FlowKind::Spot, FlowKind::Futures].into_iter().collect()
}

fn default_expected_derivative_kinds() -> BTreeSet<DerivativeKind> {
    [
        DerivativeKind::Oi,
        DerivativeKind::Funding,
        DerivativeKind::Liquidations,
    ]
    .into_iter()
    .collect()
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            bucket_ms: default_bucket_ms(),
            warming_window_ms: default_warming_window_ms(),
            startup_grace_window_ms: 0,
            log_interval_ms: default_log_interval_ms(),
            ws_recovery_window_ms: default_ws_recovery_window_ms(),
            no_data_window_ms: 0,
            confidence_stale_window_ms: None,
            derivatives_stale_window_ms: None,
            out_of_order_tolerance_ms: 0,
            thresholds: Thresholds::default(),
            weights: BlockWeights::default(),
            critical_blocks: default_critical_blocks(),
            expected_sources: 0,
            expected_sources_by_block: BlockSources::default(),
            expected_sources_config: ExpectedSourcesConfig::default(),
            expected_flow_types: default_expected_flow_types(),
            expected_derivative_kinds: default_expected_derivative_kinds(),
            target_market_type: None,
            hysteresis: HysteresisConfig::default(),
            market_status_json: None,
        }
    }
}

impl ReadinessConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AggResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AggregatorError::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| AggregatorError::Config(format!("Failed to parse config: {e}")))
    }

    /// Bucket width with the minimum clamp applied.
    #[must_use]
    pub fn effective_bucket_ms(&self) -> i64 {
        self.bucket_ms.max(MIN_BUCKET_MS)
    }

    /// Warming window: 0 stays 0 (disabled), otherwise at least 1000.
    #[must_use]
    pub fn effective_warming_window_ms(&self) -> i64 {
        if self.warming_window_ms <= 0 {
            0
        } else {
            self.warming_window_ms.max(1000)
        }
    }

    /// Recovery window with the minimum clamp applied.
    #[must_use]
    pub fn effective_ws_recovery_window_ms(&self) -> i64 {
        self.ws_recovery_window_ms.max(1000)
    }

    /// Default confidence staleness threshold.
    #[must_use]
    pub fn effective_confidence_stale_window_ms(&self) -> i64 {
        self.confidence_stale_window_ms
            .map(|w| w.max(0))
            .unwrap_or_else(|| self.effective_bucket_ms())
    }

    /// Staleness threshold for derivatives metrics.
    #[must_use]
    pub fn effective_derivatives_stale_window_ms(&self) -> i64 {
        self.derivatives_stale_window_ms
            .map(|w| w.max(0))
            .unwrap_or_else(|| self.effective_confidence_stale_window_ms())
    }

    /// Resolve the JSON-snapshot flag, consulting `MARKET_STATUS_JSON`
    /// when the config leaves it unset. Called once at construction.
    #[must_use]
    pub fn resolve_market_status_json(&self) -> bool {
        if let Some(flag) = self.market_status_json {
            return flag;
        }
        std::env::var("MARKET_STATUS_JSON")
            .ok()
            .and_then(|v| parse_flag(&v))
            .unwrap_or(false)
    }
}

/// Parse `0|1|true|false|on|off`, case-insensitive.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    }
}
