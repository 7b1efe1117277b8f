//! Raw feed and aggregated metric classification.

use crate::block::Block;
use serde::{Deserialize, Serialize};

/// A raw exchange-level feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedKind {
    Trades,
    Orderbook,
    #[serde(rename = "oi")]
    OpenInterest,
    Funding,
    Klines,
    MarkPrice,
    IndexPrice,
}

impl FeedKind {
    /// All raw feeds in snapshot order.
    pub const ALL: [FeedKind; 7] = [
        FeedKind::Trades,
        FeedKind::Orderbook,
        FeedKind::OpenInterest,
        FeedKind::Funding,
        FeedKind::Klines,
        FeedKind::MarkPrice,
        FeedKind::IndexPrice,
    ];

    /// Stable camelCase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trades => "trades",
            Self::Orderbook => "orderbook",
            Self::OpenInterest => "oi",
            Self::Funding => "funding",
            Self::Klines => "klines",
            Self::MarkPrice => "markPrice",
            Self::IndexPrice => "indexPrice",
        }
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flow sub-kind of the `flow` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    Spot,
    Futures,
}

impl FlowKind {
    /// The aggregated metric this sub-kind maps to.
    #[must_use]
    pub fn metric(self) -> MetricKind {
        match self {
            Self::Spot => MetricKind::FlowSpot,
            Self::Futures => MetricKind::FlowFutures,
        }
    }
}

/// Derivative sub-kind of the `derivatives` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivativeKind {
    Oi,
    Funding,
    Liquidations,
}

impl DerivativeKind {
    /// The aggregated metric this sub-kind maps to.
    #[must_use]
    pub fn metric(self) -> MetricKind {
        match self {
            Self::Oi => MetricKind::OpenInterest,
            Self::Funding => MetricKind::Funding,
            Self::Liquidations => MetricKind::Liquidations,
        }
    }
}

/// An aggregated per-bucket metric.
///
/// Metrics are the granularity at which the registry tracks used-source
/// sets; each metric belongs to exactly one [`Block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Price,
    FlowSpot,
    FlowFutures,
    Liquidity,
    OpenInterest,
    Funding,
    Liquidations,
}

impl MetricKind {
    /// The block this metric contributes to.
    #[must_use]
    pub fn block(self) -> Block {
        match self {
            Self::Price => Block::Price,
            Self::FlowSpot | Self::FlowFutures => Block::Flow,
            Self::Liquidity => Block::Liquidity,
            Self::OpenInterest | Self::Funding | Self::Liquidations => Block::Derivatives,
        }
    }

    /// Key of this metric in the confidence cache.
    ///
    /// Keys beginning with `derivatives_` fall under the derivatives stale
    /// window; everything else uses the default window.
    #[must_use]
    pub fn cache_key(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::FlowSpot => "flow_spot",
            Self::FlowFutures => "flow_futures",
            Self::Liquidity => "liquidity",
            Self::OpenInterest => "derivatives_oi",
            Self::Funding => "derivatives_funding",
            Self::Liquidations => "derivatives_liquidations",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cache_key())
    }
}
