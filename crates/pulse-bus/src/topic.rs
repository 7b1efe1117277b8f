//! Bus topics.

use crate::error::BusError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Every topic the aggregator consumes or publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    // Aggregated per-bucket metrics.
    PriceCanonical,
    CvdSpotAgg,
    CvdFuturesAgg,
    LiquidityAgg,
    OiAgg,
    FundingAgg,
    LiquidationsAgg,
    // Raw exchange-level feeds.
    Trade,
    OrderbookL2Snapshot,
    OrderbookL2Delta,
    Oi,
    Funding,
    Ticker,
    Kline,
    // Connection lifecycle.
    Connected,
    Disconnected,
    // Data-quality signals.
    DataConfidence,
    DataMismatch,
    DataGapDetected,
    DataOutOfOrder,
    // Published status.
    MarketDataStatus,
}

impl Topic {
    /// All topics the aggregator subscribes to.
    pub const CONSUMED: [Topic; 20] = [
        Topic::PriceCanonical,
        Topic::CvdSpotAgg,
        Topic::CvdFuturesAgg,
        Topic::LiquidityAgg,
        Topic::OiAgg,
        Topic::FundingAgg,
        Topic::LiquidationsAgg,
        Topic::Trade,
        Topic::OrderbookL2Snapshot,
        Topic::OrderbookL2Delta,
        Topic::Oi,
        Topic::Funding,
        Topic::Ticker,
        Topic::Kline,
        Topic::Connected,
        Topic::Disconnected,
        Topic::DataConfidence,
        Topic::DataMismatch,
        Topic::DataGapDetected,
        Topic::DataOutOfOrder,
    ];

    /// Wire subject of this topic.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PriceCanonical => "market:price_canonical",
            Self::CvdSpotAgg => "market:cvd_spot_agg",
            Self::CvdFuturesAgg => "market:cvd_futures_agg",
            Self::LiquidityAgg => "market:liquidity_agg",
            Self::OiAgg => "market:oi_agg",
            Self::FundingAgg => "market:funding_agg",
            Self::LiquidationsAgg => "market:liquidations_agg",
            Self::Trade => "market:trade",
            Self::OrderbookL2Snapshot => "market:orderbook_l2_snapshot",
            Self::OrderbookL2Delta => "market:orderbook_l2_delta",
            Self::Oi => "market:oi",
            Self::Funding => "market:funding",
            Self::Ticker => "market:ticker",
            Self::Kline => "market:kline",
            Self::Connected => "market:connected",
            Self::Disconnected => "market:disconnected",
            Self::DataConfidence => "data:confidence",
            Self::DataMismatch => "data:mismatch",
            Self::DataGapDetected => "data:gapDetected",
            Self::DataOutOfOrder => "data:outOfOrder",
            Self::MarketDataStatus => "system:market_data_status",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::CONSUMED
            .iter()
            .copied()
            .chain(std::iter::once(Topic::MarketDataStatus))
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BusError::UnknownTopic(s.to_string()))
    }
}

impl TryFrom<String> for Topic {
    type Error = BusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_roundtrip() {
        for topic in Topic::CONSUMED
            .iter()
            .copied()
            .chain(std::iter::once(Topic::MarketDataStatus))
        {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
        }
    }

    #[test]
    fn test_consumed_excludes_published() {
        assert!(!Topic::CONSUMED.contains(&Topic::MarketDataStatus));
    }

    #[test]
    fn test_unknown_topic_rejected() {
        assert!("market:unknown_subject".parse::<Topic>().is_err());
    }
}
