//! Market type classification and symbol normalization.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Placeholder symbol when an event carries none.
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

/// Placeholder source-id when an event carries no stream id.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Market type of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Spot,
    Futures,
    Unknown,
}

impl MarketType {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Futures => "futures",
            Self::Unknown => "unknown",
        }
    }

    /// Infer a market type from a vendor stream id.
    ///
    /// Vendor convention: `usdm`/`coinm`/`linear`/`inverse` mark futures
    /// streams, `spot` marks spot streams. Anything else is `Unknown`.
    #[must_use]
    pub fn infer_from_stream_id(stream_id: &str) -> Self {
        let lower = stream_id.to_ascii_lowercase();
        if ["usdm", "coinm", "linear", "inverse"]
            .iter()
            .any(|tag| lower.contains(tag))
        {
            Self::Futures
        } else if lower.contains("spot") {
            Self::Spot
        } else {
            Self::Unknown
        }
    }

    /// Resolve the effective market type of an event: the explicit field
    /// when present, otherwise inferred from the stream id.
    #[must_use]
    pub fn resolve(explicit: Option<MarketType>, stream_id: Option<&str>) -> Self {
        match explicit {
            Some(mt) => mt,
            None => stream_id
                .map(Self::infer_from_stream_id)
                .unwrap_or(Self::Unknown),
        }
    }
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spot" => Ok(Self::Spot),
            "futures" => Ok(Self::Futures),
            "unknown" => Ok(Self::Unknown),
            other => Err(CoreError::UnknownMarketType(other.to_string())),
        }
    }
}

/// Normalize an optional symbol; empty or missing becomes [`UNKNOWN_SYMBOL`].
#[must_use]
pub fn normalize_symbol(symbol: &str) -> String {
    if symbol.trim().is_empty() {
        UNKNOWN_SYMBOL.to_string()
    } else {
        symbol.to_string()
    }
}
