//! Readiness blocks.
//!
//! A block is one of the four coarse dimensions a market-data feed is
//! judged on. Blocks carry configurable weights and a criticality flag
//! (see the aggregator configuration).

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Coarse readiness dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Block {
    /// Canonical price.
    Price,
    /// Flow / CVD (spot and futures sub-kinds).
    Flow,
    /// Orderbook liquidity.
    Liquidity,
    /// Open interest, funding, liquidations.
    Derivatives,
}

impl Block {
    /// All blocks in evaluation order.
    pub const ALL: [Block; 4] = [
        Block::Price,
        Block::Flow,
        Block::Liquidity,
        Block::Derivatives,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Flow => "flow",
            Self::Liquidity => "liquidity",
            Self::Derivatives => "derivatives",
        }
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Block {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price" => Ok(Self::Price),
            "flow" => Ok(Self::Flow),
            "liquidity" => Ok(Self::Liquidity),
            "derivatives" => Ok(Self::Derivatives),
            other => Err(CoreError::UnknownBlock(other.to_string())),
        }
    }
}
