//! Degradation reason codes.
//!
//! Reason codes are conditions observed on the feed, not programmer
//! errors. Emitted lists are always a subsequence of [`ReasonCode::CANONICAL`];
//! the variants are declared in that order so the derived `Ord` matches it.

use crate::block::Block;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Hysteresis class of a reason code.
///
/// Hard-fast reasons use the fast enter window, hard reasons the regular
/// one; both share the hard exit window. Soft reasons use the soft windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonClass {
    HardFast,
    Hard,
    Soft,
}

/// Why a feed is considered degraded.
///
/// `NoRefPrice` also accepts the legacy spelling `NO_VALID_REF_PRICE` on
/// input; it always serializes as `NO_REF_PRICE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// No canonical price record for the current bucket.
    PriceStale,
    /// Price confidence below the critical-block floor.
    PriceLowConf,
    /// Flow confidence below the critical-block floor.
    FlowLowConf,
    /// Liquidity confidence below the critical-block floor.
    LiquidityLowConf,
    /// Derivatives confidence below the critical-block floor.
    DerivativesLowConf,
    /// WebSocket-level connection is degraded.
    WsDisconnected,
    /// Fewer aggregated sources active than contractually expected.
    SourcesMissing,
    /// Raw sources seen but no expected-sources config for the key.
    ExpectedSourcesMissingConfig,
    /// Raw data older than the no-data window, or an out-of-order burst.
    LagTooHigh,
    /// A gap was reported since the last evaluation.
    GapsDetected,
    /// Cross-source mismatch with a trustworthy reference price.
    MismatchDetected,
    /// Cross-source mismatch without a trustworthy reference price.
    #[serde(alias = "NO_VALID_REF_PRICE")]
    NoRefPrice,
    /// A raw source delivered timestamps moving backwards.
    NonMonotonicTimebase,
}

impl ReasonCode {
    /// Canonical emission order. `degradedReasons` is always a subsequence
    /// of this list.
    pub const CANONICAL: [ReasonCode; 13] = [
        ReasonCode::PriceStale,
        ReasonCode::PriceLowConf,
        ReasonCode::FlowLowConf,
        ReasonCode::LiquidityLowConf,
        ReasonCode::DerivativesLowConf,
        ReasonCode::WsDisconnected,
        ReasonCode::SourcesMissing,
        ReasonCode::ExpectedSourcesMissingConfig,
        ReasonCode::LagTooHigh,
        ReasonCode::GapsDetected,
        ReasonCode::MismatchDetected,
        ReasonCode::NoRefPrice,
        ReasonCode::NonMonotonicTimebase,
    ];

    /// Stable SCREAMING_SNAKE_CASE name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PriceStale => "PRICE_STALE",
            Self::PriceLowConf => "PRICE_LOW_CONF",
            Self::FlowLowConf => "FLOW_LOW_CONF",
            Self::LiquidityLowConf => "LIQUIDITY_LOW_CONF",
            Self::DerivativesLowConf => "DERIVATIVES_LOW_CONF",
            Self::WsDisconnected => "WS_DISCONNECTED",
            Self::SourcesMissing => "SOURCES_MISSING",
            Self::ExpectedSourcesMissingConfig => "EXPECTED_SOURCES_MISSING_CONFIG",
            Self::LagTooHigh => "LAG_TOO_HIGH",
            Self::GapsDetected => "GAPS_DETECTED",
            Self::MismatchDetected => "MISMATCH_DETECTED",
            Self::NoRefPrice => "NO_REF_PRICE",
            Self::NonMonotonicTimebase => "NON_MONOTONIC_TIMEBASE",
        }
    }

    /// Hysteresis class of this reason.
    #[must_use]
    pub fn class(self) -> ReasonClass {
        match self {
            Self::PriceStale
            | Self::WsDisconnected
            | Self::GapsDetected
            | Self::NoRefPrice
            | Self::NonMonotonicTimebase => ReasonClass::HardFast,
            Self::SourcesMissing
            | Self::ExpectedSourcesMissingConfig
            | Self::LagTooHigh
            | Self::MismatchDetected => ReasonClass::Hard,
            Self::PriceLowConf
            | Self::FlowLowConf
            | Self::LiquidityLowConf
            | Self::DerivativesLowConf => ReasonClass::Soft,
        }
    }

    /// The low-confidence reason for a block.
    #[must_use]
    pub fn low_conf_for(block: Block) -> ReasonCode {
        match block {
            Block::Price => Self::PriceLowConf,
            Block::Flow => Self::FlowLowConf,
            Block::Liquidity => Self::LiquidityLowConf,
            Block::Derivatives => Self::DerivativesLowConf,
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasonCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Legacy spelling kept as an accepted alias.
        if s == "NO_VALID_REF_PRICE" {
            return Ok(Self::NoRefPrice);
        }
        Self::CANONICAL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| CoreError::UnknownReason(s.to_string()))
    }
}

/// Project an unordered reason set through the canonical order.
///
/// Never rely on the iteration order of general-purpose maps when
/// emitting; this is the single place ordering is decided.
#[must_use]
pub fn project_canonical(reasons: &BTreeSet<ReasonCode>) -> Vec<ReasonCode> {
    ReasonCode::CANONICAL
        .iter()
        .copied()
        .filter(|r| reasons.contains(r))
        .collect()
}
