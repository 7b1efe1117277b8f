//! Layered expected-sources configuration and resolution.
//!
//! Resolution order for (symbol, market type, block):
//! 1. the symbol's market-type-specific lists
//! 2. the symbol's market-type-agnostic lists
//! 3. the config-wide defaults
//! 4. the flat per-block fallback lists
//!
//! The first layer that defines the block wins, even with an empty list —
//! an explicitly empty list means "not contractually required".

use pulse_core::{Block, MarketType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Expected source-ids per block. `None` means the layer does not define
/// the block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSources {
    #[serde(default)]
    pub price: Option<Vec<String>>,
    #[serde(default)]
    pub flow: Option<Vec<String>>,
    #[serde(default)]
    pub liquidity: Option<Vec<String>>,
    #[serde(default)]
    pub derivatives: Option<Vec<String>>,
}

impl BlockSources {
    /// The layer's list for a block, if defined.
    #[must_use]
    pub fn get(&self, block: Block) -> Option<&Vec<String>> {
        match block {
            Block::Price => self.price.as_ref(),
            Block::Flow => self.flow.as_ref(),
            Block::Liquidity => self.liquidity.as_ref(),
            Block::Derivatives => self.derivatives.as_ref(),
        }
    }

    pub fn set(&mut self, block: Block, sources: Vec<String>) {
        match block {
            Block::Price => self.price = Some(sources),
            Block::Flow => self.flow = Some(sources),
            Block::Liquidity => self.liquidity = Some(sources),
            Block::Derivatives => self.derivatives = Some(sources),
        }
    }

    /// Whether the layer defines no block at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        Block::ALL.iter().all(|b| self.get(*b).is_none())
    }
}

/// Per-symbol overrides, optionally split by market type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolSources {
    /// Lists applying to any market type of the symbol.
    #[serde(default)]
    pub all: BlockSources,
    #[serde(default)]
    pub spot: BlockSources,
    #[serde(default)]
    pub futures: BlockSources,
}

impl SymbolSources {
    fn for_market_type(&self, market_type: MarketType) -> Option<&BlockSources> {
        match market_type {
            MarketType::Spot => Some(&self.spot),
            MarketType::Futures => Some(&self.futures),
            MarketType::Unknown => None,
        }
    }
}

/// Hierarchical per-symbol/market-type expected-sources configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedSourcesConfig {
    /// Config-wide default lists.
    #[serde(default)]
    pub defaults: BlockSources,
    /// Per-symbol overrides.
    #[serde(default)]
    pub symbols: BTreeMap<String, SymbolSources>,
}

/// Resolves the expected source-ids of a (symbol, market type, block).
#[derive(Debug, Clone, Default)]
pub struct ExpectedSourcesResolver {
    config: ExpectedSourcesConfig,
    by_block: BlockSources,
}

impl ExpectedSourcesResolver {
    /// Build a resolver from the hierarchical config and the flat
    /// per-block fallback lists.
    #[must_use]
    pub fn new(config: ExpectedSourcesConfig, by_block: BlockSources) -> Self {
        Self { config, by_block }
    }

    /// Expected source-ids for the key, deduplicated and sorted.
    ///
    /// `None` means no layer defines the block — distinct from an
    /// explicitly empty list.
    #[must_use]
    pub fn resolve(
        &self,
        symbol: &str,
        market_type: MarketType,
        block: Block,
    ) -> Option<Vec<String>> {
        let symbol_layer = self.config.symbols.get(symbol);

        let found = symbol_layer
            .and_then(|s| s.for_market_type(market_type))
            .and_then(|layer| layer.get(block))
            .or_else(|| symbol_layer.and_then(|s| s.all.get(block)))
            .or_else(|| self.config.defaults.get(block))
            .or_else(|| self.by_block.get(block))?;

        let mut sources: Vec<String> =
            found.iter().filter(|s| !s.is_empty()).cloned().collect();
        sources.sort();
        sources.dedup();
        Some(sources)
    }

    /// Whether any block is resolvable for the key.
    #[must_use]
    pub fn has_any(&self, symbol: &str, market_type: MarketType) -> bool {
        Block::ALL
            .iter()
            .any(|b| self.resolve(symbol, market_type, *b).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn resolver() -> ExpectedSourcesResolver {
        let mut config = ExpectedSourcesConfig::default();
        config.defaults.set(Block::Price, sources(&["binance", "bybit"]));

        let mut btc = SymbolSources::default();
        btc.all.set(Block::Price, sources(&["okx"]));
        btc.futures.set(Block::Price, sources(&["bybit", "binance", "binance"]));
        config.symbols.insert("BTCUSDT".to_string(), btc);

        let mut by_block = BlockSources::default();
        by_block.set(Block::Liquidity, sources(&["binance"]));

        ExpectedSourcesResolver::new(config, by_block)
    }

    #[test]
    fn test_market_type_layer_wins() {
        let resolved = resolver()
            .resolve("BTCUSDT", MarketType::Futures, Block::Price)
            .unwrap();
        assert_eq!(resolved, sources(&["binance", "bybit"]));
    }

    #[test]
    fn test_symbol_all_layer_before_defaults() {
        let resolved = resolver()
            .resolve("BTCUSDT", MarketType::Spot, Block::Price)
            .unwrap();
        assert_eq!(resolved, sources(&["okx"]));
    }

    #[test]
    fn test_defaults_layer_for_unconfigured_symbol() {
        let resolved = resolver()
            .resolve("ETHUSDT", MarketType::Spot, Block::Price)
            .unwrap();
        assert_eq!(resolved, sources(&["binance", "bybit"]));
    }

    #[test]
    fn test_by_block_fallback() {
        let resolved = resolver()
            .resolve("ETHUSDT", MarketType::Futures, Block::Liquidity)
            .unwrap();
        assert_eq!(resolved, sources(&["binance"]));
    }

    #[test]
    fn test_undefined_block_resolves_none() {
        assert!(resolver()
            .resolve("ETHUSDT", MarketType::Futures, Block::Flow)
            .is_none());
    }

    #[test]
    fn test_explicit_empty_list_is_some_empty() {
        let mut config = ExpectedSourcesConfig::default();
        config.defaults.set(Block::Flow, Vec::new());
        let resolver = ExpectedSourcesResolver::new(config, BlockSources::default());

        let resolved = resolver.resolve("BTCUSDT", MarketType::Spot, Block::Flow);
        assert_eq!(resolved, Some(Vec::new()));
    }

    #[test]
    fn test_unknown_market_type_skips_typed_layers() {
        // Unknown market type never matches spot/futures overrides.
        let resolved = resolver()
            .resolve("BTCUSDT", MarketType::Unknown, Block::Price)
            .unwrap();
        assert_eq!(resolved, sources(&["okx"]));
    }

    #[test]
    fn test_has_any() {
        let r = resolver();
        assert!(r.has_any("ETHUSDT", MarketType::Spot));
        assert!(!ExpectedSourcesResolver::default().has_any("ETHUSDT", MarketType::Spot));
    }
}
