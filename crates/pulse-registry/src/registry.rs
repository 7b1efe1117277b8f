//! Per-(symbol, market type) source bookkeeping.
//!
//! The registry records expected, used-aggregated, and raw-seen source-id
//! sets per metric/feed, last-seen timestamps, suppression markers, and
//! non-monotonic timebase offenders. Snapshots are deterministic: every
//! exposed list is deduplicated and lexicographically sorted.

use dashmap::DashMap;
use pulse_core::{Block, FeedKind, MarketType, MetricKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Suppression entries retained per (symbol, market type).
const SUPPRESSION_WINDOW: usize = 32;

/// Why a metric update was suppressed instead of recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuppressionCode {
    /// A canonical-price aggregate arrived with no contributing sources.
    NoCanonicalPrice,
}

impl std::fmt::Display for SuppressionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCanonicalPrice => f.write_str("NO_CANONICAL_PRICE"),
        }
    }
}

/// A recorded suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuppressionRecord {
    pub ts: i64,
    pub metric: MetricKind,
    pub code: SuppressionCode,
}

/// Immutable per-tick view of one (symbol, market type) key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub symbol: String,
    pub market_type: MarketType,
    pub bucket_ts: i64,
    /// Expected source-ids per block (union over the block's metrics).
    pub expected: BTreeMap<Block, Vec<String>>,
    /// Source-ids used by the latest aggregate per block.
    pub used_agg: BTreeMap<Block, Vec<String>>,
    /// Raw source-ids seen per feed.
    pub used_raw: BTreeMap<FeedKind, Vec<String>>,
    pub last_seen_raw_ts: BTreeMap<FeedKind, Option<i64>>,
    pub last_seen_agg_ts: BTreeMap<Block, Option<i64>>,
    pub suppressions: Vec<SuppressionRecord>,
    /// Source-ids that delivered regressing timestamps since the last
    /// snapshot.
    pub non_monotonic_sources: Vec<String>,
    /// Sticky count of non-monotonic observations; never cleared.
    pub non_monotonic_total: u64,
}

impl RegistrySnapshot {
    fn empty(bucket_ts: i64, symbol: &str, market_type: MarketType) -> Self {
        Self {
            symbol: symbol.to_string(),
            market_type,
            bucket_ts,
            expected: Block::ALL.iter().map(|b| (*b, Vec::new())).collect(),
            used_agg: Block::ALL.iter().map(|b| (*b, Vec::new())).collect(),
            used_raw: FeedKind::ALL.iter().map(|f| (*f, Vec::new())).collect(),
            last_seen_raw_ts: FeedKind::ALL.iter().map(|f| (*f, None)).collect(),
            last_seen_agg_ts: Block::ALL.iter().map(|b| (*b, None)).collect(),
            suppressions: Vec::new(),
            non_monotonic_sources: Vec::new(),
            non_monotonic_total: 0,
        }
    }

    /// Expected source-ids of a block; empty when nothing is registered.
    #[must_use]
    pub fn expected_for(&self, block: Block) -> &[String] {
        self.expected.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Union of expected source-ids across all blocks.
    #[must_use]
    pub fn expected_union(&self) -> BTreeSet<String> {
        self.expected.values().flatten().cloned().collect()
    }

    /// Union of aggregated-active source-ids across all blocks.
    #[must_use]
    pub fn active_agg_union(&self) -> BTreeSet<String> {
        self.used_agg.values().flatten().cloned().collect()
    }

    /// Union of raw-active source-ids across all feeds.
    #[must_use]
    pub fn active_raw_union(&self) -> BTreeSet<String> {
        self.used_raw.values().flatten().cloned().collect()
    }

    /// Most recent raw timestamp across all feeds.
    #[must_use]
    pub fn max_last_seen_raw_ts(&self) -> Option<i64> {
        self.last_seen_raw_ts.values().flatten().copied().max()
    }
}

#[derive(Debug, Default)]
struct RegistryEntry {
    expected: BTreeMap<MetricKind, BTreeSet<String>>,
    used_agg: BTreeMap<MetricKind, BTreeSet<String>>,
    used_raw: BTreeMap<FeedKind, BTreeSet<String>>,
    last_seen_raw: BTreeMap<FeedKind, i64>,
    last_seen_agg: BTreeMap<MetricKind, i64>,
    /// Last raw timestamp per (feed, source-id), for regression detection.
    raw_ts_by_source: HashMap<(FeedKind, String), i64>,
    /// Offenders since the last snapshot.
    non_monotonic: BTreeSet<String>,
    non_monotonic_total: u64,
    suppressions: VecDeque<SuppressionRecord>,
}

/// Records which source-ids produced which feeds and metrics, and when.
///
/// Owned exclusively by one aggregator unless the caller explicitly
/// shares it; sharing makes the caller responsible for serialising
/// access around evaluation ticks.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    entries: DashMap<(String, MarketType), RegistryEntry>,
}

/// Shared handle to a [`SourceRegistry`].
pub type SourceRegistryHandle = Arc<SourceRegistry>;

impl SourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry wrapped in `Arc` for sharing.
    #[must_use]
    pub fn new_shared() -> SourceRegistryHandle {
        Arc::new(Self::new())
    }

    /// Record a raw observation from `source_id` on `feed`.
    ///
    /// The feed's last-seen timestamp only moves forward; a timestamp
    /// regressing for the same source-id marks it non-monotonic.
    pub fn mark_raw_seen(
        &self,
        symbol: &str,
        market_type: MarketType,
        feed: FeedKind,
        source_id: &str,
        ts: i64,
    ) {
        if source_id.is_empty() {
            return;
        }
        let mut entry = self
            .entries
            .entry((symbol.to_string(), market_type))
            .or_default();

        let per_source = entry
            .raw_ts_by_source
            .entry((feed, source_id.to_string()))
            .or_insert(ts);
        if ts < *per_source {
            entry.non_monotonic.insert(source_id.to_string());
            entry.non_monotonic_total += 1;
            warn!(symbol, %market_type, %feed, source_id, ts, "Raw timestamp regressed");
        } else {
            *per_source = ts;
        }

        entry.used_raw.entry(feed).or_default().insert(source_id.to_string());
        let last = entry.last_seen_raw.entry(feed).or_insert(ts);
        *last = (*last).max(ts);
    }

    /// Record the source set used by the latest aggregate for `metric`.
    ///
    /// Replaces (not accumulates) the used-agg set. A canonical-price
    /// aggregate with no sources is suppressed instead of recorded.
    pub fn mark_agg_emitted(
        &self,
        symbol: &str,
        market_type: MarketType,
        metric: MetricKind,
        sources: &[String],
        ts: i64,
    ) {
        if metric == MetricKind::Price && sources.is_empty() {
            self.record_suppression(
                symbol,
                market_type,
                metric,
                SuppressionCode::NoCanonicalPrice,
                ts,
            );
            return;
        }
        let mut entry = self
            .entries
            .entry((symbol.to_string(), market_type))
            .or_default();

        let set: BTreeSet<String> = sources.iter().filter(|s| !s.is_empty()).cloned().collect();
        entry.used_agg.insert(metric, set);
        let last = entry.last_seen_agg.entry(metric).or_insert(ts);
        *last = (*last).max(ts);
    }

    /// Union `sources` into the expected set for `metric`.
    pub fn register_expected(
        &self,
        symbol: &str,
        market_type: MarketType,
        metric: MetricKind,
        sources: &[String],
    ) {
        let mut entry = self
            .entries
            .entry((symbol.to_string(), market_type))
            .or_default();
        entry
            .expected
            .entry(metric)
            .or_default()
            .extend(sources.iter().filter(|s| !s.is_empty()).cloned());
    }

    /// Whether any expected source set has been registered for the key.
    #[must_use]
    pub fn has_expected(&self, symbol: &str, market_type: MarketType) -> bool {
        self.entries
            .get(&(symbol.to_string(), market_type))
            .map(|entry| entry.expected.values().any(|set| !set.is_empty()))
            .unwrap_or(false)
    }

    /// Append a structured suppression entry.
    pub fn record_suppression(
        &self,
        symbol: &str,
        market_type: MarketType,
        metric: MetricKind,
        code: SuppressionCode,
        ts: i64,
    ) {
        debug!(symbol, %market_type, %metric, %code, ts, "Suppression recorded");
        let mut entry = self
            .entries
            .entry((symbol.to_string(), market_type))
            .or_default();
        entry.suppressions.push_back(SuppressionRecord { ts, metric, code });
        while entry.suppressions.len() > SUPPRESSION_WINDOW {
            entry.suppressions.pop_front();
        }
    }

    /// Deterministic snapshot of one (symbol, market type) key.
    ///
    /// Drains the non-monotonic offender set (each offender surfaces in
    /// exactly one snapshot); the sticky total is never cleared.
    #[must_use]
    pub fn snapshot(
        &self,
        bucket_ts: i64,
        symbol: &str,
        market_type: MarketType,
    ) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::empty(bucket_ts, symbol, market_type);
        let Some(mut entry) = self.entries.get_mut(&(symbol.to_string(), market_type)) else {
            return snapshot;
        };

        for (metric, set) in &entry.expected {
            let slot = snapshot.expected.entry(metric.block()).or_default();
            slot.extend(set.iter().cloned());
        }
        for (metric, set) in &entry.used_agg {
            let slot = snapshot.used_agg.entry(metric.block()).or_default();
            slot.extend(set.iter().cloned());
        }
        for list in snapshot.expected.values_mut().chain(snapshot.used_agg.values_mut()) {
            list.sort();
            list.dedup();
        }
        for (feed, set) in &entry.used_raw {
            snapshot.used_raw.insert(*feed, set.iter().cloned().collect());
        }
        for (feed, ts) in &entry.last_seen_raw {
            snapshot.last_seen_raw_ts.insert(*feed, Some(*ts));
        }
        for (metric, ts) in &entry.last_seen_agg {
            let slot = snapshot
                .last_seen_agg_ts
                .entry(metric.block())
                .or_default();
            *slot = Some(slot.map_or(*ts, |prev: i64| prev.max(*ts)));
        }
        snapshot.suppressions = entry.suppressions.iter().cloned().collect();
        snapshot.non_monotonic_sources = std::mem::take(&mut entry.non_monotonic)
            .into_iter()
            .collect();
        snapshot.non_monotonic_total = entry.non_monotonic_total;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYM: &str = "BTCUSDT";
    const MT: MarketType = MarketType::Futures;

    fn sources(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_snapshot_lists_sorted_and_deduped() {
        let registry = SourceRegistry::new();
        registry.register_expected(SYM, MT, MetricKind::Price, &sources(&["bybit", "binance"]));
        registry.register_expected(SYM, MT, MetricKind::Price, &sources(&["binance", "okx"]));

        let snapshot = registry.snapshot(1000, SYM, MT);
        assert_eq!(
            snapshot.expected_for(Block::Price),
            &sources(&["binance", "bybit", "okx"])[..]
        );
    }

    #[test]
    fn test_agg_set_replaced_not_accumulated() {
        let registry = SourceRegistry::new();
        registry.mark_agg_emitted(SYM, MT, MetricKind::Liquidity, &sources(&["a", "b"]), 1000);
        registry.mark_agg_emitted(SYM, MT, MetricKind::Liquidity, &sources(&["c"]), 2000);

        let snapshot = registry.snapshot(2000, SYM, MT);
        assert_eq!(snapshot.used_agg[&Block::Liquidity], sources(&["c"]));
        assert_eq!(snapshot.last_seen_agg_ts[&Block::Liquidity], Some(2000));
    }

    #[test]
    fn test_flow_metrics_union_into_block_view() {
        let registry = SourceRegistry::new();
        registry.mark_agg_emitted(SYM, MT, MetricKind::FlowSpot, &sources(&["binance"]), 1000);
        registry.mark_agg_emitted(SYM, MT, MetricKind::FlowFutures, &sources(&["bybit"]), 1000);

        let snapshot = registry.snapshot(1000, SYM, MT);
        assert_eq!(
            snapshot.used_agg[&Block::Flow],
            sources(&["binance", "bybit"])
        );
    }

    #[test]
    fn test_empty_price_sources_suppressed() {
        let registry = SourceRegistry::new();
        registry.mark_agg_emitted(SYM, MT, MetricKind::Price, &[], 1000);

        let snapshot = registry.snapshot(1000, SYM, MT);
        // Record untouched, suppression recorded instead.
        assert!(snapshot.used_agg[&Block::Price].is_empty());
        assert_eq!(snapshot.last_seen_agg_ts[&Block::Price], None);
        assert_eq!(
            snapshot.suppressions,
            vec![SuppressionRecord {
                ts: 1000,
                metric: MetricKind::Price,
                code: SuppressionCode::NoCanonicalPrice,
            }]
        );
    }

    #[test]
    fn test_empty_sources_allowed_for_non_price_metrics() {
        let registry = SourceRegistry::new();
        registry.mark_agg_emitted(SYM, MT, MetricKind::Liquidity, &sources(&["a"]), 1000);
        registry.mark_agg_emitted(SYM, MT, MetricKind::Liquidity, &[], 2000);

        let snapshot = registry.snapshot(2000, SYM, MT);
        assert!(snapshot.used_agg[&Block::Liquidity].is_empty());
        assert_eq!(snapshot.last_seen_agg_ts[&Block::Liquidity], Some(2000));
    }

    #[test]
    fn test_raw_last_seen_is_monotonic_max() {
        let registry = SourceRegistry::new();
        registry.mark_raw_seen(SYM, MT, FeedKind::Trades, "binance", 2000);
        registry.mark_raw_seen(SYM, MT, FeedKind::Trades, "bybit", 1500);

        let snapshot = registry.snapshot(2000, SYM, MT);
        assert_eq!(snapshot.last_seen_raw_ts[&FeedKind::Trades], Some(2000));
        assert_eq!(
            snapshot.used_raw[&FeedKind::Trades],
            sources(&["binance", "bybit"])
        );
    }

    #[test]
    fn test_non_monotonic_source_detected_and_drained() {
        let registry = SourceRegistry::new();
        registry.mark_raw_seen(SYM, MT, FeedKind::Trades, "binance", 2000);
        registry.mark_raw_seen(SYM, MT, FeedKind::Trades, "binance", 1000);

        let first = registry.snapshot(2000, SYM, MT);
        assert_eq!(first.non_monotonic_sources, sources(&["binance"]));
        assert_eq!(first.non_monotonic_total, 1);

        // Offender surfaces once; the sticky counter survives.
        let second = registry.snapshot(3000, SYM, MT);
        assert!(second.non_monotonic_sources.is_empty());
        assert_eq!(second.non_monotonic_total, 1);
    }

    #[test]
    fn test_same_ts_is_not_a_regression() {
        let registry = SourceRegistry::new();
        registry.mark_raw_seen(SYM, MT, FeedKind::Trades, "binance", 1000);
        registry.mark_raw_seen(SYM, MT, FeedKind::Trades, "binance", 1000);

        let snapshot = registry.snapshot(1000, SYM, MT);
        assert!(snapshot.non_monotonic_sources.is_empty());
        assert_eq!(snapshot.non_monotonic_total, 0);
    }

    #[test]
    fn test_keys_are_isolated() {
        let registry = SourceRegistry::new();
        registry.mark_raw_seen(SYM, MarketType::Spot, FeedKind::Trades, "binance", 1000);

        let futures = registry.snapshot(1000, SYM, MarketType::Futures);
        assert!(futures.used_raw[&FeedKind::Trades].is_empty());

        let spot = registry.snapshot(1000, SYM, MarketType::Spot);
        assert_eq!(spot.used_raw[&FeedKind::Trades], sources(&["binance"]));
    }

    #[test]
    fn test_snapshot_of_unknown_key_is_empty() {
        let registry = SourceRegistry::new();
        let snapshot = registry.snapshot(1000, "ETHUSDT", MT);
        assert!(snapshot.expected_union().is_empty());
        assert!(snapshot.max_last_seen_raw_ts().is_none());
        assert_eq!(snapshot.symbol, "ETHUSDT");
    }

    #[test]
    fn test_suppression_window_bounded() {
        let registry = SourceRegistry::new();
        for i in 0..100 {
            registry.mark_agg_emitted(SYM, MT, MetricKind::Price, &[], i);
        }
        let snapshot = registry.snapshot(100, SYM, MT);
        assert_eq!(snapshot.suppressions.len(), SUPPRESSION_WINDOW);
        assert_eq!(snapshot.suppressions.last().unwrap().ts, 99);
    }

    #[test]
    fn test_has_expected() {
        let registry = SourceRegistry::new();
        assert!(!registry.has_expected(SYM, MT));
        registry.register_expected(SYM, MT, MetricKind::Price, &sources(&["binance"]));
        assert!(registry.has_expected(SYM, MT));
    }
}
