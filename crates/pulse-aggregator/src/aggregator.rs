//! The readiness aggregator: bus wiring, ingest handlers, and tick
//! orchestration.
//!
//! All mutations happen inside bus handler callbacks; delivery to one
//! aggregator is serialised by a single mutex held across each handler.
//! Handlers run to completion and never panic on malformed payloads.

use crate::config::ReadinessConfig;
use crate::connection::ConnectionTracker;
use crate::evaluator::{evaluate, BlockFlags, BlockRecord, CacheEntry, EvaluatorInputs};
use crate::hysteresis::HysteresisGate;
use crate::minute::MinuteMemory;
use parking_lot::Mutex;
use pulse_bus::{EventBus, SubscriptionToken, Topic};
use pulse_core::{
    normalize_symbol, project_canonical, AggregatedPayload, Block, BucketClock, BusEvent,
    ConfidencePayload, EventMeta, FeedKind, MarketDataStatus, MarketType, MetricKind,
    QualityPayload, RawPayload, UNKNOWN_SYMBOL,
};
use pulse_registry::{
    ExpectedSourcesResolver, SourceRegistry, SourceRegistryHandle, SuppressionCode,
};
use pulse_telemetry::{metrics, StatusReporter};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct AggregatorState {
    config: ReadinessConfig,
    clock: BucketClock,
    registry: SourceRegistryHandle,
    resolver: ExpectedSourcesResolver,
    connection: ConnectionTracker,
    hysteresis: HysteresisGate,
    minute: MinuteMemory,
    records: BTreeMap<Block, BlockRecord>,
    cache: BTreeMap<String, CacheEntry>,
    flags: BTreeMap<Block, BlockFlags>,
    /// Keys with raw data but no discoverable expected-sources config;
    /// latched until expected sources are registered.
    missing_config: BTreeSet<(String, MarketType)>,
    last_symbol: String,
    last_market_type: MarketType,
    first_bucket_ts: Option<i64>,
    last_bucket_ts: Option<i64>,
    stopped: bool,
}

impl AggregatorState {
    fn new(config: ReadinessConfig, registry: SourceRegistryHandle) -> Self {
        let clock = BucketClock::new(config.effective_bucket_ms());
        let resolver = ExpectedSourcesResolver::new(
            config.expected_sources_config.clone(),
            config.expected_sources_by_block.clone(),
        );
        let connection = ConnectionTracker::new(
            config.effective_ws_recovery_window_ms(),
            clock.bucket_ms() * 2,
        );
        let hysteresis = HysteresisGate::new(config.hysteresis);
        Self {
            config,
            clock,
            registry,
            resolver,
            connection,
            hysteresis,
            minute: MinuteMemory::new(),
            records: BTreeMap::new(),
            cache: BTreeMap::new(),
            flags: BTreeMap::new(),
            missing_config: BTreeSet::new(),
            last_symbol: UNKNOWN_SYMBOL.to_string(),
            last_market_type: MarketType::Unknown,
            first_bucket_ts: None,
            last_bucket_ts: None,
            stopped: false,
        }
    }

    fn is_tracked(&self, market_type: MarketType) -> bool {
        match self.config.target_market_type {
            Some(target) => market_type == target,
            None => true,
        }
    }

    fn handle(&mut self, topic: Topic, event: &BusEvent) -> Option<MarketDataStatus> {
        if self.stopped {
            return None;
        }
        metrics::record_event(topic.as_str());
        match (topic, event) {
            (Topic::PriceCanonical, BusEvent::Aggregated(p)) => {
                self.ingest_aggregated(MetricKind::Price, p)
            }
            (Topic::CvdSpotAgg, BusEvent::Aggregated(p)) => {
                self.ingest_aggregated(MetricKind::FlowSpot, p)
            }
            (Topic::CvdFuturesAgg, BusEvent::Aggregated(p)) => {
                self.ingest_aggregated(MetricKind::FlowFutures, p)
            }
            (Topic::LiquidityAgg, BusEvent::Aggregated(p)) => {
                self.ingest_aggregated(MetricKind::Liquidity, p)
            }
            (Topic::OiAgg, BusEvent::Aggregated(p)) => {
                self.ingest_aggregated(MetricKind::OpenInterest, p)
            }
            (Topic::FundingAgg, BusEvent::Aggregated(p)) => {
                self.ingest_aggregated(MetricKind::Funding, p)
            }
            (Topic::LiquidationsAgg, BusEvent::Aggregated(p)) => {
                self.ingest_aggregated(MetricKind::Liquidations, p)
            }
            (Topic::Trade, BusEvent::Raw(p)) => {
                self.ingest_raw(&[FeedKind::Trades], p);
                None
            }
            (Topic::OrderbookL2Snapshot | Topic::OrderbookL2Delta, BusEvent::Raw(p)) => {
                self.ingest_raw(&[FeedKind::Orderbook], p);
                None
            }
            (Topic::Oi, BusEvent::Raw(p)) => {
                self.ingest_raw(&[FeedKind::OpenInterest], p);
                None
            }
            (Topic::Funding, BusEvent::Raw(p)) => {
                self.ingest_raw(&[FeedKind::Funding], p);
                None
            }
            (Topic::Kline, BusEvent::Raw(p)) => {
                self.ingest_raw(&[FeedKind::Klines], p);
                None
            }
            (Topic::Ticker, BusEvent::Raw(p)) => {
                if p.index_price.is_some() {
                    self.ingest_raw(&[FeedKind::MarkPrice, FeedKind::IndexPrice], p);
                } else {
                    self.ingest_raw(&[FeedKind::MarkPrice], p);
                }
                None
            }
            (Topic::Connected, BusEvent::Connection(p)) => {
                self.connection.on_connect(p.meta.ts);
                metrics::record_connection(!self.connection.is_degraded());
                None
            }
            (Topic::Disconnected, BusEvent::Connection(p)) => {
                self.connection.on_disconnect(p.meta.ts);
                metrics::record_connection(false);
                None
            }
            (Topic::DataConfidence, BusEvent::Confidence(p)) => {
                self.ingest_confidence(p);
                None
            }
            (Topic::DataMismatch, BusEvent::Quality(p)) => {
                self.block_flags(p).mismatch = true;
                None
            }
            (Topic::DataGapDetected, BusEvent::Quality(p)) => {
                self.block_flags(p).gap = true;
                None
            }
            (Topic::DataOutOfOrder, BusEvent::Quality(p)) => {
                let tolerance = self.config.out_of_order_tolerance_ms;
                if p.skew_ms.map_or(true, |skew| skew > tolerance) {
                    self.block_flags(p).lag = true;
                }
                None
            }
            _ => {
                debug!(%topic, "Ignoring payload of unexpected kind");
                None
            }
        }
    }

    fn block_flags(&mut self, payload: &QualityPayload) -> &mut BlockFlags {
        let block = payload.block.unwrap_or(Block::Price);
        self.flags.entry(block).or_default()
    }

    fn ingest_aggregated(
        &mut self,
        metric: MetricKind,
        payload: &AggregatedPayload,
    ) -> Option<MarketDataStatus> {
        let ts = payload.meta.ts;
        let symbol = normalize_symbol(&payload.symbol);
        let market_type = MarketType::resolve(payload.market_type, payload.stream_id.as_deref());

        let mut sources: Vec<String> = payload.sources_used.clone().unwrap_or_default();
        sources.retain(|s| !s.is_empty());
        sources.sort();
        sources.dedup();

        if metric == MetricKind::Price && sources.is_empty() {
            debug!(%symbol, ts, "Canonical price without sources suppressed");
            self.registry.record_suppression(
                &symbol,
                market_type,
                MetricKind::Price,
                SuppressionCode::NoCanonicalPrice,
                ts,
            );
            return None;
        }

        let stale_dropped = payload.stale_sources_dropped.unwrap_or(0);
        if stale_dropped > 0 {
            debug!(%symbol, %metric, stale_dropped, "Aggregate dropped stale sources");
        }

        let block = metric.block();
        let bucket_ts = self.clock.bucket_end_ts(ts);
        self.records.insert(
            block,
            BlockRecord {
                symbol: symbol.clone(),
                bucket_ts,
                event_ts: ts,
                confidence: payload.confidence_score,
                sources_used: sources.clone(),
                stale_sources_dropped: stale_dropped,
                mismatch_detected: payload.mismatch_detected.unwrap_or(false),
            },
        );
        self.cache.insert(
            metric.cache_key().to_string(),
            CacheEntry {
                ts,
                confidence: payload.confidence_score,
                mismatch_detected: payload.mismatch_detected.unwrap_or(false),
                sources_used: sources.clone(),
            },
        );
        if payload.mismatch_detected == Some(true) {
            self.flags.entry(block).or_default().mismatch = true;
        }

        if self.is_tracked(market_type) {
            if let Some(expected) = self.resolver.resolve(&symbol, market_type, block) {
                self.registry
                    .register_expected(&symbol, market_type, metric, &expected);
                self.missing_config.remove(&(symbol.clone(), market_type));
            }
            self.registry
                .mark_agg_emitted(&symbol, market_type, metric, &sources, ts);
            self.last_symbol = symbol;
            self.last_market_type = market_type;
        }

        self.connection.on_data(ts);
        if self.first_bucket_ts.is_none() {
            self.first_bucket_ts = Some(bucket_ts);
        }
        self.last_bucket_ts = Some(bucket_ts);
        Some(self.tick(bucket_ts, ts))
    }

    fn ingest_raw(&mut self, feeds: &[FeedKind], payload: &RawPayload) {
        let ts = payload.meta.ts;
        let symbol = normalize_symbol(&payload.symbol);
        let market_type = MarketType::resolve(payload.market_type, payload.stream_id.as_deref());

        if self.is_tracked(market_type) {
            let source_id = payload.source_id();
            for feed in feeds {
                self.registry
                    .mark_raw_seen(&symbol, market_type, *feed, &source_id, ts);
            }
            if !self.resolver.has_any(&symbol, market_type)
                && !self.registry.has_expected(&symbol, market_type)
            {
                let key = (symbol.clone(), market_type);
                if self.missing_config.insert(key) {
                    warn!(
                        %symbol,
                        %market_type,
                        "Raw data observed but no expected-sources config for this key"
                    );
                }
            }
        }
        self.connection.on_data(ts);
    }

    fn ingest_confidence(&mut self, payload: &ConfidencePayload) {
        if payload.metric.is_empty() {
            debug!("Confidence event without metric key ignored");
            return;
        }
        self.cache.insert(
            payload.metric.clone(),
            CacheEntry {
                ts: payload.meta.ts,
                confidence: payload.confidence_score,
                mismatch_detected: payload.mismatch_detected.unwrap_or(false),
                sources_used: payload.sources_used.clone().unwrap_or_default(),
            },
        );
        if payload.mismatch_detected == Some(true) {
            if let Some(block) = block_for_cache_key(&payload.metric) {
                self.flags.entry(block).or_default().mismatch = true;
            }
        }
    }

    fn tick(&mut self, bucket_ts: i64, event_ts: i64) -> MarketDataStatus {
        let snapshot =
            self.registry
                .snapshot(bucket_ts, &self.last_symbol, self.last_market_type);
        let missing_config = self
            .missing_config
            .contains(&(self.last_symbol.clone(), self.last_market_type));

        let evaluation = evaluate(&EvaluatorInputs {
            config: &self.config,
            bucket_ts,
            first_bucket_ts: self.first_bucket_ts.unwrap_or(bucket_ts),
            snapshot: &snapshot,
            records: &self.records,
            cache: &self.cache,
            flags: &self.flags,
            ws_degraded: self.connection.is_degraded(),
            missing_config,
        });

        let (worst_confidence, minute_reasons) = self.minute.observe(
            bucket_ts,
            evaluation.overall_confidence,
            &evaluation.raw_reasons,
        );
        let effective = self.hysteresis.apply(&evaluation.raw_reasons, bucket_ts);
        let degraded_reasons = project_canonical(&effective);

        let expected_union = snapshot.expected_union();
        let active_agg = snapshot.active_agg_union();
        let active_raw = snapshot.active_raw_union();
        let active_all: BTreeSet<&String> = active_agg.iter().chain(active_raw.iter()).collect();

        let status = MarketDataStatus {
            overall_confidence: evaluation.overall_confidence,
            block_confidence: evaluation.block_confidence,
            degraded: !degraded_reasons.is_empty(),
            degraded_reasons,
            warming_up: evaluation.warming_up,
            warming_progress: evaluation.warming_progress,
            warming_window_ms: self.config.effective_warming_window_ms(),
            active_sources: active_all.len(),
            expected_sources: expected_union.len().max(self.config.expected_sources),
            active_sources_agg: active_agg.into_iter().collect(),
            active_sources_raw: active_raw.into_iter().collect(),
            expected_sources_agg: expected_union.iter().cloned().collect(),
            expected_sources_raw: expected_union.into_iter().collect(),
            worst_confidence_in_minute: worst_confidence,
            minute_reasons,
            last_bucket_ts: bucket_ts,
            meta: EventMeta::at(event_ts),
        };

        // Transient flags represent "since the last tick".
        self.flags.clear();
        status
    }
}

fn block_for_cache_key(key: &str) -> Option<Block> {
    if key == "price" {
        Some(Block::Price)
    } else if key == "liquidity" {
        Some(Block::Liquidity)
    } else if key.starts_with("flow") {
        Some(Block::Flow)
    } else if key.starts_with("derivatives") {
        Some(Block::Derivatives)
    } else {
        None
    }
}

/// Consumes market-data events from the bus and publishes a readiness
/// status on `system:market_data_status` once per evaluation tick.
///
/// `start` subscribes the handlers; `stop` unsubscribes them and makes
/// any still-in-flight deliveries no-ops. Calling `start` twice is a
/// no-op.
pub struct ReadinessAggregator {
    bus: Arc<dyn EventBus>,
    reporter: Arc<StatusReporter>,
    state: Arc<Mutex<AggregatorState>>,
    tokens: Mutex<Vec<SubscriptionToken>>,
}

impl ReadinessAggregator {
    /// Create an aggregator owning a fresh registry.
    #[must_use]
    pub fn new(config: ReadinessConfig, bus: Arc<dyn EventBus>) -> Self {
        Self::with_registry(config, bus, SourceRegistry::new_shared())
    }

    /// Create an aggregator over an injected registry (shared or
    /// pre-seeded by the caller).
    #[must_use]
    pub fn with_registry(
        config: ReadinessConfig,
        bus: Arc<dyn EventBus>,
        registry: SourceRegistryHandle,
    ) -> Self {
        // Environment access is confined to construction.
        let json_snapshots = config.resolve_market_status_json();
        let reporter = Arc::new(StatusReporter::new(config.log_interval_ms, json_snapshots));
        let state = Arc::new(Mutex::new(AggregatorState::new(config, registry)));
        Self {
            bus,
            reporter,
            state,
            tokens: Mutex::new(Vec::new()),
        }
    }

    /// Shared handle to the registry backing this aggregator.
    #[must_use]
    pub fn registry(&self) -> SourceRegistryHandle {
        self.state.lock().registry.clone()
    }

    /// Subscribe to all consumed topics. A second call without an
    /// intervening `stop` is a no-op.
    pub fn start(&self) {
        let mut tokens = self.tokens.lock();
        if !tokens.is_empty() {
            debug!("Aggregator already started");
            return;
        }
        self.state.lock().stopped = false;

        for topic in Topic::CONSUMED {
            let state = self.state.clone();
            let bus = self.bus.clone();
            let reporter = self.reporter.clone();
            let token = self.bus.subscribe(
                topic,
                Arc::new(move |event| {
                    let status = state.lock().handle(topic, event);
                    if let Some(status) = status {
                        bus.publish(Topic::MarketDataStatus, &BusEvent::Status(status.clone()));
                        reporter.report(&status);
                    }
                }),
            );
            tokens.push(token);
        }
        info!(topics = tokens.len(), "Readiness aggregator started");
    }

    /// Unsubscribe all handlers and ignore any in-flight deliveries.
    pub fn stop(&self) {
        let mut tokens = self.tokens.lock();
        if tokens.is_empty() {
            return;
        }
        for token in tokens.drain(..) {
            self.bus.unsubscribe(token);
        }
        self.state.lock().stopped = true;
        info!("Readiness aggregator stopped");
    }
}
