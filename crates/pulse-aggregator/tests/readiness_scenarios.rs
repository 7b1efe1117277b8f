//! End-to-end readiness scenarios driven through the in-memory bus.

use parking_lot::Mutex;
use pulse_aggregator::{HysteresisConfig, ReadinessAggregator, ReadinessConfig};
use pulse_bus::{EventBus, InMemoryBus, Topic};
use pulse_core::{
    AggregatedPayload, Block, BusEvent, ConnectionPayload, DerivativeKind, EventMeta, FlowKind,
    MarketDataStatus, MarketType, QualityPayload, RawPayload, ReasonCode,
};
use pulse_registry::BlockSources;
use rust_decimal_macros::dec;
use std::sync::Arc;

const SYM: &str = "BTCUSDT";

fn agg(ts: i64, confidence: f64, sources: &[&str]) -> BusEvent {
    BusEvent::Aggregated(AggregatedPayload {
        symbol: SYM.to_string(),
        market_type: Some(MarketType::Futures),
        confidence_score: Some(confidence),
        sources_used: Some(sources.iter().map(|s| s.to_string()).collect()),
        price: Some(dec!(50000)),
        meta: EventMeta::at(ts),
        ..Default::default()
    })
}

fn raw(ts: i64, source: &str) -> BusEvent {
    BusEvent::Raw(RawPayload {
        symbol: SYM.to_string(),
        market_type: Some(MarketType::Futures),
        source: Some(source.to_string()),
        meta: EventMeta::at(ts),
        ..Default::default()
    })
}

fn connection(ts: i64) -> BusEvent {
    BusEvent::Connection(ConnectionPayload {
        source: Some("binance".to_string()),
        meta: EventMeta::at(ts),
        ..Default::default()
    })
}

fn gap(ts: i64) -> BusEvent {
    BusEvent::Quality(QualityPayload {
        block: Some(Block::Price),
        meta: EventMeta::at(ts),
        ..Default::default()
    })
}

/// Base config used by most scenarios: one expected source per block,
/// spot flow and oi+funding derivatives, 1s warming, no grace.
fn base_config() -> ReadinessConfig {
    let mut by_block = BlockSources::default();
    for block in Block::ALL {
        by_block.set(block, vec!["s1".to_string()]);
    }
    ReadinessConfig {
        warming_window_ms: 1000,
        market_status_json: Some(false),
        expected_sources_by_block: by_block,
        expected_flow_types: [FlowKind::Spot].into_iter().collect(),
        expected_derivative_kinds: [DerivativeKind::Oi, DerivativeKind::Funding]
            .into_iter()
            .collect(),
        ..Default::default()
    }
}

/// Run an event sequence through a fresh aggregator; returns every
/// published status in order.
fn run(config: ReadinessConfig, events: &[(Topic, BusEvent)]) -> Vec<MarketDataStatus> {
    let bus = Arc::new(InMemoryBus::new());
    let aggregator = ReadinessAggregator::new(config, bus.clone());

    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    bus.subscribe(
        Topic::MarketDataStatus,
        Arc::new(move |event| {
            if let BusEvent::Status(status) = event {
                sink.lock().push(status.clone());
            }
        }),
    );

    aggregator.start();
    for (topic, event) in events {
        bus.publish(*topic, event);
    }
    aggregator.stop();

    let statuses = captured.lock().clone();
    statuses
}

fn full_bucket(ts: i64) -> Vec<(Topic, BusEvent)> {
    vec![
        (Topic::PriceCanonical, agg(ts, 0.95, &["s1"])),
        (Topic::CvdSpotAgg, agg(ts, 0.9, &["s1"])),
        (Topic::LiquidityAgg, agg(ts, 0.9, &["s1"])),
        (Topic::OiAgg, agg(ts, 0.9, &["s1"])),
        (Topic::FundingAgg, agg(ts, 0.9, &["s1"])),
    ]
}

#[test]
fn warm_path_to_ready() {
    let mut events = full_bucket(1000);
    events.extend(full_bucket(2000));

    let statuses = run(base_config(), &events);
    let last = statuses.last().unwrap();

    assert!(!last.warming_up);
    assert!(!last.degraded);
    assert!(last.degraded_reasons.is_empty());
    assert!(last.overall_confidence > 0.7, "overall={}", last.overall_confidence);
    assert_eq!(last.last_bucket_ts, 2000);
}

#[test]
fn missing_price_raises_price_stale() {
    let events = vec![
        (Topic::CvdSpotAgg, agg(1000, 0.9, &["s1"])),
        (Topic::LiquidityAgg, agg(1000, 0.9, &["s1"])),
        (Topic::OiAgg, agg(1000, 0.9, &["s1"])),
        (Topic::FundingAgg, agg(1000, 0.9, &["s1"])),
    ];

    let statuses = run(base_config(), &events);
    let last = statuses.last().unwrap();

    assert!(last.degraded);
    assert!(last.degraded_reasons.contains(&ReasonCode::PriceStale));
}

#[test]
fn undersubscribed_feed_raises_sources_missing() {
    let mut config = base_config();
    config.expected_sources = 2;

    let statuses = run(config, &full_bucket(1000));
    let last = statuses.last().unwrap();

    assert!(last.degraded);
    assert!(last.degraded_reasons.contains(&ReasonCode::SourcesMissing));
    assert_eq!(last.expected_sources, 2);
    assert_eq!(last.active_sources_agg, vec!["s1".to_string()]);
}

#[test]
fn warming_progress_tracks_first_bucket() {
    let mut config = base_config();
    config.warming_window_ms = 3000;

    let mut events = full_bucket(1000);
    events.extend(full_bucket(4000));
    let statuses = run(config, &events);

    let first = statuses.first().unwrap();
    assert_eq!(first.warming_progress, 0.0);
    assert!(first.warming_up);

    let last = statuses.last().unwrap();
    assert_eq!(last.warming_progress, 1.0);
    assert!(!last.warming_up);
    assert_eq!(last.warming_window_ms, 3000);
}

#[test]
fn derivatives_use_their_own_stale_window() {
    let mut by_block = BlockSources::default();
    by_block.set(Block::Price, vec!["s1".to_string()]);
    by_block.set(Block::Derivatives, vec!["s1".to_string()]);
    let config = ReadinessConfig {
        warming_window_ms: 1000,
        market_status_json: Some(false),
        confidence_stale_window_ms: Some(1000),
        derivatives_stale_window_ms: Some(10_000),
        expected_sources_by_block: by_block,
        expected_derivative_kinds: [DerivativeKind::Funding].into_iter().collect(),
        ..Default::default()
    };

    let events = vec![
        (Topic::FundingAgg, agg(5000, 0.9, &["s1"])),
        (Topic::PriceCanonical, agg(10_000, 0.95, &["s1"])),
    ];
    let statuses = run(config, &events);
    let last = statuses.last().unwrap();

    assert!(!last
        .degraded_reasons
        .contains(&ReasonCode::DerivativesLowConf));
    assert_eq!(last.block_confidence.derivatives, 0.9);
}

#[test]
fn explicitly_empty_expected_list_does_not_penalise() {
    let mut config = base_config();
    config
        .expected_sources_by_block
        .set(Block::Liquidity, Vec::new());

    let events = vec![
        (Topic::PriceCanonical, agg(1000, 0.95, &["s1"])),
        // Terrible liquidity confidence, but the block is not required.
        (Topic::LiquidityAgg, agg(1000, 0.1, &["s1"])),
    ];
    let statuses = run(config, &events);
    let last = statuses.last().unwrap();

    assert_eq!(last.block_confidence.liquidity, 1.0);
    assert!(!last
        .degraded_reasons
        .contains(&ReasonCode::LiquidityLowConf));
}

#[test]
fn transient_gap_absorbed_by_enter_window() {
    let mut config = base_config();
    config.hysteresis = HysteresisConfig {
        hard_fast_reason_enter_window_ms: 1000,
        hard_reason_exit_window_ms: 2000,
        ..Default::default()
    };
    // Price-only buckets keep the other blocks unregistered.
    let mut by_block = BlockSources::default();
    by_block.set(Block::Price, vec!["s1".to_string()]);
    config.expected_sources_by_block = by_block;

    let events = vec![
        (Topic::PriceCanonical, agg(1000, 0.95, &["s1"])),
        (Topic::DataGapDetected, gap(1500)),
        (Topic::PriceCanonical, agg(2000, 0.95, &["s1"])),
        (Topic::PriceCanonical, agg(3000, 0.95, &["s1"])),
    ];
    let statuses = run(config.clone(), &events);
    // One dirty tick never flips readiness.
    assert!(statuses.iter().all(|s| !s.degraded));

    let events = vec![
        (Topic::PriceCanonical, agg(1000, 0.95, &["s1"])),
        (Topic::DataGapDetected, gap(1500)),
        (Topic::PriceCanonical, agg(2000, 0.95, &["s1"])),
        (Topic::DataGapDetected, gap(2500)),
        (Topic::PriceCanonical, agg(3000, 0.95, &["s1"])),
        (Topic::PriceCanonical, agg(4000, 0.95, &["s1"])),
        (Topic::PriceCanonical, agg(5000, 0.95, &["s1"])),
    ];
    let statuses = run(config, &events);

    // Sustained across the enter window: effective at t=3000.
    let at_3000 = statuses.iter().find(|s| s.last_bucket_ts == 3000).unwrap();
    assert!(at_3000.degraded);
    assert!(at_3000.degraded_reasons.contains(&ReasonCode::GapsDetected));

    // Still held inside the exit window.
    let at_4000 = statuses.iter().find(|s| s.last_bucket_ts == 4000).unwrap();
    assert!(at_4000.degraded_reasons.contains(&ReasonCode::GapsDetected));

    // Cleared after a full exit window of clean ticks.
    let at_5000 = statuses.iter().find(|s| s.last_bucket_ts == 5000).unwrap();
    assert!(!at_5000.degraded);
}

#[test]
fn price_without_sources_is_ignored() {
    let events = vec![
        (
            Topic::PriceCanonical,
            BusEvent::Aggregated(AggregatedPayload {
                symbol: SYM.to_string(),
                market_type: Some(MarketType::Futures),
                confidence_score: Some(0.9),
                meta: EventMeta::at(1000),
                ..Default::default()
            }),
        ),
        (Topic::PriceCanonical, agg(2000, 0.95, &["s1"])),
    ];

    let statuses = run(base_config(), &events);
    // The sourceless price produced no tick at all.
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].last_bucket_ts, 2000);
    assert!(!statuses[0]
        .degraded_reasons
        .contains(&ReasonCode::PriceStale));
}

#[test]
fn connect_alone_never_clears_ws_degraded() {
    let mut events = vec![
        (Topic::Disconnected, connection(500)),
        (Topic::Connected, connection(600)),
    ];
    events.extend(full_bucket(1000));

    let statuses = run(base_config(), &events);
    let last = statuses.last().unwrap();
    assert!(last
        .degraded_reasons
        .contains(&ReasonCode::WsDisconnected));
}

#[test]
fn ws_degraded_clears_after_stable_data_window() {
    let mut config = base_config();
    config.ws_recovery_window_ms = 2000;

    let mut events = vec![
        (Topic::Disconnected, connection(500)),
        (Topic::Connected, connection(600)),
    ];
    for ts in [1000, 1500, 2000, 2500, 3000] {
        events.push((Topic::PriceCanonical, agg(ts, 0.95, &["s1"])));
    }
    let statuses = run(config, &events);

    let at_2500 = statuses.iter().find(|s| s.last_bucket_ts == 2500).unwrap();
    assert!(at_2500
        .degraded_reasons
        .contains(&ReasonCode::WsDisconnected));

    // 2000ms of continuous data since the first post-disconnect event.
    let last = statuses.last().unwrap();
    assert!(!last
        .degraded_reasons
        .contains(&ReasonCode::WsDisconnected));
}

#[test]
fn startup_grace_suppresses_selectively() {
    let mut config = base_config();
    config.startup_grace_window_ms = 5000;

    let events = vec![
        (Topic::CvdSpotAgg, agg(1000, 0.9, &["s1"])),
        (Topic::DataGapDetected, gap(1200)),
        (Topic::CvdSpotAgg, agg(2000, 0.9, &["s1"])),
    ];
    let statuses = run(config, &events);

    // No price record anywhere, yet PRICE_STALE never appears in grace.
    for status in &statuses {
        assert!(!status.degraded_reasons.contains(&ReasonCode::PriceStale));
    }
    // Gap reporting is exempt from grace.
    let at_2000 = statuses.iter().find(|s| s.last_bucket_ts == 2000).unwrap();
    assert!(at_2000.degraded_reasons.contains(&ReasonCode::GapsDetected));
}

#[test]
fn minute_truth_retains_worst_and_union() {
    let events = vec![
        // Low-confidence price first.
        (Topic::PriceCanonical, agg(1000, 0.2, &["s1"])),
        // Healthy afterwards, same minute.
        (Topic::PriceCanonical, agg(2000, 0.95, &["s1"])),
    ];
    let statuses = run(base_config(), &events);
    let last = statuses.last().unwrap();

    assert!(last.worst_confidence_in_minute < last.overall_confidence);
    assert!(last.minute_reasons.contains(&ReasonCode::PriceLowConf));
    // The instantaneous view recovered.
    assert!(!last.degraded_reasons.contains(&ReasonCode::PriceLowConf));
}

#[test]
fn minute_truth_resets_on_minute_boundary() {
    let events = vec![
        (Topic::PriceCanonical, agg(59_000, 0.2, &["s1"])),
        (Topic::PriceCanonical, agg(60_500, 0.95, &["s1"])),
    ];
    let statuses = run(base_config(), &events);
    let last = statuses.last().unwrap();

    assert!(last.minute_reasons.is_empty());
    assert_eq!(last.worst_confidence_in_minute, last.overall_confidence);
}

#[test]
fn every_payload_upholds_invariants() {
    let mut config = base_config();
    config.expected_sources = 2;
    config.startup_grace_window_ms = 1000;

    let mut events = vec![
        (Topic::Trade, raw(900, "s2")),
        (Topic::Disconnected, connection(950)),
    ];
    events.extend(full_bucket(1000));
    events.push((Topic::DataGapDetected, gap(1200)));
    events.extend(full_bucket(2000));
    events.push((Topic::Connected, connection(2100)));
    events.extend(full_bucket(3000));

    let statuses = run(config, &events);
    assert!(!statuses.is_empty());

    for status in &statuses {
        assert_eq!(status.degraded, !status.degraded_reasons.is_empty());
        assert!((0.0..=1.0).contains(&status.overall_confidence));
        assert!((0.0..=1.0).contains(&status.warming_progress));
        for block in Block::ALL {
            assert!((0.0..=1.0).contains(&status.block_confidence.get(block)));
        }

        // Reason list is a subsequence of the canonical order.
        let positions: Vec<usize> = status
            .degraded_reasons
            .iter()
            .map(|r| {
                ReasonCode::CANONICAL
                    .iter()
                    .position(|c| c == r)
                    .expect("unknown reason")
            })
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        // Source lists are sorted and deduplicated.
        for list in [
            &status.active_sources_agg,
            &status.active_sources_raw,
            &status.expected_sources_agg,
            &status.expected_sources_raw,
        ] {
            assert!(list.windows(2).all(|w| w[0] < w[1]));
        }
    }
}

#[test]
fn replay_is_byte_identical() {
    let mut config = base_config();
    config.startup_grace_window_ms = 1000;

    let mut events = vec![
        (Topic::Trade, raw(900, "s2")),
        (Topic::Disconnected, connection(950)),
        (Topic::Connected, connection(980)),
    ];
    events.extend(full_bucket(1000));
    events.push((Topic::DataGapDetected, gap(1200)));
    events.extend(full_bucket(2000));
    events.extend(full_bucket(3000));

    let first: Vec<String> = run(config.clone(), &events)
        .iter()
        .map(|s| serde_json::to_string(s).unwrap())
        .collect();
    let second: Vec<String> = run(config, &events)
        .iter()
        .map(|s| serde_json::to_string(s).unwrap())
        .collect();

    assert!(!first.is_empty());
    assert_eq!(first, second);
}
