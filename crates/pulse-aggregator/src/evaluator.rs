//! Per-tick readiness evaluation.
//!
//! Pure computation from the aggregator's state to block confidences,
//! the weighted overall confidence, warming progress, and the raw
//! (pre-hysteresis) reason set.

use crate::config::ReadinessConfig;
use pulse_core::{Block, BlockConfidence, DerivativeKind, FlowKind, ReasonCode};
use pulse_registry::RegistrySnapshot;
use std::collections::{BTreeMap, BTreeSet};

/// Latest aggregated record of a block. Superseded, not accumulated, by
/// the next record for the same block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    pub symbol: String,
    pub bucket_ts: i64,
    pub event_ts: i64,
    pub confidence: Option<f64>,
    pub sources_used: Vec<String>,
    pub stale_sources_dropped: u32,
    pub mismatch_detected: bool,
}

/// Transient per-block flags; something happened since the last tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockFlags {
    pub gap: bool,
    pub lag: bool,
    pub mismatch: bool,
}

/// One entry of the confidence cache, keyed by metric cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub ts: i64,
    pub confidence: Option<f64>,
    pub mismatch_detected: bool,
    pub sources_used: Vec<String>,
}

/// Everything one evaluation tick reads.
#[derive(Debug)]
pub struct EvaluatorInputs<'a> {
    pub config: &'a ReadinessConfig,
    pub bucket_ts: i64,
    pub first_bucket_ts: i64,
    pub snapshot: &'a RegistrySnapshot,
    pub records: &'a BTreeMap<Block, BlockRecord>,
    pub cache: &'a BTreeMap<String, CacheEntry>,
    pub flags: &'a BTreeMap<Block, BlockFlags>,
    pub ws_degraded: bool,
    pub missing_config: bool,
}

/// Outcome of one evaluation tick, before hysteresis.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub block_confidence: BlockConfidence,
    pub overall_confidence: f64,
    /// Grace-filtered, pre-hysteresis reason set.
    pub raw_reasons: BTreeSet<ReasonCode>,
    pub warming_up: bool,
    pub warming_progress: f64,
}

/// Clamp an externally provided confidence; anything non-finite or
/// missing counts as 0, never as 1.
fn sanitize(confidence: Option<f64>) -> f64 {
    confidence
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

fn cache_confidence(entry: Option<&CacheEntry>, bucket_ts: i64, stale_window_ms: i64) -> f64 {
    match entry {
        None => 0.0,
        Some(entry) if bucket_ts - entry.ts > stale_window_ms => 0.0,
        Some(entry) => sanitize(entry.confidence),
    }
}

fn record_confidence(record: Option<&BlockRecord>, bucket_ts: i64, stale_window_ms: i64) -> f64 {
    match record {
        None => 0.0,
        Some(record) if bucket_ts - record.event_ts > stale_window_ms => 0.0,
        Some(record) => sanitize(record.confidence),
    }
}

/// Minimum confidence over a family of cache keys; an expected key with
/// no entry counts as 0. With no expected keys, falls back to the
/// minimum over whichever family keys are cached, or 0 if none are.
fn fused_confidence<'a, I>(
    expected_keys: Vec<&'static str>,
    all_keys: I,
    cache: &BTreeMap<String, CacheEntry>,
    bucket_ts: i64,
    stale_window_ms: i64,
) -> f64
where
    I: IntoIterator<Item = &'a str>,
{
    if expected_keys.is_empty() {
        let mut min: Option<f64> = None;
        for key in all_keys {
            if let Some(entry) = cache.get(key) {
                let conf = cache_confidence(Some(entry), bucket_ts, stale_window_ms);
                min = Some(min.map_or(conf, |m| m.min(conf)));
            }
        }
        return min.unwrap_or(0.0);
    }
    expected_keys
        .into_iter()
        .map(|key| cache_confidence(cache.get(key), bucket_ts, stale_window_ms))
        .fold(1.0, f64::min)
}

/// Run one evaluation tick.
pub fn evaluate(inputs: &EvaluatorInputs<'_>) -> Evaluation {
    let config = inputs.config;
    let bucket_ts = inputs.bucket_ts;
    let stale_ms = config.effective_confidence_stale_window_ms();
    let deriv_stale_ms = config.effective_derivatives_stale_window_ms();

    // --- Per-block confidence ---
    let mut confidence = BlockConfidence::default();
    for block in Block::ALL {
        let value = if inputs.snapshot.expected_for(block).is_empty() {
            // Not contractually required.
            1.0
        } else {
            match block {
                Block::Price => {
                    record_confidence(inputs.records.get(&Block::Price), bucket_ts, stale_ms)
                }
                Block::Liquidity => {
                    record_confidence(inputs.records.get(&Block::Liquidity), bucket_ts, stale_ms)
                }
                Block::Flow => fused_confidence(
                    config
                        .expected_flow_types
                        .iter()
                        .map(|k| k.metric().cache_key())
                        .collect(),
                    [FlowKind::Spot, FlowKind::Futures]
                        .iter()
                        .map(|k| k.metric().cache_key()),
                    inputs.cache,
                    bucket_ts,
                    stale_ms,
                ),
                Block::Derivatives => fused_confidence(
                    config
                        .expected_derivative_kinds
                        .iter()
                        .map(|k| k.metric().cache_key())
                        .collect(),
                    [
                        DerivativeKind::Oi,
                        DerivativeKind::Funding,
                        DerivativeKind::Liquidations,
                    ]
                    .iter()
                    .map(|k| k.metric().cache_key()),
                    inputs.cache,
                    bucket_ts,
                    deriv_stale_ms,
                ),
            }
        };
        confidence.set(block, value);
    }

    // --- Overall confidence: weighted over critical blocks only ---
    let mut weight_sum = 0.0;
    let mut weighted = 0.0;
    for block in Block::ALL {
        let weight = if config.critical_blocks.contains(&block) {
            config.weights.get(block)
        } else {
            0.0
        };
        weight_sum += weight;
        weighted += confidence.get(block) * weight;
    }
    let overall = if weight_sum > 0.0 {
        (weighted / weight_sum).clamp(0.0, 1.0)
    } else {
        // Degenerate weight vector: price carries everything.
        confidence.get(Block::Price).clamp(0.0, 1.0)
    };

    // --- Warming ---
    let warming_window = config.effective_warming_window_ms();
    let warming_progress = if warming_window == 0 {
        1.0
    } else {
        (((bucket_ts - inputs.first_bucket_ts) as f64) / warming_window as f64).clamp(0.0, 1.0)
    };
    let warming_up = warming_progress < 1.0;

    // --- Reasons ---
    let in_grace =
        config.startup_grace_window_ms > 0 && bucket_ts - inputs.first_bucket_ts < config.startup_grace_window_ms;
    let mut reasons: BTreeSet<ReasonCode> = BTreeSet::new();
    let critical = &config.critical_blocks;
    let price_record = inputs.records.get(&Block::Price);
    let price_on_bucket = price_record.is_some_and(|r| r.bucket_ts == bucket_ts);

    if !in_grace {
        if critical.contains(&Block::Price) && !price_on_bucket {
            reasons.insert(ReasonCode::PriceStale);
        }
        for block in Block::ALL {
            let expected = !inputs.snapshot.expected_for(block).is_empty();
            let low = confidence.get(block) < config.thresholds.critical_block;
            let gated = match block {
                // Low-conf on price only applies to a present, on-bucket
                // record; an absent record is a staleness problem.
                Block::Price => price_on_bucket,
                _ => true,
            };
            if expected && critical.contains(&block) && low && gated {
                reasons.insert(ReasonCode::low_conf_for(block));
            }
        }

        if inputs.ws_degraded {
            reasons.insert(ReasonCode::WsDisconnected);
        }

        let expected_agg = inputs
            .snapshot
            .expected_union()
            .len()
            .max(config.expected_sources);
        let active_agg = inputs.snapshot.active_agg_union().len();
        if expected_agg > 0 && active_agg < expected_agg {
            reasons.insert(ReasonCode::SourcesMissing);
        }

        let raw_too_old = config.no_data_window_ms > 0
            && inputs
                .snapshot
                .max_last_seen_raw_ts()
                .is_some_and(|ts| bucket_ts - ts > config.no_data_window_ms);
        if raw_too_old || inputs.flags.values().any(|f| f.lag) {
            reasons.insert(ReasonCode::LagTooHigh);
        }

        let mismatch = inputs.flags.values().any(|f| f.mismatch)
            || price_record.is_some_and(|r| r.mismatch_detected);
        if mismatch {
            let trustworthy_price = price_on_bucket
                && confidence.get(Block::Price) >= config.thresholds.critical_block;
            if trustworthy_price {
                reasons.insert(ReasonCode::MismatchDetected);
            } else {
                reasons.insert(ReasonCode::NoRefPrice);
            }
        }

        // Overall shortfall: blame the weakest critical block. Ties keep
        // the first block in evaluation order.
        if overall < config.thresholds.overall {
            let mut weakest: Option<(Block, f64)> = None;
            for block in Block::ALL {
                if !critical.contains(&block) {
                    continue;
                }
                let conf = confidence.get(block);
                if weakest.map_or(true, |(_, lowest)| conf < lowest) {
                    weakest = Some((block, conf));
                }
            }
            if let Some((block, _)) = weakest {
                reasons.insert(ReasonCode::low_conf_for(block));
            }
        }
    }

    // Not suppressed by the startup grace window.
    if inputs.flags.values().any(|f| f.gap) {
        reasons.insert(ReasonCode::GapsDetected);
    }
    if !inputs.snapshot.non_monotonic_sources.is_empty() {
        reasons.insert(ReasonCode::NonMonotonicTimebase);
    }
    if inputs.missing_config {
        reasons.insert(ReasonCode::ExpectedSourcesMissingConfig);
    }

    Evaluation {
        block_confidence: confidence,
        overall_confidence: overall,
        raw_reasons: reasons,
        warming_up,
        warming_progress,
    }
}
