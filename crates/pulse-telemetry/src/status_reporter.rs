//! Gated human-readable status logging and JSON snapshot records.

use crate::metrics;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pulse_core::MarketDataStatus;
use serde::Serialize;
use tracing::{info, warn};

/// One line in the JSON snapshot log.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusRecord<'a> {
    recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    status: &'a MarketDataStatus,
}

#[derive(Debug, Default)]
struct LastEmission {
    ts: i64,
    warming_up: bool,
    degraded: bool,
    reasons: String,
}

/// Emits human-readable status lines and optional JSON snapshot records.
///
/// A line is logged when `warming_up`, `degraded`, or the joined reason
/// list changed since the last line, or when `log_interval_ms` has passed
/// on event time. Metrics are exported on every report regardless of the
/// log gate.
pub struct StatusReporter {
    log_interval_ms: i64,
    json_snapshots: bool,
    last: Mutex<Option<LastEmission>>,
}

impl StatusReporter {
    #[must_use]
    pub fn new(log_interval_ms: i64, json_snapshots: bool) -> Self {
        Self {
            log_interval_ms,
            json_snapshots,
            last: Mutex::new(None),
        }
    }

    /// Report one evaluation tick.
    pub fn report(&self, status: &MarketDataStatus) {
        metrics::record_status(status);

        let reasons = join_reasons(status);
        let mut last = self.last.lock();
        let should_log = match last.as_ref() {
            None => true,
            Some(prev) => {
                prev.warming_up != status.warming_up
                    || prev.degraded != status.degraded
                    || prev.reasons != reasons
                    || status.meta.ts - prev.ts >= self.log_interval_ms
            }
        };
        if !should_log {
            return;
        }
        *last = Some(LastEmission {
            ts: status.meta.ts,
            warming_up: status.warming_up,
            degraded: status.degraded,
            reasons: reasons.clone(),
        });
        drop(last);

        if status.degraded {
            warn!(
                overall = status.overall_confidence,
                reasons = %reasons,
                warming_up = status.warming_up,
                active_sources = status.active_sources,
                expected_sources = status.expected_sources,
                bucket_ts = status.last_bucket_ts,
                "Market data degraded"
            );
        } else {
            info!(
                overall = status.overall_confidence,
                warming_up = status.warming_up,
                warming_progress = status.warming_progress,
                active_sources = status.active_sources,
                bucket_ts = status.last_bucket_ts,
                "Market data status"
            );
        }

        if self.json_snapshots {
            let record = StatusRecord {
                recorded_at: Utc::now(),
                status,
            };
            match serde_json::to_string(&record) {
                Ok(line) => info!(target: "pulse::status_json", "{line}"),
                Err(e) => warn!(?e, "Failed to serialize status record"),
            }
        }
    }

    /// Whether the next report of `status` would emit a log line.
    ///
    /// Does not advance the gate; used by tests and callers that want to
    /// piggyback extra logging on the same cadence.
    #[must_use]
    pub fn would_log(&self, status: &MarketDataStatus) -> bool {
        let reasons = join_reasons(status);
        match self.last.lock().as_ref() {
            None => true,
            Some(prev) => {
                prev.warming_up != status.warming_up
                    || prev.degraded != status.degraded
                    || prev.reasons != reasons
                    || status.meta.ts - prev.ts >= self.log_interval_ms
            }
        }
    }
}

fn join_reasons(status: &MarketDataStatus) -> String {
    status
        .degraded_reasons
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{BlockConfidence, EventMeta, ReasonCode};

    fn status(ts: i64, degraded: bool, reasons: Vec<ReasonCode>) -> MarketDataStatus {
        MarketDataStatus {
            overall_confidence: 0.9,
            block_confidence: BlockConfidence::default(),
            degraded,
            degraded_reasons: reasons,
            warming_up: false,
            warming_progress: 1.0,
            warming_window_ms: 1000,
            active_sources: 1,
            expected_sources: 1,
            active_sources_agg: Vec::new(),
            active_sources_raw: Vec::new(),
            expected_sources_agg: Vec::new(),
            expected_sources_raw: Vec::new(),
            worst_confidence_in_minute: 0.9,
            minute_reasons: Vec::new(),
            last_bucket_ts: ts,
            meta: EventMeta::at(ts),
        }
    }

    #[test]
    fn test_first_report_always_logs() {
        let reporter = StatusReporter::new(60_000, false);
        assert!(reporter.would_log(&status(1000, false, Vec::new())));
    }

    #[test]
    fn test_unchanged_status_gated_until_interval() {
        let reporter = StatusReporter::new(10_000, false);
        reporter.report(&status(1000, false, Vec::new()));

        assert!(!reporter.would_log(&status(2000, false, Vec::new())));
        assert!(reporter.would_log(&status(11_000, false, Vec::new())));
    }

    #[test]
    fn test_degraded_transition_logs_immediately() {
        let reporter = StatusReporter::new(60_000, false);
        reporter.report(&status(1000, false, Vec::new()));

        assert!(reporter.would_log(&status(
            2000,
            true,
            vec![ReasonCode::PriceStale]
        )));
    }

    #[test]
    fn test_reason_list_change_logs_immediately() {
        let reporter = StatusReporter::new(60_000, false);
        reporter.report(&status(1000, true, vec![ReasonCode::PriceStale]));

        assert!(reporter.would_log(&status(
            2000,
            true,
            vec![ReasonCode::PriceStale, ReasonCode::SourcesMissing]
        )));
        assert!(!reporter.would_log(&status(2000, true, vec![ReasonCode::PriceStale])));
    }
}
