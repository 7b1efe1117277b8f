//! Minute truth: worst status and union of reasons per UTC minute.

use pulse_core::{project_canonical, ReasonCode};
use std::collections::BTreeSet;

/// Retains the worst overall confidence and the union of raw
/// (pre-hysteresis) reasons within the current UTC minute of the bucket
/// timestamp. Resets when the minute boundary crosses.
#[derive(Debug, Default)]
pub struct MinuteMemory {
    minute: Option<i64>,
    worst_confidence: f64,
    reasons: BTreeSet<ReasonCode>,
}

impl MinuteMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tick into the memory; returns the minute's worst
    /// confidence and its reason union in canonical order.
    pub fn observe(
        &mut self,
        bucket_ts: i64,
        overall_confidence: f64,
        raw_reasons: &BTreeSet<ReasonCode>,
    ) -> (f64, Vec<ReasonCode>) {
        let minute = bucket_ts.div_euclid(60_000);
        if self.minute != Some(minute) {
            self.minute = Some(minute);
            self.worst_confidence = overall_confidence;
            self.reasons = raw_reasons.clone();
        } else {
            self.worst_confidence = self.worst_confidence.min(overall_confidence);
            self.reasons.extend(raw_reasons.iter().copied());
        }
        (self.worst_confidence, project_canonical(&self.reasons))
    }
}
