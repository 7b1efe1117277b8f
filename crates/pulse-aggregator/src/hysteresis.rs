//! Per-reason hysteresis.
//!
//! A reason becomes effective only after continuous observation for its
//! class's enter window, and stops being effective only after continuous
//! absence for its class's exit window. Timers are keyed by reason code
//! alone, so a reason oscillating between origins does not stutter.

use crate::config::HysteresisConfig;
use pulse_core::{ReasonClass, ReasonCode};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct ReasonTimer {
    first_observed_ts: i64,
    last_observed_ts: i64,
    active: bool,
    active_since_ts: Option<i64>,
}

/// Stateful gate between observed and effective reason sets.
#[derive(Debug)]
pub struct HysteresisGate {
    config: HysteresisConfig,
    ledger: BTreeMap<ReasonCode, ReasonTimer>,
}

impl HysteresisGate {
    #[must_use]
    pub fn new(config: HysteresisConfig) -> Self {
        Self {
            config,
            ledger: BTreeMap::new(),
        }
    }

    fn enter_window(&self, class: ReasonClass) -> i64 {
        match class {
            ReasonClass::HardFast => self.config.hard_fast_reason_enter_window_ms,
            ReasonClass::Hard => self.config.hard_reason_enter_window_ms,
            ReasonClass::Soft => self.config.soft_reason_enter_window_ms,
        }
    }

    fn exit_window(&self, class: ReasonClass) -> i64 {
        match class {
            ReasonClass::HardFast | ReasonClass::Hard => self.config.hard_reason_exit_window_ms,
            ReasonClass::Soft => self.config.soft_reason_exit_window_ms,
        }
    }

    /// Advance all timers to `now` given the observed set, and return the
    /// effective set.
    pub fn apply(&mut self, observed: &BTreeSet<ReasonCode>, now: i64) -> BTreeSet<ReasonCode> {
        for reason in ReasonCode::CANONICAL {
            if observed.contains(&reason) {
                let enter_window = self.enter_window(reason.class());
                let timer = self.ledger.entry(reason).or_insert(ReasonTimer {
                    first_observed_ts: now,
                    last_observed_ts: now,
                    active: false,
                    active_since_ts: None,
                });
                timer.last_observed_ts = now;
                if !timer.active && now - timer.first_observed_ts >= enter_window
                {
                    debug!(%reason, now, "Reason entered");
                    timer.active = true;
                    timer.active_since_ts = Some(now);
                }
            } else if let Some(timer) = self.ledger.get(&reason) {
                if !timer.active {
                    // Observation streak broken before entering.
                    self.ledger.remove(&reason);
                } else if now - timer.last_observed_ts >= self.exit_window(reason.class()) {
                    debug!(%reason, now, "Reason cleared");
                    self.ledger.remove(&reason);
                }
            }
        }

        self.ledger
            .iter()
            .filter(|(_, timer)| timer.active)
            .map(|(reason, _)| *reason)
            .collect()
    }
}
