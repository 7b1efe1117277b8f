//! WebSocket-level degradation tracking.
//!
//! A disconnect marks the feed degraded. A connect alone never clears
//! it; clearing requires a full recovery window of continuous data flow
//! after the last disconnect. Data flow with a silence longer than the
//! continuity gap restarts the recovery window.

use tracing::{debug, info, warn};

/// Tracks the WebSocket-level degraded state.
///
/// Invariant: when not degraded, both `last_disconnect_ts` and
/// `recovery_start_ts` are unset.
#[derive(Debug)]
pub struct ConnectionTracker {
    recovery_window_ms: i64,
    continuity_gap_ms: i64,
    ws_degraded: bool,
    last_disconnect_ts: Option<i64>,
    recovery_start_ts: Option<i64>,
    last_data_ts: Option<i64>,
}

impl ConnectionTracker {
    /// `recovery_window_ms` is the continuous-flow requirement;
    /// `continuity_gap_ms` is the longest silence between data events
    /// that still counts as continuous.
    #[must_use]
    pub fn new(recovery_window_ms: i64, continuity_gap_ms: i64) -> Self {
        Self {
            recovery_window_ms: recovery_window_ms.max(1000),
            continuity_gap_ms: continuity_gap_ms.max(1),
            ws_degraded: false,
            last_disconnect_ts: None,
            recovery_start_ts: None,
            last_data_ts: None,
        }
    }

    /// Whether the connection is currently considered degraded.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.ws_degraded
    }

    /// Record a disconnect event.
    pub fn on_disconnect(&mut self, ts: i64) {
        warn!(ts, "Connection degraded");
        self.ws_degraded = true;
        self.last_disconnect_ts = Some(self.last_disconnect_ts.map_or(ts, |prev| prev.max(ts)));
        self.recovery_start_ts = None;
    }

    /// Record a connect event. Never clears the degraded state by
    /// itself; recovery starts counting from the next data event.
    pub fn on_connect(&mut self, ts: i64) {
        debug!(ts, degraded = self.ws_degraded, "Connection established");
    }

    /// Record data flow at `ts`, advancing recovery when degraded.
    pub fn on_data(&mut self, ts: i64) {
        if self.ws_degraded {
            // Only data after the disconnect counts toward recovery.
            let after_disconnect = self.last_disconnect_ts.map_or(true, |d| ts > d);
            if after_disconnect {
                let broke_continuity = self
                    .last_data_ts
                    .is_some_and(|last| ts - last > self.continuity_gap_ms);
                match self.recovery_start_ts {
                    Some(start) if !broke_continuity => {
                        if ts - start >= self.recovery_window_ms {
                            info!(ts, "Connection recovered after stable data window");
                            self.ws_degraded = false;
                            self.last_disconnect_ts = None;
                            self.recovery_start_ts = None;
                        }
                    }
                    _ => {
                        self.recovery_start_ts = Some(ts);
                    }
                }
            }
        }
        self.last_data_ts = Some(self.last_data_ts.map_or(ts, |prev| prev.max(ts)));
    }
}
