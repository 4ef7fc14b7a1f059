//! Shared round timestamps and graph point retention
//!
//! Every round is stamped exactly once. The stamp is strictly increasing across
//! rounds, so histories fed from it never see time go backwards. Whether a
//! round's point is kept in the rolling graphs depends on how long ago the
//! last kept point was: at most `graph_max_points` points survive per window.

use chrono::Utc;

use crate::history::Timestamp;

/// Timestamp and retention decision shared by every service in one round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTick {
    pub timestamp: Timestamp,

    /// Whether this round's samples go into the rolling histories
    pub retain: bool,
}

#[derive(Debug, Clone)]
pub struct RoundClock {
    /// Minimum spacing between two retained points
    retain_interval_ms: i64,
    last_tick: Option<Timestamp>,
    last_retained: Option<Timestamp>,
}

impl RoundClock {
    pub fn new(graph_duration_ms: i64, graph_max_points: i64) -> Self {
        Self {
            retain_interval_ms: graph_duration_ms / graph_max_points.max(1),
            last_tick: None,
            last_retained: None,
        }
    }

    /// Stamp a new round using the wall clock
    pub fn tick(&mut self) -> RoundTick {
        self.tick_at(Utc::now().timestamp_millis())
    }

    /// Stamp a new round at `now`
    pub fn tick_at(&mut self, now: Timestamp) -> RoundTick {
        let timestamp = match self.last_tick {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last_tick = Some(timestamp);

        let retain = self
            .last_retained
            .is_none_or(|last| timestamp - last >= self.retain_interval_ms);
        if retain {
            self.last_retained = Some(timestamp);
        }

        RoundTick { timestamp, retain }
    }

    /// Account for a point that was retained outside of [`tick`](Self::tick),
    /// e.g. one loaded from the store at startup
    pub fn observe_retained(&mut self, timestamp: Timestamp) {
        if self.last_tick.is_none_or(|last| timestamp > last) {
            self.last_tick = Some(timestamp);
        }
        if self.last_retained.is_none_or(|last| timestamp > last) {
            self.last_retained = Some(timestamp);
        }
    }

    pub fn retain_interval_ms(&self) -> i64 {
        self.retain_interval_ms
    }

    pub fn last_retained(&self) -> Option<Timestamp> {
        self.last_retained
    }
}
