//! Rolling graph history for a single service
//!
//! Samples are kept as two index-aligned deques (timestamps and values) so the
//! timestamp column can be handed to graph consumers as-is. The window is
//! duration-based: whenever a sample is appended, every sample older than
//! `newest - window` is culled from the front.
//!
//! The peak over the retained window is cached together with its index and is
//! only recomputed when culling removed it.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Highest value in a window, with the time it was first observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peak {
    pub value: u32,
    pub timestamp: Timestamp,
}

/// Bounded, time-ordered sequence of occupancy samples
///
/// `None` values mark rounds in which the service was offline. They occupy a
/// slot in the graph but never count towards the peak.
#[derive(Debug, Clone)]
pub struct RollingHistory {
    timestamps: VecDeque<Timestamp>,
    values: VecDeque<Option<u32>>,

    /// Window length in milliseconds
    window_ms: i64,

    /// Cached (value, index into `values`)
    peak: Option<(u32, usize)>,
}

impl RollingHistory {
    pub fn new(window_ms: i64) -> Self {
        Self {
            timestamps: VecDeque::new(),
            values: VecDeque::new(),
            window_ms: window_ms.max(0),
            peak: None,
        }
    }

    /// Append a sample at the tail and cull anything that fell out of the window
    ///
    /// Returns `false` without touching the history if `timestamp` is older
    /// than the current tail.
    pub fn append(&mut self, timestamp: Timestamp, value: Option<u32>) -> bool {
        if let Some(&tail) = self.timestamps.back()
            && timestamp < tail
        {
            warn!("rejected out-of-order sample at {timestamp} (tail is at {tail})");
            return false;
        }

        self.timestamps.push_back(timestamp);
        self.values.push_back(value);

        let dropped = self.cull(timestamp.saturating_sub(self.window_ms));

        match self.peak {
            Some((value, index)) if index >= dropped => {
                self.peak = Some((value, index - dropped));
            }
            Some(_) => self.recompute_peak(),
            None => {}
        }

        // strict comparison keeps the earliest of equal peaks
        let newest = self.values.len() - 1;
        if let Some(value) = value
            && self.peak.is_none_or(|(peak, _)| value > peak)
        {
            self.peak = Some((value, newest));
        }

        true
    }

    /// Replace the contents with persisted samples
    ///
    /// Samples older than `start_time`, or outside the window anchored at the
    /// newest sample, are dropped. Out-of-order samples are skipped.
    pub fn load_bulk(&mut self, start_time: Timestamp, timestamps: &[Timestamp], values: &[Option<u32>]) {
        if timestamps.len() != values.len() {
            warn!(
                "graph data length mismatch ({} timestamps, {} values), truncating",
                timestamps.len(),
                values.len()
            );
        }

        self.timestamps.clear();
        self.values.clear();
        self.peak = None;

        for (&timestamp, &value) in timestamps.iter().zip(values) {
            if let Some(&tail) = self.timestamps.back()
                && timestamp < tail
            {
                debug!("skipping out-of-order persisted sample at {timestamp}");
                continue;
            }
            self.timestamps.push_back(timestamp);
            self.values.push_back(value);
        }

        if let Some(&newest) = self.timestamps.back() {
            self.cull(start_time.max(newest.saturating_sub(self.window_ms)));
        }

        self.recompute_peak();
    }

    /// Cached peak over the retained window
    pub fn find_peak(&self) -> Option<Peak> {
        self.peak.map(|(value, index)| Peak {
            value,
            timestamp: self.timestamps[index],
        })
    }

    /// Rescan the whole window for its peak
    pub fn recompute_peak(&mut self) {
        let mut best: Option<(u32, usize)> = None;
        for (index, value) in self.values.iter().enumerate() {
            if let Some(value) = *value
                && best.is_none_or(|(peak, _)| value > peak)
            {
                best = Some((value, index));
            }
        }
        self.peak = best;
    }

    /// Drop head samples older than `cutoff`, returning how many were removed
    fn cull(&mut self, cutoff: Timestamp) -> usize {
        let mut dropped = 0;
        while let Some(&head) = self.timestamps.front() {
            if head >= cutoff {
                break;
            }
            self.timestamps.pop_front();
            self.values.pop_front();
            dropped += 1;
        }
        dropped
    }

    pub fn timestamps(&self) -> &VecDeque<Timestamp> {
        &self.timestamps
    }

    pub fn values(&self) -> &VecDeque<Option<u32>> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Copy of the retained samples, oldest first
    pub fn points(&self) -> Vec<(Timestamp, Option<u32>)> {
        self.timestamps
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .collect()
    }
}
