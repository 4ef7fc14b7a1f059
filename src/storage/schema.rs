//! Rows exchanged with sample stores
//!
//! A sample is one service's raw reading from one round. All samples written
//! for the same round carry the same timestamp, which is what lets graph
//! windows of different services line up when they are loaded back.

use serde::{Deserialize, Serialize};

use crate::history::Timestamp;

/// A single persisted sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRow {
    /// Round timestamp (Unix milliseconds)
    pub timestamp: Timestamp,

    /// Service identity (its configured name)
    pub service: String,

    /// Raw, unsanitized occupancy; `None` for a failed probe
    pub value: Option<i64>,
}

impl SampleRow {
    pub fn new(service: impl Into<String>, timestamp: Timestamp, value: Option<i64>) -> Self {
        Self {
            timestamp,
            service: service.into(),
            value,
        }
    }
}

/// Highest value stored for a service and when it was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRow {
    pub value: i64,

    /// Unix milliseconds
    pub timestamp: Timestamp,
}
