//! Sample store trait definition
//!
//! This module defines the `SampleStore` trait that all store
//! implementations must implement.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::{RecordRow, SampleRow};
use crate::history::Timestamp;

/// Query parameters for fetching samples within a time range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRange {
    /// Restrict to one service; `None` returns samples of every service
    pub service: Option<String>,

    /// Start of time range (inclusive, Unix milliseconds)
    pub start: Timestamp,

    /// End of time range (inclusive, Unix milliseconds)
    pub end: Timestamp,
}

impl QueryRange {
    /// Every service's samples between `start` and `end`
    pub fn all(start: Timestamp, end: Timestamp) -> Self {
        Self {
            service: None,
            start,
            end,
        }
    }
}

/// Health status of the store
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the store operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for sample stores
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: the orchestrator writes from
/// detached tasks while startup hydration reads concurrently.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>`. "No data" is never an error; it is
/// reported as `None` or an empty vector.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Insert a batch of samples
    ///
    /// A round's samples are written together; implementations should make
    /// the batch atomic.
    async fn insert_batch(&self, samples: Vec<SampleRow>) -> StorageResult<()>;

    /// Insert a single sample
    async fn insert_sample(&self, service: &str, timestamp: Timestamp, value: Option<i64>) -> StorageResult<()> {
        self.insert_batch(vec![SampleRow::new(service, timestamp, value)])
            .await
    }

    /// Highest non-null value ever stored for a service
    ///
    /// When the maximum was reached more than once, the earliest sample wins.
    /// Returns `None` if the service has no non-null samples.
    async fn query_max_value(&self, service: &str) -> StorageResult<Option<RecordRow>>;

    /// Samples within a time range, ordered by timestamp (oldest first)
    async fn query_range(&self, query: QueryRange) -> StorageResult<Vec<SampleRow>>;

    /// Check store health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the store and release resources
    async fn close(&self) -> StorageResult<()>;
}
