//! In-memory sample store (no persistence)
//!
//! This store keeps every sample in a vector behind a lock.
//! It's useful for:
//! - Testing without database dependencies
//! - Running without storage configured (records simply start empty)
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Unbounded**: Nothing is ever evicted; not meant for long-running hubs
//!   with `log_to_database` enabled

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, QueryRange, SampleStore};
use super::error::StorageResult;
use super::schema::{RecordRow, SampleRow};

#[derive(Debug, Default)]
pub struct MemoryStore {
    samples: RwLock<Vec<SampleRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with samples
    pub fn with_samples(samples: Vec<SampleRow>) -> Self {
        Self {
            samples: RwLock::new(samples),
        }
    }

    pub async fn len(&self) -> usize {
        self.samples.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.samples.read().await.is_empty()
    }

    /// Copy of every stored sample, in insertion order
    pub async fn samples(&self) -> Vec<SampleRow> {
        self.samples.read().await.clone()
    }
}

#[async_trait]
impl SampleStore for MemoryStore {
    async fn insert_batch(&self, samples: Vec<SampleRow>) -> StorageResult<()> {
        debug!("in-memory store: inserting {} samples", samples.len());
        self.samples.write().await.extend(samples);
        Ok(())
    }

    async fn query_max_value(&self, service: &str) -> StorageResult<Option<RecordRow>> {
        let samples = self.samples.read().await;

        let record = samples
            .iter()
            .filter(|s| s.service == service)
            .filter_map(|s| {
                s.value.map(|value| RecordRow {
                    value,
                    timestamp: s.timestamp,
                })
            })
            .fold(None, |best: Option<RecordRow>, row| match best {
                Some(b) if b.value > row.value => Some(b),
                Some(b) if b.value == row.value && b.timestamp <= row.timestamp => Some(b),
                _ => Some(row),
            });

        Ok(record)
    }

    async fn query_range(&self, query: QueryRange) -> StorageResult<Vec<SampleRow>> {
        debug!("querying in-memory store from {} to {}", query.start, query.end);

        let mut rows: Vec<SampleRow> = self
            .samples
            .read()
            .await
            .iter()
            .filter(|s| query.service.as_ref().is_none_or(|name| &s.service == name))
            .filter(|s| s.timestamp >= query.start && s.timestamp <= query.end)
            .cloned()
            .collect();

        rows.sort_by_key(|s| s.timestamp);
        Ok(rows)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory store operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("total_samples".to_string(), self.len().await.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory store (no-op)");
        Ok(())
    }
}
