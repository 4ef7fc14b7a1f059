//! All-time occupancy records
//!
//! Records come from the sample store, not from the in-memory graph window:
//! the store knows about peaks long gone from the window. They are loaded
//! once before the first round and afterwards only raised, never created,
//! by live samples.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, instrument};

use crate::history::Timestamp;
use crate::sanitize::sanitize;
use crate::service::{Record, Service, to_seconds};
use crate::storage::{SampleStore, StorageResult};

pub struct RecordTracker {
    store: Arc<dyn SampleStore>,
}

impl RecordTracker {
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self { store }
    }

    /// Look up the stored record of every named service
    ///
    /// All lookups run concurrently; the first store error is returned and
    /// should abort startup. Services without any stored value are absent
    /// from the result.
    #[instrument(skip_all, fields(services = names.len()))]
    pub async fn fetch(&self, names: &[String]) -> StorageResult<HashMap<String, Record>> {
        let rows = try_join_all(names.iter().map(|name| self.store.query_max_value(name))).await?;

        let mut records = HashMap::with_capacity(names.len());
        for (name, row) in names.iter().zip(rows) {
            match row {
                Some(row) => {
                    let record = Record {
                        value: sanitize(name, row.value),
                        timestamp: to_seconds(row.timestamp),
                    };
                    records.insert(name.clone(), record);
                }
                None => debug!("{name} has no stored samples, leaving record empty"),
            }
        }

        info!("loaded records for {}/{} services", records.len(), names.len());
        Ok(records)
    }

    /// Install fetched records; services missing from `records` keep theirs
    pub fn apply(services: &mut [Service], mut records: HashMap<String, Record>) {
        for service in services.iter_mut() {
            if let Some(record) = records.remove(&service.name) {
                service.record = Some(record);
            }
        }
    }

    /// Raise an existing record if `value` beats it
    ///
    /// Returns the new record when it changed. A service without a record is
    /// left alone until the next [`fetch`](Self::fetch).
    pub fn maybe_update(record: &mut Option<Record>, value: u32, timestamp: Timestamp) -> Option<Record> {
        match record {
            Some(current) if value > current.value => {
                *current = Record {
                    value,
                    timestamp: to_seconds(timestamp),
                };
                Some(*current)
            }
            _ => None,
        }
    }
}
