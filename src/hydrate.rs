//! Startup hydration of the rolling graphs from persisted samples
//!
//! Every round is persisted, retained or not, so the stored timeline is denser
//! than the graphs. Loading thins it with the same spacing rule the
//! [`RoundClock`] applies live, deciding once per timestamp so that every
//! service keeps the same points.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, instrument};

use crate::clock::RoundClock;
use crate::history::Timestamp;
use crate::sanitize::Sanitized;
use crate::service::Service;
use crate::storage::{QueryRange, SampleRow, SampleStore, StorageResult};

/// Per-service columns collected from the store
#[derive(Default)]
struct GraphColumns {
    timestamps: Vec<Timestamp>,
    values: Vec<Option<u32>>,
}

/// Samples of the last graph window, read but not yet applied
#[derive(Debug)]
pub struct GraphWindow {
    start: Timestamp,
    rows: Vec<SampleRow>,
}

impl GraphWindow {
    /// Read every sample in `[now - graph_duration_ms, now]`
    #[instrument(skip(store))]
    pub async fn query(store: &dyn SampleStore, graph_duration_ms: i64, now: Timestamp) -> StorageResult<Self> {
        let start = now - graph_duration_ms;
        let rows = store.query_range(QueryRange::all(start, now)).await?;
        debug!("read {} stored samples for the graph window", rows.len());
        Ok(Self { start, rows })
    }

    /// Load the window into each service's history and advance the clock
    ///
    /// Returns the number of points loaded across all services.
    pub fn apply(self, services: &mut [Service], clock: &mut RoundClock) -> usize {
        let kept = thin_timestamps(
            self.rows.iter().map(|row| row.timestamp),
            clock.retain_interval_ms(),
        );

        let mut columns: HashMap<String, GraphColumns> = HashMap::new();
        for row in self.rows.into_iter().filter(|row| kept.contains(&row.timestamp)) {
            let entry = columns.entry(row.service).or_default();
            entry.timestamps.push(row.timestamp);
            // stored values are raw; clamp quietly, they were reported when live
            entry
                .values
                .push(row.value.map(|v| Sanitized::classify(v).value()));
        }

        let mut loaded = 0;
        for service in services.iter_mut() {
            let Some(graph) = columns.remove(&service.name) else {
                continue;
            };
            service
                .history
                .load_bulk(self.start, &graph.timestamps, &graph.values);
            loaded += service.history.len();
        }

        for name in columns.keys() {
            debug!("ignoring stored samples for unknown service {name}");
        }

        if let Some(&last) = kept.last() {
            clock.observe_retained(last);
        }

        info!("loaded {loaded} graph points from the sample store");
        loaded
    }
}

/// Distinct timestamps spaced at least `interval_ms` apart, oldest first
fn thin_timestamps(timestamps: impl Iterator<Item = Timestamp>, interval_ms: i64) -> BTreeSet<Timestamp> {
    let distinct: BTreeSet<Timestamp> = timestamps.collect();

    let mut kept = BTreeSet::new();
    let mut last_kept: Option<Timestamp> = None;
    for timestamp in distinct {
        if last_kept.is_none_or(|last| timestamp - last >= interval_ms) {
            kept.insert(timestamp);
            last_kept = Some(timestamp);
        }
    }
    kept
}
