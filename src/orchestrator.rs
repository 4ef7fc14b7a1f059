//! RoundOrchestrator - probes the whole roster once per round
//!
//! ## Round Flow
//!
//! ```text
//! guard → clock tick → probe every service concurrently → barrier
//!       → per service: persist raw sample (detached) + sanitize + update state
//!       → one consolidated UpdateServers broadcast
//! ```
//!
//! ## Invariants
//!
//! 1. **One round in flight** - an atomic flag is taken before the clock is
//!    ticked and released when the round is done; overlapping calls are
//!    rejected, not queued
//! 2. **Shared timestamp** - every service in a round sees the same tick
//! 3. **Partial failure** - a failed or timed-out probe only marks its own
//!    service offline; the barrier always completes
//! 4. **All-or-nothing broadcast** - the update is sent once, after every
//!    service has been updated

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::broadcast::Broadcaster;
use crate::clock::{RoundClock, RoundTick};
use crate::config::Config;
use crate::history::{Peak, Timestamp};
use crate::hydrate::GraphWindow;
use crate::messages::{Message, RoundUpdate};
use crate::probe::{ProbeError, ProbeResponse, ProbeResult};
use crate::records::RecordTracker;
use crate::service::{LastResult, ProtocolVariant, Record, Service, ServiceId, to_seconds};
use crate::storage::{SampleRow, SampleStore, StorageResult};

/// Round behaviour taken from the configuration
#[derive(Debug, Clone)]
pub struct RoundSettings {
    pub probe_timeout: Duration,

    /// Persist each round's raw samples
    pub log_to_database: bool,

    /// Log failed probes at error level (debug otherwise)
    pub log_failed_pings: bool,
}

impl RoundSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            probe_timeout: config.probe_timeout(),
            log_to_database: config.persists_samples(),
            log_failed_pings: config.log_failed_pings,
        }
    }
}

/// Settled probe for one service in one round
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub variant: ProtocolVariant,
    pub result: ProbeResult<ProbeResponse>,
}

/// Every service's outcome for one round, keyed by service id
#[derive(Debug)]
pub struct RoundResult {
    pub tick: RoundTick,
    pub entries: BTreeMap<ServiceId, ProbeOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoundStatus {
    /// Round ran to completion and this update was broadcast
    Completed(RoundUpdate),

    /// Another round was still in flight
    Skipped,
}

/// Current state of one service, for consumers joining mid-stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSnapshot {
    pub id: ServiceId,
    pub name: String,
    pub last_result: Option<LastResult>,
    pub record: Option<Record>,
    pub graph_peak: Option<Peak>,
    pub favicon: Option<String>,
    pub timestamps: Vec<Timestamp>,
    pub values: Vec<Option<u32>>,
}

/// Holds the in-flight flag for the lifetime of a round
///
/// Released on drop, so a cancelled or panicking round cannot wedge the
/// scheduler.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct RoundOrchestrator {
    services: RwLock<Vec<Service>>,
    clock: Mutex<RoundClock>,
    settings: RoundSettings,
    broadcaster: Arc<dyn Broadcaster>,

    /// Where raw samples go when `log_to_database` is set
    store: Option<Arc<dyn SampleStore>>,

    in_flight: AtomicBool,
}

impl RoundOrchestrator {
    pub fn new(
        services: Vec<Service>,
        clock: RoundClock,
        settings: RoundSettings,
        broadcaster: Arc<dyn Broadcaster>,
        store: Option<Arc<dyn SampleStore>>,
    ) -> Self {
        if settings.log_to_database && store.is_none() {
            warn!("log_to_database is enabled but no sample store was provided");
        }

        Self {
            services: RwLock::new(services),
            clock: Mutex::new(clock),
            settings,
            broadcaster,
            store,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one round across the whole roster
    ///
    /// Returns [`RoundStatus::Skipped`] immediately if another round has not
    /// settled yet.
    #[instrument(skip(self))]
    pub async fn run_round(&self) -> RoundStatus {
        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight) else {
            warn!(
                "started a new round before the last one finished; \
                 you may need to increase rates.ping_all_ms"
            );
            return RoundStatus::Skipped;
        };

        let tick = self.clock.lock().await.tick();
        trace!("round at {} (retain: {})", tick.timestamp, tick.retain);

        let result = self.probe_all(tick).await;
        let update = self.complete_round(result).await;

        self.broadcaster
            .broadcast(Message::UpdateServers(update.clone()));

        RoundStatus::Completed(update)
    }

    /// Probe every service concurrently and wait for all of them to settle
    async fn probe_all(&self, tick: RoundTick) -> RoundResult {
        let jobs: Vec<_> = {
            let mut services = self.services.write().await;
            services
                .iter_mut()
                .map(|service| {
                    let variant = service.next_protocol_variant();
                    (service.id, service.target(), service.probe(), variant)
                })
                .collect()
        };

        let timeout = self.settings.probe_timeout;
        let log_failed_pings = self.settings.log_failed_pings;

        let probes = jobs.into_iter().map(|(id, target, probe, variant)| async move {
            let result = match tokio::time::timeout(timeout, probe.probe(&target, &variant, timeout)).await {
                Ok(result) => result,
                Err(_) => Err(ProbeError::Timeout(timeout)),
            };

            if let Err(e) = &result {
                if log_failed_pings {
                    error!("failed to probe {} ({}): {}", target.name, target.address, e);
                } else {
                    debug!("failed to probe {} ({}): {}", target.name, target.address, e);
                }
            }

            (id, ProbeOutcome { variant, result })
        });

        RoundResult {
            tick,
            entries: join_all(probes).await.into_iter().collect(),
        }
    }

    /// Apply a settled round to every service and build the update
    async fn complete_round(&self, mut result: RoundResult) -> RoundUpdate {
        let tick = result.tick;
        let mut samples = Vec::new();
        let mut updates = Vec::with_capacity(result.entries.len());

        {
            let mut services = self.services.write().await;
            for service in services.iter_mut() {
                let Some(outcome) = result.entries.remove(&service.id) else {
                    warn!("no probe outcome for {} in this round", service.name);
                    continue;
                };

                if self.settings.log_to_database {
                    let raw = outcome.result.as_ref().ok().and_then(|r| r.value);
                    samples.push(SampleRow::new(service.name.clone(), tick.timestamp, raw));
                }

                updates.push(service.apply_round(tick, &outcome));
            }
        }

        self.persist(samples);

        RoundUpdate {
            timestamp: to_seconds(tick.timestamp),
            update_history_graph: tick.retain,
            updates,
        }
    }

    /// Write samples from a detached task; failures are only logged
    fn persist(&self, samples: Vec<SampleRow>) {
        if samples.is_empty() {
            return;
        }
        let Some(store) = self.store.clone() else {
            return;
        };

        tokio::spawn(async move {
            let count = samples.len();
            match store.insert_batch(samples).await {
                Ok(()) => trace!("persisted {count} samples"),
                Err(e) => error!("failed to persist {count} samples: {e}"),
            }
        });
    }

    /// Hydrate the rolling graphs from the last graph window of samples
    ///
    /// The store is read with no lock held; rounds and snapshots only wait
    /// for the in-memory load.
    pub async fn load_graph_points(&self, store: &dyn SampleStore, now: Timestamp) -> StorageResult<usize> {
        let graph_duration_ms = self
            .services
            .read()
            .await
            .first()
            .map(|service| service.history.window_ms())
            .unwrap_or_default();

        let window = GraphWindow::query(store, graph_duration_ms, now).await?;

        let mut services = self.services.write().await;
        let mut clock = self.clock.lock().await;
        Ok(window.apply(&mut services, &mut clock))
    }

    /// (Re)load every service's record from the store
    ///
    /// Lookups run with no lock held, so a slow store never stalls rounds.
    pub async fn hydrate_records(&self, tracker: &RecordTracker) -> StorageResult<()> {
        let names: Vec<String> = {
            let mut services = self.services.write().await;
            services
                .iter_mut()
                .map(|service| {
                    service.history.recompute_peak();
                    service.name.clone()
                })
                .collect()
        };

        let records = tracker.fetch(&names).await?;

        let mut services = self.services.write().await;
        RecordTracker::apply(&mut services, records);
        info!("records ready for {} services", services.len());
        Ok(())
    }

    pub async fn snapshot(&self) -> Vec<ServiceSnapshot> {
        self.services
            .read()
            .await
            .iter()
            .map(|service| ServiceSnapshot {
                id: service.id,
                name: service.name.clone(),
                last_result: service.last_result.clone(),
                record: service.record,
                graph_peak: service.history.find_peak(),
                favicon: service.favicon.clone(),
                timestamps: service.history.timestamps().iter().copied().collect(),
                values: service.history.values().iter().copied().collect(),
            })
            .collect()
    }

    pub fn is_round_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}
