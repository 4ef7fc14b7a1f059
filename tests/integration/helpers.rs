//! Helper probes, stores and broadcasters for integration tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use occupancy_monitor::broadcast::Broadcaster;
use occupancy_monitor::clock::RoundClock;
use occupancy_monitor::history::Timestamp;
use occupancy_monitor::messages::{Message, RoundUpdate};
use occupancy_monitor::probe::{Probe, ProbeError, ProbeResponse, ProbeResult, ProbeTarget};
use occupancy_monitor::service::{ProtocolVariant, Service};
use occupancy_monitor::storage::{
    HealthStatus, MemoryStore, QueryRange, RecordRow, SampleRow, SampleStore, StorageError, StorageResult,
};
use occupancy_monitor::{RoundOrchestrator, RoundSettings};

pub const GRAPH_DURATION_MS: i64 = 60_000;

/// Answers with a fixed occupancy after an optional delay
pub struct FixedProbe {
    pub value: Option<i64>,
    pub delay: Duration,
    pub calls: AtomicUsize,
    pub variants: Mutex<Vec<i32>>,
}

impl FixedProbe {
    pub fn new(value: i64) -> Arc<Self> {
        Self::slow(value, Duration::ZERO)
    }

    pub fn slow(value: i64, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            value: Some(value),
            delay,
            calls: AtomicUsize::new(0),
            variants: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_variants(&self) -> Vec<i32> {
        self.variants.lock().unwrap().clone()
    }
}

#[async_trait]
impl Probe for FixedProbe {
    async fn probe(
        &self,
        _target: &ProbeTarget,
        variant: &ProtocolVariant,
        _timeout: Duration,
    ) -> ProbeResult<ProbeResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.variants.lock().unwrap().push(variant.protocol_id);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(ProbeResponse {
            value: self.value,
            favicon: None,
        })
    }
}

/// Never settles on its own; only the round timeout ends it
pub struct HangingProbe;

#[async_trait]
impl Probe for HangingProbe {
    async fn probe(
        &self,
        _target: &ProbeTarget,
        _variant: &ProtocolVariant,
        _timeout: Duration,
    ) -> ProbeResult<ProbeResponse> {
        std::future::pending().await
    }
}

/// Fails immediately with the given error
pub struct FailingProbe(pub ProbeError);

#[async_trait]
impl Probe for FailingProbe {
    async fn probe(
        &self,
        _target: &ProbeTarget,
        _variant: &ProtocolVariant,
        _timeout: Duration,
    ) -> ProbeResult<ProbeResponse> {
        Err(self.0.clone())
    }
}

/// Store whose every operation fails
pub struct FailingStore;

#[async_trait]
impl SampleStore for FailingStore {
    async fn insert_batch(&self, _samples: Vec<SampleRow>) -> StorageResult<()> {
        Err(StorageError::QueryFailed("disk on fire".to_string()))
    }

    async fn query_max_value(&self, _service: &str) -> StorageResult<Option<RecordRow>> {
        Err(StorageError::QueryFailed("disk on fire".to_string()))
    }

    async fn query_range(&self, _query: QueryRange) -> StorageResult<Vec<SampleRow>> {
        Err(StorageError::QueryFailed("disk on fire".to_string()))
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: false,
            message: "disk on fire".to_string(),
            metadata: HashMap::new(),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// In-memory store whose lookups take `delay`
pub struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(samples: Vec<SampleRow>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::with_samples(samples),
            delay,
        })
    }
}

#[async_trait]
impl SampleStore for SlowStore {
    async fn insert_batch(&self, samples: Vec<SampleRow>) -> StorageResult<()> {
        self.inner.insert_batch(samples).await
    }

    async fn query_max_value(&self, service: &str) -> StorageResult<Option<RecordRow>> {
        tokio::time::sleep(self.delay).await;
        self.inner.query_max_value(service).await
    }

    async fn query_range(&self, query: QueryRange) -> StorageResult<Vec<SampleRow>> {
        tokio::time::sleep(self.delay).await;
        self.inner.query_range(query).await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        self.inner.health_check().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}

/// Keeps every broadcast message
#[derive(Default)]
pub struct RecordingBroadcaster {
    messages: Mutex<Vec<Message>>,
}

impl RecordingBroadcaster {
    pub fn updates(&self) -> Vec<RoundUpdate> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|Message::UpdateServers(update)| update.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }
}

pub fn settings(timeout_ms: u64, log_to_database: bool) -> RoundSettings {
    RoundSettings {
        probe_timeout: Duration::from_millis(timeout_ms),
        log_to_database,
        log_failed_pings: true,
    }
}

pub fn service(id: usize, name: &str, probe: Arc<dyn Probe>) -> Service {
    Service::new(id, name, format!("http://{name}"), vec![], probe, GRAPH_DURATION_MS)
}

/// One retained point per second over the graph window
pub fn clock() -> RoundClock {
    RoundClock::new(GRAPH_DURATION_MS, 60)
}

pub fn orchestrator(
    services: Vec<Service>,
    settings: RoundSettings,
    store: Option<Arc<dyn SampleStore>>,
) -> (Arc<RoundOrchestrator>, Arc<RecordingBroadcaster>) {
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let orchestrator = RoundOrchestrator::new(services, clock(), settings, broadcaster.clone(), store);
    (Arc::new(orchestrator), broadcaster)
}

pub fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

/// Wait until `condition` holds or give up after a second
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
