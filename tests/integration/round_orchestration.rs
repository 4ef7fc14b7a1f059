//! Integration tests for polling rounds
//!
//! These tests verify that:
//! - A slow or failing probe never blocks the round or the other services
//! - Every service in a round shares one timestamp
//! - Overlapping rounds are rejected, not queued
//! - Only retained rounds reach the rolling histories
//! - Raw samples are persisted without holding up the broadcast

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use occupancy_monitor::config::Config;
use occupancy_monitor::{RoundSettings, RoundStatus};
use occupancy_monitor::probe::ProbeError;
use occupancy_monitor::records::RecordTracker;
use occupancy_monitor::service::{ProtocolVariant, Record, Service};
use occupancy_monitor::storage::{MemoryStore, SampleRow, SampleStore};
use pretty_assertions::assert_eq;

use crate::helpers::{
    FailingProbe, FailingStore, FixedProbe, GRAPH_DURATION_MS, HangingProbe, eventually, orchestrator, service,
    settings,
};

#[tokio::test]
async fn test_timeout_does_not_block_round() {
    let (orchestrator, broadcaster) = orchestrator(
        vec![
            service(0, "stuck", Arc::new(HangingProbe)),
            service(1, "healthy", FixedProbe::new(7)),
        ],
        settings(50, false),
        None,
    );

    let status = tokio::time::timeout(Duration::from_secs(2), orchestrator.run_round())
        .await
        .expect("round must settle after the probe timeout");

    let update = assert_matches!(status, RoundStatus::Completed(update) => update);
    assert_eq!(update.updates.len(), 2);

    let stuck = &update.updates[0];
    assert!(!stuck.online);
    assert_eq!(stuck.value, None);
    assert_eq!(stuck.error.as_deref(), Some("probe timed out after 50ms"));

    let healthy = &update.updates[1];
    assert!(healthy.online);
    assert_eq!(healthy.value, Some(7));
    assert_eq!(healthy.error, None);

    assert_eq!(broadcaster.count(), 1);
}

#[tokio::test]
async fn test_services_share_round_timestamp() {
    let (orchestrator, _broadcaster) = orchestrator(
        vec![
            service(0, "a", FixedProbe::new(1)),
            service(1, "b", Arc::new(FailingProbe(ProbeError::Status(500)))),
            service(2, "c", FixedProbe::slow(3, Duration::from_millis(30))),
        ],
        settings(500, false),
        None,
    );

    orchestrator.run_round().await;

    let snapshot = orchestrator.snapshot().await;
    assert_eq!(snapshot.len(), 3);

    let first = &snapshot[0].timestamps;
    assert_eq!(first.len(), 1);
    for service in &snapshot {
        assert_eq!(&service.timestamps, first, "{} diverged", service.name);
    }
    assert_eq!(snapshot[1].values, vec![None]);
}

#[tokio::test]
async fn test_overlapping_round_is_skipped() {
    let probe = FixedProbe::slow(5, Duration::from_millis(200));
    let (orchestrator, broadcaster) = orchestrator(vec![service(0, "slow", probe.clone())], settings(1_000, false), None);

    let first = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run_round().await }
    });

    assert!(eventually(|| async { orchestrator.is_round_in_flight() }).await);
    assert_eq!(orchestrator.run_round().await, RoundStatus::Skipped);

    assert_matches!(first.await.unwrap(), RoundStatus::Completed(_));
    assert!(!orchestrator.is_round_in_flight());

    // the skipped round never probed
    assert_eq!(probe.calls(), 1);
    assert_eq!(broadcaster.count(), 1);
}

#[tokio::test]
async fn test_filler_round_skips_history() {
    let (orchestrator, broadcaster) = orchestrator(vec![service(0, "a", FixedProbe::new(9))], settings(500, false), None);

    // retain interval is one second, so the second round is filler
    orchestrator.run_round().await;
    orchestrator.run_round().await;

    let updates = broadcaster.updates();
    assert_eq!(updates.len(), 2);
    assert!(updates[0].update_history_graph);
    assert!(!updates[1].update_history_graph);
    assert!(updates[1].updates[0].graph_peak.is_none());

    let snapshot = orchestrator.snapshot().await;
    assert_eq!(snapshot[0].timestamps.len(), 1);
    assert_eq!(snapshot[0].last_result.as_ref().and_then(|r| r.value), Some(9));
}

#[tokio::test]
async fn test_first_retained_round_reports_graph_peak() {
    let (orchestrator, _broadcaster) = orchestrator(vec![service(0, "a", FixedProbe::new(9))], settings(500, false), None);

    let update = assert_matches!(orchestrator.run_round().await, RoundStatus::Completed(update) => update);
    let peak = update.updates[0].graph_peak.expect("first point is the peak");
    assert_eq!(peak.value, 9);
}

#[tokio::test]
async fn test_raw_samples_are_persisted() {
    let store = Arc::new(MemoryStore::new());
    let (orchestrator, _broadcaster) = orchestrator(
        vec![
            service(0, "negative", FixedProbe::new(-5)),
            service(1, "down", Arc::new(FailingProbe(ProbeError::Request("refused".to_string())))),
        ],
        settings(500, true),
        Some(store.clone() as Arc<dyn SampleStore>),
    );

    let update = assert_matches!(orchestrator.run_round().await, RoundStatus::Completed(update) => update);
    // sanitized for consumers
    assert_eq!(update.updates[0].value, Some(0));

    assert!(eventually(|| async { store.len().await == 2 }).await);

    let mut samples = store.samples().await;
    samples.sort_by(|a, b| a.service.cmp(&b.service));
    let timestamp = samples[0].timestamp;
    assert_eq!(
        samples,
        vec![
            SampleRow::new("down", timestamp, None),
            SampleRow::new("negative", timestamp, Some(-5)),
        ]
    );
    assert_eq!(timestamp.div_euclid(1000), update.timestamp);
}

#[tokio::test]
async fn test_nothing_persisted_without_log_to_database() {
    let store = Arc::new(MemoryStore::new());
    let (orchestrator, _broadcaster) = orchestrator(
        vec![service(0, "a", FixedProbe::new(1))],
        settings(500, false),
        Some(store.clone() as Arc<dyn SampleStore>),
    );

    orchestrator.run_round().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_none_backend_keeps_no_samples() {
    let config = Config::from_json(
        r#"{
            "servers": [{ "name": "a", "address": "http://a/status" }],
            "log_to_database": true,
            "storage": { "backend": "none" }
        }"#,
    )
    .unwrap();
    let store = Arc::new(MemoryStore::new());
    let (orchestrator, _broadcaster) = orchestrator(
        vec![service(0, "a", FixedProbe::new(1))],
        RoundSettings::from_config(&config),
        Some(store.clone() as Arc<dyn SampleStore>),
    );

    for _ in 0..3 {
        orchestrator.run_round().await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_store_failure_does_not_stop_broadcast() {
    let (orchestrator, broadcaster) = orchestrator(
        vec![service(0, "a", FixedProbe::new(1))],
        settings(500, true),
        Some(Arc::new(FailingStore)),
    );

    assert_matches!(orchestrator.run_round().await, RoundStatus::Completed(_));
    assert_matches!(orchestrator.run_round().await, RoundStatus::Completed(_));
    assert_eq!(broadcaster.count(), 2);
}

#[tokio::test]
async fn test_protocol_variants_cycle_per_round() {
    let probe = FixedProbe::new(1);
    let variants = vec![
        ProtocolVariant {
            protocol_id: 47,
            label: None,
        },
        ProtocolVariant {
            protocol_id: 340,
            label: Some("1.12".to_string()),
        },
    ];
    let service = Service::new(0, "cycled", "http://cycled", variants, probe.clone(), GRAPH_DURATION_MS);
    let (orchestrator, _broadcaster) = orchestrator(vec![service], settings(500, false), None);

    for _ in 0..3 {
        orchestrator.run_round().await;
    }

    assert_eq!(probe.seen_variants(), vec![47, 340, 47]);
    let snapshot = orchestrator.snapshot().await;
    let last = snapshot[0].last_result.as_ref().unwrap();
    assert_eq!(last.protocol_variant.protocol_id, 47);
}

#[tokio::test]
async fn test_live_value_raises_hydrated_record() {
    let store = Arc::new(MemoryStore::with_samples(vec![SampleRow::new("a", 1_000, Some(10))]));
    let (orchestrator, _broadcaster) = orchestrator(
        vec![service(0, "a", FixedProbe::new(12)), service(1, "b", FixedProbe::new(99))],
        settings(500, false),
        None,
    );

    orchestrator
        .hydrate_records(&RecordTracker::new(store))
        .await
        .unwrap();

    let update = assert_matches!(orchestrator.run_round().await, RoundStatus::Completed(update) => update);

    let raised = update.updates[0].record.expect("record beaten");
    assert_eq!(raised.value, 12);
    assert_eq!(raised.timestamp, update.timestamp);

    // never sampled, so there is no record to raise
    assert_eq!(update.updates[1].record, None);
    let snapshot = orchestrator.snapshot().await;
    assert_eq!(snapshot[1].record, None::<Record>);
}
