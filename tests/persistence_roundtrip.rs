//! Persistence Round-Trip Tests
//!
//! Anomalies produced by the engine, flushed through `StoreFlusher` and
//! reloaded from each backend must come back as the identical ordered
//! sequence.

use aquasense::background::StoreFlusher;
use aquasense::config::{MonitorConfig, StorageBackend, StorageConfig};
use aquasense::engine::AnomalyEngine;
use aquasense::storage::{open_sink, AnomalySink, AnomalyStore, JsonFileSink, PersistenceError};
use aquasense::types::{Parameter, SensorFrame, SensorReading};

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::tempdir;

fn storage_config(dir: &std::path::Path, backend: StorageBackend) -> StorageConfig {
    StorageConfig {
        data_dir: dir.to_path_buf(),
        anomalies_file: match backend {
            StorageBackend::Json => "anomalies.json".to_string(),
            StorageBackend::Sled => "anomalies.sled".to_string(),
        },
        backend,
        ..StorageConfig::default()
    }
}

/// Drive an engine through spikes, a drift and a dropout.
fn produce_anomalies(engine: &AnomalyEngine) {
    let t0 = Utc.with_ymd_and_hms(2025, 2, 2, 10, 0, 0).unwrap();
    for i in 0..10 {
        engine
            .ingest_frame(SensorFrame {
                sensor_id: "pipe-7".to_string(),
                timestamp: t0 + Duration::seconds(i),
                temperature: if i == 4 { 55.0 } else { 22.0 },
                pressure: 3.5,
                flow: 60.0,
            })
            .unwrap();
    }
    engine
        .ingest(SensorReading::new("pipe-9", Parameter::Flow, 2.0, t0))
        .unwrap();
    engine.check_dropouts(t0 + Duration::seconds(600));
}

async fn roundtrip(backend: StorageBackend) {
    let dir = tempdir().unwrap();
    let config = storage_config(dir.path(), backend);

    let store = Arc::new(AnomalyStore::new());
    let engine = AnomalyEngine::new(Arc::new(MonitorConfig::default()), Arc::clone(&store));
    produce_anomalies(&engine);
    let written = engine.snapshot();
    assert!(written.len() >= 4);

    let sink = open_sink(&config).unwrap();
    let flusher = StoreFlusher::new(Arc::clone(&store), Arc::clone(&sink), &config);
    assert_eq!(flusher.flush_now().await.unwrap(), written.len());

    assert_eq!(sink.load().unwrap(), written);
}

#[tokio::test]
async fn json_backend_reconstructs_identical_sequence() {
    roundtrip(StorageBackend::Json).await;
}

#[tokio::test]
async fn sled_backend_reconstructs_identical_sequence() {
    roundtrip(StorageBackend::Sled).await;
}

#[tokio::test]
async fn recovered_history_is_extended_not_rewritten() {
    let dir = tempdir().unwrap();
    let config = storage_config(dir.path(), StorageBackend::Sled);
    let t0 = Utc::now();

    let sink = open_sink(&config).unwrap();

    let first_run = {
        let store = Arc::new(AnomalyStore::new());
        let engine = AnomalyEngine::new(Arc::new(MonitorConfig::default()), Arc::clone(&store));
        engine
            .ingest(SensorReading::new("S1", Parameter::Temperature, 90.0, t0))
            .unwrap();
        StoreFlusher::new(Arc::clone(&store), Arc::clone(&sink), &config)
            .flush_now()
            .await
            .unwrap();
        store.snapshot()
    };

    // second "run" recovers from the same backend
    let store = Arc::new(AnomalyStore::with_history(sink.load().unwrap()));
    assert!(!store.is_dirty());
    let engine = AnomalyEngine::new(Arc::new(MonitorConfig::default()), Arc::clone(&store));
    engine
        .ingest(SensorReading::new("S2", Parameter::Pressure, 0.1, t0))
        .unwrap();
    StoreFlusher::new(Arc::clone(&store), sink.clone(), &config)
        .flush_now()
        .await
        .unwrap();

    let all = sink.load().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0], first_run[0]);
    assert_eq!(all[1].sensor_id, "S2");
}

#[tokio::test]
async fn json_log_survives_reopen() {
    let dir = tempdir().unwrap();
    let config = storage_config(dir.path(), StorageBackend::Json);
    let store = Arc::new(AnomalyStore::new());
    let engine = AnomalyEngine::new(Arc::new(MonitorConfig::default()), Arc::clone(&store));
    produce_anomalies(&engine);

    StoreFlusher::new(Arc::clone(&store), open_sink(&config).unwrap(), &config)
        .flush_now()
        .await
        .unwrap();

    let reopened = JsonFileSink::new(config.anomalies_path());
    assert_eq!(reopened.load().unwrap(), engine.snapshot());
}

#[test]
fn json_file_is_readable_without_the_engine() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("anomalies.json");
    let sink = JsonFileSink::new(&path);
    let t0 = Utc.with_ymd_and_hms(2025, 2, 2, 10, 0, 0).unwrap();
    sink.persist(&[aquasense::Anomaly::drift("S1", Parameter::Flow, 120.0, t0, 7, 8)])
        .unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let record = &raw[0];
    assert_eq!(record["type"], "drift");
    assert_eq!(record["sensor_id"], "S1");
    assert_eq!(record["parameter"], "flow");
    assert_eq!(record["value"], 120.0);
    assert_eq!(record["duration_seconds"], 7);
    assert!(record["timestamp"].as_str().unwrap().starts_with("2025-02-02T10:00:00"));
    assert!(record["message"].is_string());
}

#[test]
fn corrupt_json_file_is_reported_as_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("anomalies.json");
    std::fs::write(&path, "{ definitely not an array").unwrap();
    assert!(matches!(
        JsonFileSink::new(&path).load(),
        Err(PersistenceError::Corrupt { .. })
    ));
}
