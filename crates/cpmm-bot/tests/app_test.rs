//! Application integration tests.
//!
//! Drives the daemon against a snapshot file in a temp directory.

use cpmm_bot::{AppConfig, Application};
use cpmm_core::{Contract, MarketId, Mechanism, Pool};
use cpmm_drizzle::DrizzleConfig;
use cpmm_store::{MarketRecord, PoolRecord, Snapshot};
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;

fn write_snapshot(path: &Path) {
    let snapshot = Snapshot {
        markets: vec![MarketRecord {
            contract: Contract {
                id: MarketId::new("m1"),
                slug: "will-it-rain".to_string(),
                mechanism: Mechanism::Cpmm,
                should_answers_sum_to_one: false,
                unique_bettor_count: 3,
            },
            state: PoolRecord {
                pool: Pool::new(40.0, 60.0),
                p: 0.5,
                subsidy_pool: 250.0,
            },
        }],
        answers: vec![],
    };
    std::fs::write(path, serde_json::to_string_pretty(&snapshot).unwrap()).unwrap();
}

fn config_for(path: &Path, read_only: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.drizzle = DrizzleConfig {
        seed: Some(9),
        ..Default::default()
    };
    config.store.snapshot_path = path.to_path_buf();
    config.store.read_only = read_only;
    config
}

#[tokio::test]
async fn test_run_once_persists_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("markets.json");
    write_snapshot(&path);

    let app = Application::new(config_for(&path, false)).unwrap();
    let report = app.run_once().await.unwrap();
    assert_eq!(report.applied, 1);

    let saved = Snapshot::load(&path).unwrap();
    let state = &saved.markets[0].state;
    assert!(state.subsidy_pool < 250.0);
    assert!(((250.0 - state.subsidy_pool) - report.total_amount).abs() < 1e-9);
    assert!((state.pool.total() - 100.0 - report.total_amount).abs() < 1e-9);
}

#[tokio::test]
async fn test_read_only_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("markets.json");
    write_snapshot(&path);
    let before = std::fs::read_to_string(&path).unwrap();

    let app = Application::new(config_for(&path, true)).unwrap();
    let report = app.run_once().await.unwrap();
    assert_eq!(report.applied, 1);

    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    // In-memory state still moved
    let record = app.store().market(&MarketId::new("m1")).unwrap();
    assert!(record.state.subsidy_pool < 250.0);
}

#[tokio::test]
async fn test_missing_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");

    let app = Application::new(config_for(&path, false)).unwrap();
    let report = app.run_once().await.unwrap();

    assert_eq!(report.markets_found, 0);
    // Empty snapshot written on first save
    assert_eq!(Snapshot::load(&path).unwrap(), Snapshot::default());
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("markets.json");
    write_snapshot(&path);

    let app = Application::new(config_for(&path, false)).unwrap();
    app.shutdown_token().cancel();

    let finished = timeout(Duration::from_secs(2), app.run()).await;
    assert!(finished.is_ok(), "Should stop promptly once cancelled");
    assert!(finished.unwrap().is_ok());
}
