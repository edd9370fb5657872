//! End-to-end nightly runs through the public library API.

use std::sync::Arc;

use satwatch::collaborators::{Collaborators, SilentVoice};
use satwatch::config::{Config, PathsConfig};
use satwatch::dataset::export;
use satwatch::detect::ModelArtifact;
use satwatch::generator::{FaultScenario, Generator, NominalProfile};
use satwatch::packet::Mode;
use satwatch::pipeline::{run_nightly, PipelineContext, RunStateRecord, Stage};

fn context(root: &std::path::Path, seed: u64) -> PipelineContext {
    let mut config = Config {
        paths: PathsConfig::under(root),
        ..Config::default()
    };
    config.generator.seed = Some(seed);
    config.generator.fault_rate = 0.02;
    config.detect.threshold = 0.9;
    PipelineContext::from_config(&config).unwrap()
}

fn collaborators() -> Collaborators {
    Collaborators {
        voice: Arc::new(SilentVoice),
        ..Collaborators::offline()
    }
}

#[tokio::test]
async fn test_nightly_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), 2024);
    let paths = ctx.paths.clone();

    let summary = run_nightly(ctx, &collaborators()).await.unwrap();
    assert_eq!(summary.total_packets, 500);
    assert!(
        (1..=50).contains(&summary.anomaly_count),
        "anomaly_count = {}",
        summary.anomaly_count
    );

    let record = RunStateRecord::read(&paths.last_run_file).unwrap().unwrap();
    assert_eq!(record.total_packets, 500);
    assert_eq!(record.anomaly_count, summary.anomaly_count);
    assert_eq!(record.csv_file, paths.csv_file.display().to_string());

    let exported = export::read_csv(&paths.csv_file).unwrap();
    let scores: Vec<f64> = exported
        .annotations()
        .unwrap()
        .iter()
        .map(|a| a.anomaly_score)
        .collect();
    assert_eq!(scores.iter().cloned().fold(f64::MIN, f64::max), 1.0);
    assert_eq!(scores.iter().cloned().fold(f64::MAX, f64::min), 0.0);

    let artifact = ModelArtifact::load(&paths.model_file).unwrap();
    assert_eq!(artifact.training_rows, 300);
}

#[tokio::test]
async fn test_train_failure_keeps_last_run() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), 5);
    let paths = ctx.paths.clone();
    run_nightly(ctx.clone(), &collaborators()).await.unwrap();
    let before = std::fs::read(&paths.last_run_file).unwrap();
    let log_before = std::fs::read_to_string(&paths.run_log).unwrap();

    let mut failing = ctx;
    failing.forest.tree_count = 0;
    let err = run_nightly(failing, &collaborators()).await.unwrap_err();
    assert_eq!(err.stage, Stage::Train);

    assert_eq!(std::fs::read(&paths.last_run_file).unwrap(), before);
    assert_eq!(std::fs::read_to_string(&paths.run_log).unwrap(), log_before);
}

#[test]
fn test_power_drop_lowers_battery_and_enters_safe_mode() {
    let mut generator = Generator::new(&NominalProfile::default(), Some(17)).unwrap();
    for ts in 0..50 {
        let nominal = generator.nominal(ts);
        let faulted = generator.inject(&nominal, FaultScenario::PowerDrop);
        assert!(faulted.battery_v < nominal.battery_v);
        assert_eq!(faulted.mode, Mode::Safe);
        assert_eq!(faulted.timestamp, nominal.timestamp);
    }
}
