//! Nightly pipeline: GENERATE -> DECODE -> TRAIN -> DETECT -> SUMMARIZE ->
//! REPORT -> PERSIST.
//!
//! Stages run strictly in sequence, each consuming the previous stage's
//! full output. Any failure, PERSIST included, leaves the previous run's
//! artifacts and last-run record untouched.

pub mod commit;
pub mod nightly;
pub mod run_state;

use std::time::Instant;

use chrono::FixedOffset;
use thiserror::Error;

use crate::config::{Config, PathsConfig};
use crate::detect::ForestParams;
use crate::error::TelemetryError;
use crate::generator::{FaultScenario, NominalProfile};

pub use nightly::{run_core, run_nightly, run_nightly_holding, CoreRun};
pub use run_state::{RunStateRecord, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Stage {
    Generate,
    Decode,
    Train,
    Detect,
    Summarize,
    Report,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Generate => "generate",
            Stage::Decode => "decode",
            Stage::Train => "train",
            Stage::Detect => "detect",
            Stage::Summarize => "summarize",
            Stage::Report => "report",
            Stage::Persist => "persist",
        };
        f.write_str(s)
    }
}

/// A stage raised and the run was aborted without persisting.
#[derive(Debug, Error)]
#[error("nightly run failed at {stage}: {source}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub source: TelemetryError,
}

impl StageFailure {
    pub fn new(stage: Stage, source: impl Into<TelemetryError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.source, TelemetryError::DeadlineExceeded)
    }
}

/// Everything one pipeline invocation needs. Built per run; never shared
/// as process-wide state.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub paths: PathsConfig,
    pub packet_count: usize,
    pub fault_rate: f64,
    pub scenarios: Vec<FaultScenario>,
    pub generator_seed: Option<u64>,
    pub profile: NominalProfile,
    /// First packet timestamp; `None` uses the wall clock.
    pub start_epoch: Option<u32>,
    pub forest: ForestParams,
    pub train_fraction: f64,
    pub subsample_seed: u64,
    pub threshold: f64,
    /// Offset for human-readable timestamps and report names.
    pub offset: FixedOffset,
    /// Past this instant no further stage starts and nothing is persisted.
    pub deadline: Option<Instant>,
}

impl PipelineContext {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            paths: config.paths.clone(),
            packet_count: config.generator.packet_count,
            fault_rate: config.generator.fault_rate,
            scenarios: config.generator.scenarios.clone(),
            generator_seed: config.generator.seed,
            profile: config.generator.profile.clone(),
            start_epoch: None,
            forest: config.model.forest_params(),
            train_fraction: config.model.train_fraction,
            subsample_seed: config.model.subsample_seed,
            threshold: config.detect.threshold,
            offset: config.schedule.offset()?,
            deadline: None,
        })
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Log the transition into `stage`, refusing it once the deadline has passed.
    pub fn begin(&self, stage: Stage) -> Result<(), StageFailure> {
        self.check_deadline(stage)?;
        tracing::info!(%stage, "stage started");
        Ok(())
    }

    /// Fail `stage` if the deadline has passed.
    pub fn check_deadline(&self, stage: Stage) -> Result<(), StageFailure> {
        match self.deadline {
            Some(d) if Instant::now() >= d => {
                Err(StageFailure::new(stage, TelemetryError::DeadlineExceeded))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_context_from_defaults() {
        let ctx = PipelineContext::from_config(&Config::default()).unwrap();
        assert_eq!(ctx.packet_count, 500);
        assert_eq!(ctx.train_fraction, 0.6);
        assert_eq!(ctx.offset.local_minus_utc(), 5 * 3600 + 30 * 60);
        assert!(ctx.check_deadline(Stage::Generate).is_ok());
    }

    #[test]
    fn test_expired_deadline() {
        let ctx = PipelineContext::from_config(&Config::default())
            .unwrap()
            .with_deadline(Instant::now() - Duration::from_millis(1));
        let err = ctx.check_deadline(Stage::Persist).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.stage, Stage::Persist);
        assert!(err.to_string().contains("persist"));
    }
}
