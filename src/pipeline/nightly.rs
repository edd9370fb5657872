//! Nightly run orchestration.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::oneshot;
use tracing::{error, info};
use uuid::Uuid;

use super::commit::{Commit, Staging};
use super::run_state::{ArtifactPaths, RunSummary};
use super::{PipelineContext, Stage, StageFailure};
use crate::analysis::{summarize, SummaryStats};
use crate::collaborators::{announce_run, Collaborators};
use crate::dataset::{decode_file, export, Dataset};
use crate::detect::{self, IsolationForest, ModelArtifact};
use crate::error::TelemetryError;
use crate::generator::{now_epoch, Generator};
use crate::packet::codec::write_packets;

/// Output of the in-memory stages, GENERATE through SUMMARIZE.
#[derive(Debug)]
pub struct CoreRun {
    /// Every decoded packet with its batch-relative score.
    pub dataset: Dataset,
    pub model: IsolationForest,
    pub training_rows: usize,
    pub stats: SummaryStats,
    /// Freshly generated stream, moved onto the binary path at persist.
    pub staged_bin: PathBuf,
    /// Owns every staged file of this run; dropping the run removes them.
    pub staging: Staging,
}

/// Run GENERATE, DECODE, TRAIN, DETECT and SUMMARIZE in order. Blocking.
///
/// Only the staged binary stream touches disk; the model stays in memory.
pub fn run_core(ctx: &PipelineContext) -> Result<CoreRun, StageFailure> {
    let mut staging = Staging::default();
    let staged_bin = staging.stage(&ctx.paths.bin_file);

    ctx.begin(Stage::Generate)?;
    let mut generator =
        Generator::new(&ctx.profile, ctx.generator_seed).map_err(|e| StageFailure::new(Stage::Generate, e))?;
    let start = ctx.start_epoch.unwrap_or_else(now_epoch);
    let packets = generator.generate(ctx.packet_count, start, ctx.fault_rate, &ctx.scenarios);
    write_packets(&staged_bin, &packets).map_err(|e| StageFailure::new(Stage::Generate, e))?;
    info!(packets = packets.len(), path = %staged_bin.display(), "generated telemetry stream");

    ctx.begin(Stage::Decode)?;
    let dataset = decode_file(&staged_bin).map_err(|e| StageFailure::new(Stage::Decode, e))?;
    if dataset.is_empty() {
        return Err(StageFailure::new(
            Stage::Decode,
            TelemetryError::EmptyDataset { operation: "decoding" },
        ));
    }

    ctx.begin(Stage::Train)?;
    let training = dataset.sample_fraction(ctx.train_fraction, ctx.subsample_seed);
    let model = detect::train(&training, &ctx.forest).map_err(|e| StageFailure::new(Stage::Train, e))?;

    ctx.begin(Stage::Detect)?;
    let detected = detect::detect(&dataset, &model, ctx.threshold)
        .map_err(|e| StageFailure::new(Stage::Detect, e))?;

    ctx.begin(Stage::Summarize)?;
    let stats = summarize(&detected).map_err(|e| StageFailure::new(Stage::Summarize, e))?;

    Ok(CoreRun {
        dataset: detected,
        model,
        training_rows: training.len(),
        stats,
        staged_bin,
        staging,
    })
}

/// Execute one full nightly run.
pub async fn run_nightly(
    ctx: PipelineContext,
    collaborators: &Collaborators,
) -> Result<RunSummary, StageFailure> {
    run_nightly_holding(ctx, collaborators, Uuid::new_v4(), ()).await
}

/// Like [`run_nightly`], but `hold` lives until the blocking core stages
/// have finished, even if this future is dropped first. A result nobody is
/// waiting for is dropped before `hold`, so its staged files are gone by
/// the time `hold` is released.
pub async fn run_nightly_holding<H: Send + 'static>(
    ctx: PipelineContext,
    collaborators: &Collaborators,
    run_id: Uuid,
    hold: H,
) -> Result<RunSummary, StageFailure> {
    info!(%run_id, packets = ctx.packet_count, "nightly run starting");

    let (tx, rx) = oneshot::channel();
    let core_ctx = ctx.clone();
    tokio::task::spawn_blocking(move || {
        let outcome = run_core(&core_ctx);
        if let Err(abandoned) = tx.send(outcome) {
            drop(abandoned);
        }
        drop(hold);
    });

    let result = match rx.await {
        Ok(Ok(core)) => finish(&ctx, collaborators, run_id, core).await,
        Ok(Err(failure)) => Err(failure),
        Err(e) => Err(StageFailure::new(
            Stage::Generate,
            TelemetryError::Interrupted(e.to_string()),
        )),
    };

    if let Err(failure) = &result {
        error!(%run_id, stage = %failure.stage, error = %failure.source, "nightly run failed");
    }
    result
}

async fn finish(
    ctx: &PipelineContext,
    collaborators: &Collaborators,
    run_id: Uuid,
    mut core: CoreRun,
) -> Result<RunSummary, StageFailure> {
    let timestamp: DateTime<FixedOffset> = Utc::now().with_timezone(&ctx.offset);
    let report_file = ctx
        .paths
        .reports_dir
        .join(format!("nightly_{}.txt", timestamp.format("%Y%m%d_%H%M%S")));
    let artifacts = ArtifactPaths {
        bin_file: ctx.paths.bin_file.clone(),
        csv_file: ctx.paths.csv_file.clone(),
        model_file: ctx.paths.model_file.clone(),
        report_file,
    };
    let summary = RunSummary::new(run_id, timestamp, core.stats.clone(), artifacts);

    ctx.begin(Stage::Report)?;
    let narrative = collaborators.narrate(&summary).await;
    let staged_report = core.staging.stage(&summary.artifacts.report_file);
    collaborators
        .report_writer
        .write(&summary, &narrative, &staged_report)
        .map_err(|e| StageFailure::new(Stage::Report, TelemetryError::Collaborator(format!("{e:#}"))))?;

    ctx.begin(Stage::Persist)?;
    persist(ctx, core, &summary, &staged_report).map_err(|e| StageFailure::new(Stage::Persist, e))?;

    info!(
        %run_id,
        packets = summary.total_packets,
        anomalies = summary.anomaly_count,
        report = %summary.artifacts.report_file.display(),
        "nightly run complete"
    );
    announce_run(collaborators.voice.as_ref(), &summary, &narrative.briefing);
    Ok(summary)
}

/// Commit a run's artifacts. Every file is staged first and swapped in
/// together; the last-run record is written last. Any failure puts the
/// previous artifacts back, so the record never points at a mix of runs.
fn persist(
    ctx: &PipelineContext,
    core: CoreRun,
    summary: &RunSummary,
    staged_report: &Path,
) -> crate::error::Result<()> {
    let CoreRun {
        dataset,
        model,
        training_rows,
        staged_bin,
        mut staging,
        ..
    } = core;
    let artifacts = &summary.artifacts;

    let staged_csv = staging.stage(&artifacts.csv_file);
    export::write_csv(&dataset, &staged_csv)?;
    let staged_model = staging.stage(&artifacts.model_file);
    ModelArtifact::new(model, training_rows).write_to(&staged_model)?;

    let mut commit = Commit::default();
    commit.replace(&staged_bin, &artifacts.bin_file)?;
    commit.replace(&staged_csv, &artifacts.csv_file)?;
    commit.replace(&staged_model, &artifacts.model_file)?;
    commit.replace(staged_report, &artifacts.report_file)?;
    commit.append_log(&ctx.paths.run_log, &summary.log_line())?;
    summary.record().write_atomic(&ctx.paths.last_run_file)?;
    commit.finish();
    Ok(())
}
