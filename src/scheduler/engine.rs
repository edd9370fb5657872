use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::cron::NightlyScheduler;
use super::guard::{RunGuard, RunPermit};
use super::history::{HistoryEntry, RunTrigger};
use crate::collaborators::Collaborators;
use crate::pipeline::{run_nightly_holding, PipelineContext};
use crate::storage::{record_run, Pool};

/// Executes nightly runs behind a shared [`RunGuard`] and records every
/// attempt in the history table.
#[derive(Clone)]
pub struct NightlyRunner {
    template: PipelineContext,
    collaborators: Collaborators,
    pool: Option<Pool>,
    guard: RunGuard,
    timeout: Duration,
}

impl NightlyRunner {
    pub fn new(
        template: PipelineContext,
        collaborators: Collaborators,
        pool: Option<Pool>,
        timeout: Duration,
    ) -> Self {
        Self {
            template,
            collaborators,
            pool,
            guard: RunGuard::new(),
            timeout,
        }
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    pub fn pool(&self) -> Option<&Pool> {
        self.pool.as_ref()
    }

    pub fn paths(&self) -> &crate::config::PathsConfig {
        &self.template.paths
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Run now if nothing else is running; otherwise record a skip.
    pub async fn trigger(&self, trigger: RunTrigger) -> HistoryEntry {
        match self.guard.try_acquire() {
            Some(permit) => self.run_with(permit, trigger, Uuid::new_v4()).await,
            None => self.skip(trigger),
        }
    }

    /// Record that `trigger` was coalesced into the run in progress.
    pub fn skip(&self, trigger: RunTrigger) -> HistoryEntry {
        warn!(trigger = trigger.as_str(), "run already in progress, skipping trigger");
        let entry = HistoryEntry::skipped(trigger);
        self.record(&entry);
        entry
    }

    /// Execute one run under an already acquired permit.
    pub async fn run_with(
        &self,
        permit: RunPermit,
        trigger: RunTrigger,
        run_id: Uuid,
    ) -> HistoryEntry {
        let started_at = Utc::now();
        let ctx = self
            .template
            .clone()
            .with_deadline(Instant::now() + self.timeout);

        // The blocking worker keeps its own handle so the guard stays held
        // until that thread is done, even after a timeout.
        let permit = Arc::new(permit);
        let run = run_nightly_holding(ctx, &self.collaborators, run_id, Arc::clone(&permit));

        let entry = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(summary)) => HistoryEntry::success(trigger, started_at, &summary),
            Ok(Err(failure)) => HistoryEntry::failure(run_id, trigger, started_at, &failure),
            Err(_) => {
                error!(%run_id, timeout_secs = self.timeout.as_secs(), "nightly run timed out");
                HistoryEntry::timed_out(run_id, trigger, started_at)
            }
        };
        self.record(&entry);
        drop(permit);
        entry
    }

    fn record(&self, entry: &HistoryEntry) {
        if let Some(pool) = &self.pool {
            if let Err(e) = record_run(pool, entry) {
                error!(run_id = %entry.id, "Failed to record run history: {}", e);
            }
        }
    }
}

/// Fire the nightly pipeline on every schedule tick. Returns only if the
/// schedule has no future fire times.
///
/// Each tick is spawned, so a tick landing while the previous run is still
/// executing is recorded as skipped instead of waiting.
pub async fn run_loop(scheduler: NightlyScheduler, runner: NightlyRunner) {
    info!(cron = scheduler.expr(), "Scheduler engine started");

    loop {
        let now = Utc::now();
        let Some(next) = scheduler.next_after(now) else {
            warn!(cron = scheduler.expr(), "schedule has no future fire times");
            return;
        };
        let wait = (next.with_timezone(&Utc) - now).to_std().unwrap_or_default();
        info!(next = %next.to_rfc3339(), "next nightly run scheduled");
        tokio::time::sleep(wait).await;

        let runner = runner.clone();
        tokio::spawn(async move {
            let entry = runner.trigger(RunTrigger::Schedule).await;
            info!(run_id = %entry.id, status = %entry.status, "scheduled trigger finished");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SilentVoice;
    use crate::config::{Config, PathsConfig};
    use crate::scheduler::history::RunStatus;
    use crate::storage::{list_runs, open_pool};

    fn runner(root: &std::path::Path, timeout: Duration) -> NightlyRunner {
        let config = Config {
            paths: PathsConfig::under(root),
            ..Config::default()
        };
        let mut ctx = PipelineContext::from_config(&config).unwrap();
        ctx.generator_seed = Some(3);
        ctx.packet_count = 300;
        ctx.forest.tree_count = 25;
        let collaborators = Collaborators {
            voice: Arc::new(SilentVoice),
            ..Collaborators::offline()
        };
        let pool = open_pool(&config.paths.history_db).unwrap();
        NightlyRunner::new(ctx, collaborators, Some(pool), timeout)
    }

    #[tokio::test]
    async fn test_trigger_records_success() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path(), Duration::from_secs(120));
        let entry = runner.trigger(RunTrigger::Cli).await;
        assert_eq!(entry.status, RunStatus::Success);
        assert_eq!(entry.total_packets, Some(300));
        assert!(!runner.guard().is_running());

        let runs = list_runs(runner.pool().unwrap(), 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, entry.id);
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path(), Duration::from_secs(120));
        let held = runner.guard().try_acquire().unwrap();

        let entry = runner.trigger(RunTrigger::Schedule).await;
        assert_eq!(entry.status, RunStatus::Skipped);
        assert!(!runner.paths().last_run_file.exists());
        drop(held);

        let runs = list_runs(runner.pool().unwrap(), 10).unwrap();
        assert_eq!(runs[0].status, RunStatus::Skipped);
    }

    #[tokio::test]
    async fn test_zero_timeout_never_persists() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path(), Duration::ZERO);
        let entry = runner.trigger(RunTrigger::Api).await;
        assert_eq!(entry.status, RunStatus::TimedOut);
        assert!(!runner.paths().last_run_file.exists());
    }
}
