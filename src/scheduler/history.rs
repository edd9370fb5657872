//! Execution history for nightly runs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::{RunSummary, StageFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Failed,
    /// Triggered while another run was executing.
    Skipped,
    TimedOut,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "Success",
            RunStatus::Failed => "Failed",
            RunStatus::Skipped => "Skipped",
            RunStatus::TimedOut => "TimedOut",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "Success" => Ok(RunStatus::Success),
            "Failed" => Ok(RunStatus::Failed),
            "Skipped" => Ok(RunStatus::Skipped),
            "TimedOut" => Ok(RunStatus::TimedOut),
            other => anyhow::bail!("unknown run status '{other}'"),
        }
    }
}

/// What asked for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunTrigger {
    Schedule,
    Api,
    Cli,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Schedule => "schedule",
            RunTrigger::Api => "api",
            RunTrigger::Cli => "cli",
        }
    }
}

impl FromStr for RunTrigger {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "schedule" => Ok(RunTrigger::Schedule),
            "api" => Ok(RunTrigger::Api),
            "cli" => Ok(RunTrigger::Cli),
            other => anyhow::bail!("unknown run trigger '{other}'"),
        }
    }
}

/// One row of run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_packets: Option<usize>,
    pub anomaly_count: Option<usize>,
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn success(trigger: RunTrigger, started_at: DateTime<Utc>, summary: &RunSummary) -> Self {
        Self {
            id: summary.run_id,
            trigger,
            status: RunStatus::Success,
            started_at,
            finished_at: Some(Utc::now()),
            total_packets: Some(summary.total_packets),
            anomaly_count: Some(summary.anomaly_count),
            error: None,
        }
    }

    pub fn failure(
        id: Uuid,
        trigger: RunTrigger,
        started_at: DateTime<Utc>,
        failure: &StageFailure,
    ) -> Self {
        let status = if failure.is_timeout() {
            RunStatus::TimedOut
        } else {
            RunStatus::Failed
        };
        Self::unfinished(id, trigger, status, started_at, failure.to_string())
    }

    pub fn timed_out(id: Uuid, trigger: RunTrigger, started_at: DateTime<Utc>) -> Self {
        Self::unfinished(
            id,
            trigger,
            RunStatus::TimedOut,
            started_at,
            "run exceeded its timeout".to_string(),
        )
    }

    pub fn skipped(trigger: RunTrigger) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            trigger,
            status: RunStatus::Skipped,
            started_at: now,
            finished_at: Some(now),
            total_packets: None,
            anomaly_count: None,
            error: Some("another run was in progress".to_string()),
        }
    }

    fn unfinished(
        id: Uuid,
        trigger: RunTrigger,
        status: RunStatus,
        started_at: DateTime<Utc>,
        error: String,
    ) -> Self {
        Self {
            id,
            trigger,
            status,
            started_at,
            finished_at: Some(Utc::now()),
            total_packets: None,
            anomaly_count: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryError;
    use crate::pipeline::Stage;

    #[test]
    fn test_status_round_trip() {
        for s in [RunStatus::Success, RunStatus::Failed, RunStatus::Skipped, RunStatus::TimedOut] {
            assert_eq!(s.as_str().parse::<RunStatus>().unwrap(), s);
        }
        assert!("Aborted".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_failure_classification() {
        let started = Utc::now();
        let timeout = StageFailure::new(Stage::Detect, TelemetryError::DeadlineExceeded);
        let entry = HistoryEntry::failure(Uuid::new_v4(), RunTrigger::Schedule, started, &timeout);
        assert_eq!(entry.status, RunStatus::TimedOut);

        let failed = StageFailure::new(Stage::Train, TelemetryError::EmptyDataset { operation: "training" });
        let entry = HistoryEntry::failure(Uuid::new_v4(), RunTrigger::Api, started, &failed);
        assert_eq!(entry.status, RunStatus::Failed);
        assert!(entry.error.unwrap().contains("train"));
    }
}
