//! Run summary and the persisted "last run" record.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::SummaryStats;
use crate::error::Result;

/// Artifact locations produced by one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub bin_file: PathBuf,
    pub csv_file: PathBuf,
    pub model_file: PathBuf,
    pub report_file: PathBuf,
}

/// Outcome of one nightly execution. Built once the SUMMARIZE stage
/// completes and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub timestamp: DateTime<FixedOffset>,
    pub timestamp_readable: String,
    pub total_packets: usize,
    pub anomaly_count: usize,
    pub anomaly_rate_percent: f64,
    pub stats: SummaryStats,
    pub artifacts: ArtifactPaths,
}

impl RunSummary {
    pub fn new(
        run_id: Uuid,
        timestamp: DateTime<FixedOffset>,
        stats: SummaryStats,
        artifacts: ArtifactPaths,
    ) -> Self {
        Self {
            run_id,
            timestamp_readable: readable(&timestamp),
            timestamp,
            total_packets: stats.total_packets,
            anomaly_count: stats.anomaly_count,
            anomaly_rate_percent: stats.anomaly_rate_percent(),
            stats,
            artifacts,
        }
    }

    pub fn record(&self) -> RunStateRecord {
        RunStateRecord {
            timestamp: self.timestamp_readable.clone(),
            total_packets: self.total_packets,
            anomaly_count: self.anomaly_count,
            csv_file: self.artifacts.csv_file.display().to_string(),
            bin_file: self.artifacts.bin_file.display().to_string(),
            report_pdf: self.artifacts.report_file.display().to_string(),
        }
    }

    /// One line of the plain-text run log.
    pub fn log_line(&self) -> String {
        let report = self
            .artifacts
            .report_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!(
            "{} | packets={} anomalies={} | report={}",
            self.timestamp_readable, self.total_packets, self.anomaly_count, report
        )
    }
}

/// `2025-01-31 02:00:00 IST` for UTC+5:30, otherwise the numeric offset.
pub fn readable(ts: &DateTime<FixedOffset>) -> String {
    if ts.offset().local_minus_utc() == 5 * 3600 + 30 * 60 {
        ts.format("%Y-%m-%d %H:%M:%S IST").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S UTC%:z").to_string()
    }
}

/// Record read by dashboards and report consumers. The key set is fixed;
/// `report_pdf` holds the report path whatever its format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStateRecord {
    pub timestamp: String,
    pub total_packets: usize,
    pub anomaly_count: usize,
    pub csv_file: String,
    pub bin_file: String,
    pub report_pdf: String,
}

impl RunStateRecord {
    /// Replace the record at `path` atomically (write sibling, rename).
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let write = || -> Result<()> {
            fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
            fs::rename(&tmp, path)?;
            Ok(())
        };
        let written = write();
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }

    /// `None` if no run has completed yet.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Append one line to the plain-text run log.
pub fn append_log(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{line}")?;
    Ok(())
}
