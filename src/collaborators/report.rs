use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use askama::Template;

use super::{Narrative, ReportWriter};
use crate::pipeline::RunSummary;

#[derive(Template)]
#[template(path = "nightly_report.txt")]
struct NightlyReport<'a> {
    run_id: String,
    timestamp: &'a str,
    total_packets: usize,
    anomaly_count: usize,
    anomaly_rate: String,
    baseline_rows: usize,
    stat_lines: Vec<String>,
    briefing: &'a str,
    actions: &'a str,
    bin_file: String,
    csv_file: String,
    model_file: String,
}

/// Plain-text nightly report rendered from a template.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextReportWriter;

impl TextReportWriter {
    pub fn render(summary: &RunSummary, narrative: &Narrative) -> Result<String> {
        let mut stat_lines = vec![format!(
            "{:<10} {:>10} {:>10} {:>10} {:>10}",
            "feature", "mean", "std", "min", "max"
        )];
        stat_lines.extend(summary.stats.features.iter().map(|(name, s)| {
            format!(
                "{:<10} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
                name, s.mean, s.std, s.min, s.max
            )
        }));

        let report = NightlyReport {
            run_id: summary.run_id.to_string(),
            timestamp: &summary.timestamp_readable,
            total_packets: summary.total_packets,
            anomaly_count: summary.anomaly_count,
            anomaly_rate: format!("{:.2}", summary.anomaly_rate_percent),
            baseline_rows: summary.stats.baseline_rows,
            stat_lines,
            briefing: &narrative.briefing,
            actions: &narrative.actions,
            bin_file: summary.artifacts.bin_file.display().to_string(),
            csv_file: summary.artifacts.csv_file.display().to_string(),
            model_file: summary.artifacts.model_file.display().to_string(),
        };
        report.render().context("failed to render nightly report")
    }
}

impl ReportWriter for TextReportWriter {
    fn write(&self, summary: &RunSummary, narrative: &Narrative, path: &Path) -> Result<PathBuf> {
        let text = Self::render(summary, narrative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path.to_path_buf())
    }
}
