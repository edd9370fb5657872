//! Context handed to the narrator for free-text questions about the
//! current dataset: its column layout plus whole-population statistics.

use serde::Serialize;

use super::summary::FeatureSummary;
use crate::dataset::Dataset;
use crate::detect::features;
use crate::error::{Result, TelemetryError};
use crate::packet::FIELD_NAMES;

/// Characters of context text echoed back with an answer.
pub const PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: &'static str,
    pub dtype: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryContext {
    pub schema: Vec<Column>,
    pub total_packets: usize,
    pub anomaly_count: usize,
    /// Statistics over every row, flagged or not.
    pub features: FeatureSummary,
}

impl QueryContext {
    pub fn build(dataset: &Dataset) -> Result<Self> {
        if dataset.is_empty() {
            return Err(TelemetryError::EmptyDataset { operation: "querying" });
        }
        let dtypes = ["u32", "f32", "f32", "f32", "f32", "f32", "f32", "u8"];
        let mut schema: Vec<Column> = FIELD_NAMES
            .into_iter()
            .zip(dtypes)
            .map(|(name, dtype)| Column { name, dtype })
            .collect();
        if dataset.is_annotated() {
            schema.push(Column { name: "anomaly_score", dtype: "f64" });
            schema.push(Column { name: "is_anomaly", dtype: "bool" });
        }
        Ok(Self {
            schema,
            total_packets: dataset.len(),
            anomaly_count: dataset.anomaly_count(),
            features: FeatureSummary::from_rows(&features::matrix(dataset)),
        })
    }

    /// One line per feature, `name: min=.., max=.., mean=.., std=..`.
    pub fn feature_lines(&self) -> Vec<(&'static str, String)> {
        self.features
            .iter()
            .map(|(name, s)| {
                (
                    name,
                    format!(
                        "{name}: min={:.3}, max={:.3}, mean={:.3}, std={:.3}",
                        s.min, s.max, s.mean, s.std
                    ),
                )
            })
            .collect()
    }

    pub fn text(&self) -> String {
        let mut lines = vec![
            format!(
                "Total packets: {}, anomalies: {}.",
                self.total_packets, self.anomaly_count
            ),
            "Per-feature statistics:".to_string(),
        ];
        lines.extend(self.feature_lines().into_iter().map(|(_, l)| format!("  {l}")));
        lines.join("\n")
    }

    pub fn preview(&self) -> String {
        self.text().chars().take(PREVIEW_CHARS).collect()
    }
}
