//! Baseline statistics and anomaly counts for a detected dataset.
//!
//! The baseline population is every row not flagged as anomalous (all rows
//! before detection). Feeds the dashboard and the narrative collaborator.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::stats::{FeatureStats, Series};
use crate::dataset::Dataset;
use crate::detect::features::{self, FeatureVector, FEATURE_NAMES};
use crate::error::{Result, TelemetryError};

/// Baseline statistics per model feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub battery_v: FeatureStats,
    pub panel_i: FeatureStats,
    pub temp_c: FeatureStats,
    pub gyro_x: FeatureStats,
    pub gyro_y: FeatureStats,
    pub gyro_z: FeatureStats,
    pub mode: FeatureStats,
}

impl FeatureSummary {
    /// Column statistics over `rows`; all zero when `rows` is empty.
    pub fn from_rows(rows: &[FeatureVector]) -> Self {
        let column = |i: usize| -> FeatureStats {
            Series::new(rows.iter().map(|row| row[i]).collect())
                .describe()
                .unwrap_or_default()
        };
        Self {
            battery_v: column(0),
            panel_i: column(1),
            temp_c: column(2),
            gyro_x: column(3),
            gyro_y: column(4),
            gyro_z: column(5),
            mode: column(6),
        }
    }

    /// `(name, stats)` pairs in feature order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FeatureStats)> {
        FEATURE_NAMES.into_iter().zip([
            &self.battery_v,
            &self.panel_i,
            &self.temp_c,
            &self.gyro_x,
            &self.gyro_y,
            &self.gyro_z,
            &self.mode,
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub features: FeatureSummary,
    pub total_packets: usize,
    pub anomaly_count: usize,
    /// Rows the feature statistics were computed over.
    pub baseline_rows: usize,
}

impl SummaryStats {
    /// Anomaly rate in percent.
    pub fn anomaly_rate_percent(&self) -> f64 {
        if self.total_packets == 0 {
            return 0.0;
        }
        self.anomaly_count as f64 / self.total_packets as f64 * 100.0
    }
}

/// Summarize `dataset`. Fails on an empty dataset. If every row is
/// flagged, statistics fall back to the full population.
pub fn summarize(dataset: &Dataset) -> Result<SummaryStats> {
    if dataset.is_empty() {
        return Err(TelemetryError::EmptyDataset { operation: "summary" });
    }

    let mut baseline: Vec<FeatureVector> = dataset
        .rows()
        .filter(|(_, a)| !a.map(|a| a.is_anomaly).unwrap_or(false))
        .map(|(p, _)| features::extract(p))
        .collect();
    if baseline.is_empty() {
        warn!(rows = dataset.len(), "every row flagged, summarizing full population");
        baseline = features::matrix(dataset);
    }

    Ok(SummaryStats {
        features: FeatureSummary::from_rows(&baseline),
        total_packets: dataset.len(),
        anomaly_count: dataset.anomaly_count(),
        baseline_rows: baseline.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Annotation;
    use crate::packet::{Mode, Packet};

    fn packet(battery_v: f32) -> Packet {
        Packet {
            timestamp: 0,
            battery_v,
            panel_i: 1.0,
            temp_c: 30.0,
            gyro_x: 0.0,
            gyro_y: 0.0,
            gyro_z: 0.0,
            mode: Mode::Nominal,
        }
    }

    fn flag(is_anomaly: bool) -> Annotation {
        Annotation {
            anomaly_score: if is_anomaly { 1.0 } else { 0.0 },
            is_anomaly,
        }
    }

    #[test]
    fn test_unannotated_uses_all_rows() {
        let ds = Dataset::from_packets(vec![packet(7.0), packet(8.0)]);
        let s = summarize(&ds).unwrap();
        assert_eq!(s.total_packets, 2);
        assert_eq!(s.anomaly_count, 0);
        assert_eq!(s.baseline_rows, 2);
        assert_eq!(s.features.battery_v.mean, 7.5);
    }

    #[test]
    fn test_baseline_excludes_anomalies() {
        let ds = Dataset::from_packets(vec![packet(7.0), packet(7.5), packet(2.0)])
            .with_annotations(vec![flag(false), flag(false), flag(true)])
            .unwrap();
        let s = summarize(&ds).unwrap();
        assert_eq!(s.anomaly_count, 1);
        assert_eq!(s.baseline_rows, 2);
        assert_eq!(s.features.battery_v.min, 7.0);
        assert_eq!(s.features.battery_v.mean, 7.25);
        assert!((s.anomaly_rate_percent() - 33.333).abs() < 0.01);
        assert_eq!(s.features.iter().count(), 7);
        assert_eq!(s.features.iter().last().unwrap().0, "mode");
    }

    #[test]
    fn test_all_flagged_falls_back() {
        let ds = Dataset::from_packets(vec![packet(7.0), packet(9.0)])
            .with_annotations(vec![flag(true), flag(true)])
            .unwrap();
        let s = summarize(&ds).unwrap();
        assert_eq!(s.baseline_rows, 2);
        assert_eq!(s.features.battery_v.max, 9.0);
    }

    #[test]
    fn test_empty_is_error() {
        assert!(matches!(
            summarize(&Dataset::default()),
            Err(TelemetryError::EmptyDataset { .. })
        ));
    }
}
