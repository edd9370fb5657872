//! Dataset inspection helpers for the CLI and dashboard.

use serde::Serialize;

use crate::dataset::Dataset;
use crate::packet::Packet;

/// The highest-scoring flagged row of a detected dataset.
#[derive(Debug, Clone, Serialize)]
pub struct TopAnomaly {
    /// Row index in decode order.
    pub index: usize,
    pub anomaly_score: f64,
    pub packet: Packet,
}

/// Card-level overview of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_packets: usize,
    pub anomaly_count: usize,
    pub first_timestamp: Option<u32>,
    pub last_timestamp: Option<u32>,
}

/// `None` when nothing is flagged (or detection has not run). Ties go to
/// the earliest row.
pub fn top_anomaly(dataset: &Dataset) -> Option<TopAnomaly> {
    let mut best: Option<TopAnomaly> = None;
    for (index, (packet, annotation)) in dataset.rows().enumerate() {
        let Some(a) = annotation.filter(|a| a.is_anomaly) else {
            continue;
        };
        if best.as_ref().map_or(true, |b| a.anomaly_score > b.anomaly_score) {
            best = Some(TopAnomaly {
                index,
                anomaly_score: a.anomaly_score,
                packet: *packet,
            });
        }
    }
    best
}

pub fn overview(dataset: &Dataset) -> Overview {
    Overview {
        total_packets: dataset.len(),
        anomaly_count: dataset.anomaly_count(),
        first_timestamp: dataset.packets().first().map(|p| p.timestamp),
        last_timestamp: dataset.packets().last().map(|p| p.timestamp),
    }
}
