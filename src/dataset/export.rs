//! CSV export and reload of a dataset.
//!
//! Header is the packet field names in wire order, followed by
//! `anomaly_score,is_anomaly` when the dataset has been through detection.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::{Annotation, Dataset};
use crate::error::{Result, TelemetryError};
use crate::packet::{Mode, Packet, FIELD_NAMES};

#[derive(Debug, Deserialize)]
struct Row {
    timestamp: u32,
    battery_v: f32,
    panel_i: f32,
    temp_c: f32,
    gyro_x: f32,
    gyro_y: f32,
    gyro_z: f32,
    mode: u8,
    #[serde(default)]
    anomaly_score: Option<f64>,
    #[serde(default)]
    is_anomaly: Option<bool>,
}

/// Write `dataset` to `path`, replacing any existing file.
pub fn write_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header: Vec<&str> = FIELD_NAMES.to_vec();
    if dataset.is_annotated() {
        header.extend(["anomaly_score", "is_anomaly"]);
    }
    wtr.write_record(&header)?;

    for (p, annotation) in dataset.rows() {
        let mut record = vec![
            p.timestamp.to_string(),
            p.battery_v.to_string(),
            p.panel_i.to_string(),
            p.temp_c.to_string(),
            p.gyro_x.to_string(),
            p.gyro_y.to_string(),
            p.gyro_z.to_string(),
            u8::from(p.mode).to_string(),
        ];
        if let Some(a) = annotation {
            record.push(a.anomaly_score.to_string());
            record.push(a.is_anomaly.to_string());
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    info!(path = %path.display(), rows = dataset.len(), "exported dataset");
    Ok(())
}

/// Reload a table written by [`write_csv`]. Annotations are restored only
/// if every row carries both anomaly columns.
pub fn read_csv(path: &Path) -> Result<Dataset> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut packets = Vec::new();
    let mut annotations = Vec::new();
    let mut complete = true;

    for row in rdr.deserialize::<Row>() {
        let row = row?;
        packets.push(Packet {
            timestamp: row.timestamp,
            battery_v: row.battery_v,
            panel_i: row.panel_i,
            temp_c: row.temp_c,
            gyro_x: row.gyro_x,
            gyro_y: row.gyro_y,
            gyro_z: row.gyro_z,
            mode: Mode::try_from(row.mode).map_err(TelemetryError::from)?,
        });
        match (row.anomaly_score, row.is_anomaly) {
            (Some(anomaly_score), Some(is_anomaly)) => annotations.push(Annotation {
                anomaly_score,
                is_anomaly,
            }),
            _ => complete = false,
        }
    }

    let dataset = Dataset::from_packets(packets);
    if complete && !dataset.is_empty() {
        dataset.with_annotations(annotations)
    } else {
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        let packets = vec![
            Packet {
                timestamp: 1,
                battery_v: 7.25,
                panel_i: 1.5,
                temp_c: 33.0,
                gyro_x: 0.01,
                gyro_y: -0.02,
                gyro_z: 0.0,
                mode: Mode::Idle,
            },
            Packet {
                timestamp: 2,
                battery_v: 5.5,
                panel_i: 2.25,
                temp_c: 36.0,
                gyro_x: 0.0,
                gyro_y: 0.0,
                gyro_z: 0.0,
                mode: Mode::Safe,
            },
        ];
        Dataset::from_packets(packets)
    }

    #[test]
    fn test_header_without_annotations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.csv");
        write_csv(&dataset(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.lines().next().unwrap(),
            "timestamp,battery_v,panel_i,temp_c,gyro_x,gyro_y,gyro_z,mode"
        );
        let back = read_csv(&path).unwrap();
        assert_eq!(back, dataset());
    }

    #[test]
    fn test_annotated_export_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detected.csv");
        let annotated = dataset()
            .with_annotations(vec![
                Annotation { anomaly_score: 0.0, is_anomaly: false },
                Annotation { anomaly_score: 1.0, is_anomaly: true },
            ])
            .unwrap();
        write_csv(&annotated, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.lines().next().unwrap().ends_with(",anomaly_score,is_anomaly"));
        assert!(text.lines().nth(2).unwrap().ends_with(",2,1,true"));

        let back = read_csv(&path).unwrap();
        assert_eq!(back.anomaly_count(), 1);
        assert_eq!(back.packets()[1].mode, Mode::Safe);
    }
}
