//! Tabular in-memory dataset built from a packet stream.

pub mod export;

use std::path::Path;

use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::error::{Result, TelemetryError};
use crate::packet::{codec, Packet};

/// Per-row detection output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Annotation {
    /// Batch-relative score in [0, 1]; 1 is the most anomalous row.
    pub anomaly_score: f64,
    pub is_anomaly: bool,
}

/// Ordered packets plus, after detection, one annotation per row.
///
/// Row order is decode order. Detection never mutates a dataset; it
/// produces a new one via [`Dataset::with_annotations`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    packets: Vec<Packet>,
    annotations: Option<Vec<Annotation>>,
}

impl Dataset {
    pub fn from_packets(packets: Vec<Packet>) -> Self {
        Self {
            packets,
            annotations: None,
        }
    }

    /// Decode a raw packet buffer. Trailing partial packets are dropped.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_packets(codec::decode_stream(bytes)?))
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn annotations(&self) -> Option<&[Annotation]> {
        self.annotations.as_deref()
    }

    pub fn is_annotated(&self) -> bool {
        self.annotations.is_some()
    }

    /// Iterate rows with their annotation, if detection has run.
    pub fn rows(&self) -> impl Iterator<Item = (&Packet, Option<&Annotation>)> + '_ {
        self.packets
            .iter()
            .enumerate()
            .map(move |(i, p)| (p, self.annotations.as_ref().and_then(|a| a.get(i))))
    }

    /// New dataset with the same rows and the given annotations.
    pub fn with_annotations(&self, annotations: Vec<Annotation>) -> Result<Self> {
        if annotations.len() != self.packets.len() {
            return Err(TelemetryError::Config(format!(
                "annotation count {} does not match row count {}",
                annotations.len(),
                self.packets.len()
            )));
        }
        Ok(Self {
            packets: self.packets.clone(),
            annotations: Some(annotations),
        })
    }

    /// Number of flagged rows; zero before detection.
    pub fn anomaly_count(&self) -> usize {
        self.annotations
            .as_ref()
            .map(|a| a.iter().filter(|r| r.is_anomaly).count())
            .unwrap_or(0)
    }

    /// See [`export::write_csv`].
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        export::write_csv(self, path)
    }

    /// See [`export::read_csv`].
    pub fn read_csv(path: &Path) -> Result<Self> {
        export::read_csv(path)
    }

    /// Seeded random subsample of `round(fraction * len)` rows, kept in
    /// their original order. Annotations are not carried over.
    pub fn sample_fraction(&self, fraction: f64, seed: u64) -> Self {
        let fraction = fraction.clamp(0.0, 1.0);
        let amount = (fraction * self.len() as f64).round() as usize;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut picked = index::sample(&mut rng, self.len(), amount).into_vec();
        picked.sort_unstable();
        debug!(total = self.len(), picked = picked.len(), "sampled training subset");
        Self::from_packets(picked.into_iter().map(|i| self.packets[i]).collect())
    }
}

/// Decode a binary packet file into a dataset.
pub fn decode_file(bin_path: &Path) -> Result<Dataset> {
    let packets = codec::read_packets(bin_path)?;
    info!(path = %bin_path.display(), packets = packets.len(), "decoded packet file");
    Ok(Dataset::from_packets(packets))
}

/// Prefer a previously exported table; otherwise decode the binary file.
pub fn load_or_decode(csv_path: &Path, bin_path: &Path) -> Result<Dataset> {
    if csv_path.exists() {
        debug!(path = %csv_path.display(), "loading exported table");
        export::read_csv(csv_path)
    } else {
        decode_file(bin_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{encode, Mode};

    fn packets(n: u32) -> Vec<Packet> {
        (0..n)
            .map(|i| Packet {
                timestamp: 100 + i,
                battery_v: 7.4,
                panel_i: 1.2,
                temp_c: 35.0 + i as f32,
                gyro_x: 0.0,
                gyro_y: 0.0,
                gyro_z: 0.0,
                mode: Mode::Nominal,
            })
            .collect()
    }

    #[test]
    fn test_decode_preserves_order() {
        let mut bytes = Vec::new();
        for p in packets(6) {
            bytes.extend_from_slice(&encode(&p));
        }
        bytes.push(0xFF);
        let ds = Dataset::decode(&bytes).unwrap();
        assert_eq!(ds.len(), 6);
        let ts: Vec<u32> = ds.packets().iter().map(|p| p.timestamp).collect();
        assert_eq!(ts, vec![100, 101, 102, 103, 104, 105]);
        assert!(!ds.is_annotated());
        assert_eq!(ds.anomaly_count(), 0);
    }

    #[test]
    fn test_sample_fraction_is_seeded() {
        let ds = Dataset::from_packets(packets(500));
        let a = ds.sample_fraction(0.6, 42);
        let b = ds.sample_fraction(0.6, 42);
        assert_eq!(a.len(), 300);
        assert_eq!(a, b);
        assert!(a.packets().windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_ne!(a, ds.sample_fraction(0.6, 43));
    }

    #[test]
    fn test_with_annotations_checks_length() {
        let ds = Dataset::from_packets(packets(3));
        let bad = vec![Annotation { anomaly_score: 0.0, is_anomaly: false }];
        assert!(ds.with_annotations(bad).is_err());

        let good = vec![
            Annotation { anomaly_score: 0.0, is_anomaly: false },
            Annotation { anomaly_score: 1.0, is_anomaly: true },
            Annotation { anomaly_score: 0.5, is_anomaly: false },
        ];
        let annotated = ds.with_annotations(good).unwrap();
        assert_eq!(annotated.anomaly_count(), 1);
        assert!(!ds.is_annotated());
        assert_eq!(annotated.rows().filter(|(_, a)| a.is_some()).count(), 3);
    }
}
