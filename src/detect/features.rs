//! Projection of a packet onto the model's feature space.
//!
//! `mode` enters as its raw ordinal value rather than one-hot, so the model
//! treats SAFE as "further" from IDLE than NOMINAL is.

use crate::dataset::Dataset;
use crate::packet::Packet;

/// Number of model features.
pub const FEATURE_COUNT: usize = 7;

/// Feature names in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "battery_v",
    "panel_i",
    "temp_c",
    "gyro_x",
    "gyro_y",
    "gyro_z",
    "mode",
];

pub type FeatureVector = [f64; FEATURE_COUNT];

pub fn extract(packet: &Packet) -> FeatureVector {
    [
        packet.battery_v as f64,
        packet.panel_i as f64,
        packet.temp_c as f64,
        packet.gyro_x as f64,
        packet.gyro_y as f64,
        packet.gyro_z as f64,
        u8::from(packet.mode) as f64,
    ]
}

/// Feature matrix for every row of `dataset`, in row order.
pub fn matrix(dataset: &Dataset) -> Vec<FeatureVector> {
    dataset.packets().iter().map(extract).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Mode;

    #[test]
    fn test_extract_order() {
        let p = Packet {
            timestamp: 42,
            battery_v: 7.5,
            panel_i: 1.25,
            temp_c: 30.0,
            gyro_x: 0.5,
            gyro_y: -0.25,
            gyro_z: 0.125,
            mode: Mode::Safe,
        };
        assert_eq!(extract(&p), [7.5, 1.25, 30.0, 0.5, -0.25, 0.125, 2.0]);
    }
}
