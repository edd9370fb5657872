//! Housekeeping telemetry packet -- one fixed-format sample.

pub mod codec;

use serde::{Deserialize, Serialize};

use crate::error::FormatError;

pub use codec::{decode, decode_stream, encode, PacketCodec, PACKET_SIZE};

/// Column names in wire order.
pub const FIELD_NAMES: [&str; 8] = [
    "timestamp",
    "battery_v",
    "panel_i",
    "temp_c",
    "gyro_x",
    "gyro_y",
    "gyro_z",
    "mode",
];

/// Spacecraft operating mode, carried as a single byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Mode {
    Idle = 0,
    Nominal = 1,
    Safe = 2,
    Maneuver = 3,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Idle, Mode::Nominal, Mode::Safe, Mode::Maneuver];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Idle => "IDLE",
            Mode::Nominal => "NOMINAL",
            Mode::Safe => "SAFE",
            Mode::Maneuver => "MANEUVER",
        }
    }
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> u8 {
        mode as u8
    }
}

impl TryFrom<u8> for Mode {
    type Error = FormatError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Idle),
            1 => Ok(Mode::Nominal),
            2 => Ok(Mode::Safe),
            3 => Ok(Mode::Maneuver),
            other => Err(FormatError::UnknownMode(other)),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One telemetry sample. Numeric fields keep their 32-bit wire width so a
/// decoded packet re-encodes to the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Seconds since the Unix epoch.
    pub timestamp: u32,
    /// Bus voltage (V).
    pub battery_v: f32,
    /// Solar panel current (A).
    pub panel_i: f32,
    /// Board temperature (deg C).
    pub temp_c: f32,
    /// Body rates (deg/s).
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub gyro_z: f32,
    pub mode: Mode,
}
