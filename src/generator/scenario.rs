//! Fault scenarios applied on top of a nominal packet.

use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;
use crate::packet::{Mode, Packet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultScenario {
    /// Battery sags, panel current rises, spacecraft drops to SAFE.
    PowerDrop,
    /// Board temperature jumps.
    ThermalSpike,
    /// Body rates disturbed on all axes, spacecraft in MANEUVER.
    AttitudeIssue,
}

impl FaultScenario {
    pub const ALL: [FaultScenario; 3] = [
        FaultScenario::PowerDrop,
        FaultScenario::ThermalSpike,
        FaultScenario::AttitudeIssue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultScenario::PowerDrop => "power_drop",
            FaultScenario::ThermalSpike => "thermal_spike",
            FaultScenario::AttitudeIssue => "attitude_issue",
        }
    }

    /// Return a perturbed copy of `packet`.
    pub fn apply<R: Rng + ?Sized>(&self, packet: &Packet, rng: &mut R) -> Packet {
        let mut p = *packet;
        match self {
            FaultScenario::PowerDrop => {
                p.battery_v -= rng.gen_range(1.0..2.5);
                p.panel_i += rng.gen_range(0.5..1.0);
                p.mode = Mode::Safe;
            }
            FaultScenario::ThermalSpike => {
                p.temp_c += rng.gen_range(15.0..30.0);
            }
            FaultScenario::AttitudeIssue => {
                p.gyro_x += rng.gen_range(-0.5..0.5);
                p.gyro_y += rng.gen_range(-0.5..0.5);
                p.gyro_z += rng.gen_range(-0.5..0.5);
                p.mode = Mode::Maneuver;
            }
        }
        p
    }
}

impl std::fmt::Display for FaultScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultScenario {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "power_drop" => Ok(FaultScenario::PowerDrop),
            "thermal_spike" => Ok(FaultScenario::ThermalSpike),
            "attitude_issue" => Ok(FaultScenario::AttitudeIssue),
            other => Err(TelemetryError::Config(format!("unknown fault scenario '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{Generator, NominalProfile};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_power_drop_lowers_battery_and_forces_safe() {
        let mut gen = Generator::new(&NominalProfile::default(), Some(11)).unwrap();
        for ts in 0..100 {
            let before = gen.nominal(ts);
            let after = gen.inject(&before, FaultScenario::PowerDrop);
            assert!(after.battery_v < before.battery_v);
            assert!(after.panel_i > before.panel_i);
            assert_eq!(after.mode, Mode::Safe);
            assert_eq!(after.timestamp, before.timestamp);
        }
    }

    #[test]
    fn test_thermal_spike_raises_temperature_only() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut gen = Generator::new(&NominalProfile::default(), Some(5)).unwrap();
        let before = gen.nominal(0);
        let after = FaultScenario::ThermalSpike.apply(&before, &mut rng);
        assert!(after.temp_c >= before.temp_c + 15.0);
        assert_eq!(after.battery_v, before.battery_v);
        assert_eq!(after.mode, before.mode);
    }

    #[test]
    fn test_attitude_issue_forces_maneuver() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut gen = Generator::new(&NominalProfile::default(), Some(9)).unwrap();
        let before = gen.nominal(0);
        let after = FaultScenario::AttitudeIssue.apply(&before, &mut rng);
        assert_eq!(after.mode, Mode::Maneuver);
        assert!((after.gyro_x - before.gyro_x).abs() <= 0.5 + 1e-6);
    }

    #[test]
    fn test_parse_names() {
        for s in FaultScenario::ALL {
            assert_eq!(s.as_str().parse::<FaultScenario>().unwrap(), s);
        }
        assert!("solar_flare".parse::<FaultScenario>().is_err());
    }
}
