//! Synthetic telemetry stream with optional fault injection.
//!
//! Nominal fields are drawn independently per packet; a faulted packet is
//! the nominal sample plus a scenario-specific delta, so small offsets can
//! leave it indistinguishable from nominal.

pub mod scenario;

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TelemetryError};
use crate::packet::{Mode, Packet};

pub use scenario::FaultScenario;

/// Mean and standard deviation of one Gaussian field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gaussian {
    pub mean: f64,
    pub std_dev: f64,
}

impl Gaussian {
    pub const fn new(mean: f64, std_dev: f64) -> Self {
        Self { mean, std_dev }
    }

    fn distribution(&self, field: &str) -> Result<Normal<f64>> {
        Normal::new(self.mean, self.std_dev)
            .map_err(|e| TelemetryError::Config(format!("{field}: {e}")))
    }
}

/// Nominal housekeeping profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NominalProfile {
    pub battery_v: Gaussian,
    pub panel_i: Gaussian,
    pub temp_c: Gaussian,
    pub gyro: Gaussian,
    /// Relative weights for IDLE, NOMINAL, SAFE, MANEUVER.
    pub mode_weights: [u32; 4],
}

impl Default for NominalProfile {
    fn default() -> Self {
        Self {
            battery_v: Gaussian::new(7.4, 0.2),
            panel_i: Gaussian::new(1.2, 0.3),
            temp_c: Gaussian::new(35.0, 5.0),
            gyro: Gaussian::new(0.0, 0.02),
            mode_weights: [10, 70, 10, 10],
        }
    }
}

/// Sampler built from a validated [`NominalProfile`].
pub struct Generator {
    rng: ChaCha8Rng,
    battery_v: Normal<f64>,
    panel_i: Normal<f64>,
    temp_c: Normal<f64>,
    gyro: Normal<f64>,
    mode: WeightedIndex<u32>,
}

impl Generator {
    /// Build a generator. `seed` makes the stream reproducible; `None`
    /// seeds from OS entropy.
    pub fn new(profile: &NominalProfile, seed: Option<u64>) -> Result<Self> {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let mode = WeightedIndex::new(profile.mode_weights)
            .map_err(|e| TelemetryError::Config(format!("mode_weights: {e}")))?;
        Ok(Self {
            rng,
            battery_v: profile.battery_v.distribution("battery_v")?,
            panel_i: profile.panel_i.distribution("panel_i")?,
            temp_c: profile.temp_c.distribution("temp_c")?,
            gyro: profile.gyro.distribution("gyro")?,
            mode,
        })
    }

    /// Draw one nominal packet.
    pub fn nominal(&mut self, timestamp: u32) -> Packet {
        let rng = &mut self.rng;
        Packet {
            timestamp,
            battery_v: self.battery_v.sample(rng) as f32,
            panel_i: self.panel_i.sample(rng).max(0.0) as f32,
            temp_c: self.temp_c.sample(rng) as f32,
            gyro_x: self.gyro.sample(rng) as f32,
            gyro_y: self.gyro.sample(rng) as f32,
            gyro_z: self.gyro.sample(rng) as f32,
            mode: Mode::ALL[self.mode.sample(rng)],
        }
    }

    /// Apply `scenario` to a packet using this generator's random stream.
    pub fn inject(&mut self, packet: &Packet, scenario: FaultScenario) -> Packet {
        scenario.apply(packet, &mut self.rng)
    }

    /// Generate `count` packets one second apart starting at `start_epoch`,
    /// returning each packet with the scenario injected into it, if any.
    pub fn generate_labeled(
        &mut self,
        count: usize,
        start_epoch: u32,
        fault_rate: f64,
        scenarios: &[FaultScenario],
    ) -> Vec<(Packet, Option<FaultScenario>)> {
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let ts = start_epoch.wrapping_add(i as u32);
            let packet = self.nominal(ts);
            let scenario = if self.rng.gen::<f64>() < fault_rate {
                scenarios.choose(&mut self.rng).copied()
            } else {
                None
            };
            match scenario {
                Some(scenario) => {
                    debug!(timestamp = ts, scenario = %scenario, "injecting fault");
                    out.push((self.inject(&packet, scenario), Some(scenario)));
                }
                None => out.push((packet, None)),
            }
        }
        out
    }

    /// Generate `count` packets; see [`Generator::generate_labeled`].
    pub fn generate(
        &mut self,
        count: usize,
        start_epoch: u32,
        fault_rate: f64,
        scenarios: &[FaultScenario],
    ) -> Vec<Packet> {
        self.generate_labeled(count, start_epoch, fault_rate, scenarios)
            .into_iter()
            .map(|(packet, _)| packet)
            .collect()
    }
}

/// Current wall-clock time as a packet timestamp.
pub fn now_epoch() -> u32 {
    u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX)
}
