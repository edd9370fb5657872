//! TOML configuration for satwatch.
//!
//! Every field has a compiled-in default, so an empty file (or no file at
//! all) yields a working setup that writes under `data/`, `models/`,
//! `reports/` and `logs/` relative to the working directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detect::ForestParams;
use crate::generator::{FaultScenario, NominalProfile};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "SATWATCH_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG: &str = "satwatch.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub detect: DetectConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub narrator: NarratorConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.validate()?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve configuration, in order:
    /// 1. `explicit` (a `--config` flag); errors are fatal.
    /// 2. The path in `SATWATCH_CONFIG`.
    /// 3. `satwatch.toml` in the working directory.
    /// 4. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "SATWATCH_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            return Self::load(local);
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        let g = &self.generator;
        if !(0.0..=1.0).contains(&g.fault_rate) {
            anyhow::bail!("generator.fault_rate must be in [0, 1], got {}", g.fault_rate);
        }
        let m = &self.model;
        if !(m.train_fraction > 0.0 && m.train_fraction <= 1.0) {
            anyhow::bail!("model.train_fraction must be in (0, 1], got {}", m.train_fraction);
        }
        if !(m.contamination > 0.0 && m.contamination <= 0.5) {
            anyhow::bail!("model.contamination must be in (0, 0.5], got {}", m.contamination);
        }
        if m.tree_count == 0 {
            anyhow::bail!("model.tree_count must be positive");
        }
        if !(0.0..=1.0).contains(&self.detect.threshold) {
            anyhow::bail!("detect.threshold must be in [0, 1], got {}", self.detect.threshold);
        }
        self.schedule.offset()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Well-known artifact locations shared by every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub bin_file: PathBuf,
    pub csv_file: PathBuf,
    pub model_file: PathBuf,
    /// JSON record of the last fully successful run.
    pub last_run_file: PathBuf,
    /// Plain-text log, one line per successful run.
    pub run_log: PathBuf,
    pub reports_dir: PathBuf,
    /// SQLite run history.
    pub history_db: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            bin_file: PathBuf::from("data/telemetry_packets.bin"),
            csv_file: PathBuf::from("data/telemetry_packets.csv"),
            model_file: PathBuf::from("models/isolation_forest.json"),
            last_run_file: PathBuf::from("data/last_scheduled_run.json"),
            run_log: PathBuf::from("logs/nightly_runs.log"),
            reports_dir: PathBuf::from("reports"),
            history_db: PathBuf::from("data/satwatch.db"),
        }
    }
}

impl PathsConfig {
    /// Every path rebased under `root`.
    pub fn under(root: &Path) -> Self {
        let d = Self::default();
        Self {
            bin_file: root.join(d.bin_file),
            csv_file: root.join(d.csv_file),
            model_file: root.join(d.model_file),
            last_run_file: root.join(d.last_run_file),
            run_log: root.join(d.run_log),
            reports_dir: root.join(d.reports_dir),
            history_db: root.join(d.history_db),
        }
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub packet_count: usize,
    /// Independent per-packet fault probability.
    pub fault_rate: f64,
    pub scenarios: Vec<FaultScenario>,
    /// Fixed seed for a reproducible stream; unset draws from OS entropy.
    pub seed: Option<u64>,
    pub profile: NominalProfile,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            packet_count: 500,
            fault_rate: 0.02,
            scenarios: FaultScenario::ALL.to_vec(),
            seed: None,
            profile: NominalProfile::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub tree_count: usize,
    pub contamination: f64,
    pub seed: u64,
    pub max_samples: usize,
    /// Fraction of each nightly dataset used for training.
    pub train_fraction: f64,
    /// Seed of the training subsample.
    pub subsample_seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let forest = ForestParams::default();
        Self {
            tree_count: forest.tree_count,
            contamination: forest.contamination,
            seed: forest.seed,
            max_samples: forest.max_samples,
            train_fraction: 0.6,
            subsample_seed: 42,
        }
    }
}

impl ModelConfig {
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            tree_count: self.tree_count,
            contamination: self.contamination,
            seed: self.seed,
            max_samples: self.max_samples,
        }
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Rows with a batch-relative score above this are flagged.
    pub threshold: f64,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            threshold: crate::detect::DEFAULT_THRESHOLD,
        }
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Six-field cron expression (with seconds), evaluated in `utc_offset_minutes`.
    pub cron: String,
    /// Fixed offset used for scheduling and human-readable timestamps.
    pub utc_offset_minutes: i32,
    /// Hard limit for one nightly run.
    pub timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 2 * * *".to_string(),
            utc_offset_minutes: 330,
            timeout_secs: 600,
        }
    }
}

impl ScheduleConfig {
    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).with_context(|| {
            format!("schedule.utc_offset_minutes out of range: {}", self.utc_offset_minutes)
        })
    }
}

// ---------------------------------------------------------------------------
// Narrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarratorBackend {
    /// Deterministic text assembled from the run numbers.
    Offline,
    /// OpenAI-compatible chat completions endpoint.
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarratorConfig {
    pub backend: NarratorBackend,
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            backend: NarratorBackend::Offline,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4.1-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}
