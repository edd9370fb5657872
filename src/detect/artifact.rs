//! Persisted model artifact.
//!
//! A JSON document whose header (`format`, `schema_version`) is checked
//! before the forest body is parsed, so files from another tool or a newer
//! release are rejected with a clear error instead of a field mismatch.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::features::FEATURE_NAMES;
use super::forest::IsolationForest;
use crate::error::{Result, TelemetryError};

pub const FORMAT_TAG: &str = "satwatch-iforest";
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Header {
    format: String,
    schema_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format: String,
    pub schema_version: u32,
    pub feature_names: Vec<String>,
    pub trained_at: DateTime<Utc>,
    pub training_rows: usize,
    pub model: IsolationForest,
}

impl ModelArtifact {
    pub fn new(model: IsolationForest, training_rows: usize) -> Self {
        Self {
            format: FORMAT_TAG.to_string(),
            schema_version: SCHEMA_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            trained_at: Utc::now(),
            training_rows,
            model,
        }
    }

    /// Serialize to `path` as is. Callers that replace a live artifact
    /// stage it first.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }

    /// Serialize to `path` via a temporary sibling and rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let write = || -> Result<()> {
            self.write_to(&tmp)?;
            fs::rename(&tmp, path)?;
            Ok(())
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        info!(path = %path.display(), trees = self.model.tree_count(), "saved model artifact");
        Ok(())
    }

    /// Load and validate an artifact. A missing file is `ModelNotFound`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TelemetryError::ModelNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let header: Header = serde_json::from_slice(bytes)
            .map_err(|e| TelemetryError::ModelArtifact(format!("unreadable header: {e}")))?;
        if header.format != FORMAT_TAG {
            return Err(TelemetryError::ModelArtifact(format!(
                "unexpected format tag '{}'",
                header.format
            )));
        }
        if header.schema_version > SCHEMA_VERSION {
            return Err(TelemetryError::ModelArtifact(format!(
                "schema version {} is newer than supported {}",
                header.schema_version, SCHEMA_VERSION
            )));
        }

        let artifact: ModelArtifact = serde_json::from_slice(bytes)?;
        if artifact.feature_names != FEATURE_NAMES {
            return Err(TelemetryError::ModelArtifact(format!(
                "feature layout mismatch: {:?}",
                artifact.feature_names
            )));
        }
        artifact.model.validate()?;
        Ok(artifact)
    }
}
