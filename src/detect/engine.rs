use std::path::Path;

use tracing::{info, warn};

use super::artifact::ModelArtifact;
use super::features;
use super::forest::{ForestParams, IsolationForest};
use crate::dataset::{Annotation, Dataset};
use crate::error::{Result, TelemetryError};

/// Default flag threshold on the normalised score.
pub const DEFAULT_THRESHOLD: f64 = 0.9;

/// Fit a forest on every row of `dataset`.
pub fn train(dataset: &Dataset, params: &ForestParams) -> Result<IsolationForest> {
    if dataset.is_empty() {
        return Err(TelemetryError::EmptyDataset { operation: "training" });
    }
    let matrix = features::matrix(dataset);
    let model = IsolationForest::fit(&matrix, params)?;
    info!(rows = dataset.len(), trees = model.tree_count(), seed = params.seed, "model trained");
    Ok(model)
}

/// Rescale raw scores to [0, 1] using only this batch:
/// `(max - raw) / (max - min)`, so the lowest raw score maps to 1.0.
/// A batch with a single distinct value maps entirely to 0.0.
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    let max = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = raw.iter().cloned().fold(f64::INFINITY, f64::min);
    let span = max - min;
    if !(span.is_finite() && span > 0.0) {
        return vec![0.0; raw.len()];
    }
    raw.iter().map(|r| ((max - r) / span).clamp(0.0, 1.0)).collect()
}

/// Score every row of `dataset` and flag rows whose batch-relative score
/// exceeds `threshold`. The same packet can be flagged in one batch and not
/// in another.
pub fn detect(dataset: &Dataset, model: &IsolationForest, threshold: f64) -> Result<Dataset> {
    if dataset.is_empty() {
        return Err(TelemetryError::EmptyDataset { operation: "detection" });
    }
    let raw = model.score_samples(&features::matrix(dataset));
    let annotations: Vec<Annotation> = normalize_scores(&raw)
        .into_iter()
        .map(|anomaly_score| Annotation {
            anomaly_score,
            is_anomaly: anomaly_score > threshold,
        })
        .collect();
    let detected = dataset.with_annotations(annotations)?;
    info!(rows = detected.len(), anomalies = detected.anomaly_count(), threshold, "detection complete");
    Ok(detected)
}

/// Load the model at `model_path` and detect. If no model has been trained
/// yet, train one on `dataset`, persist it, and detect with it.
pub fn detect_with_fallback(
    dataset: &Dataset,
    model_path: &Path,
    params: &ForestParams,
    threshold: f64,
) -> Result<Dataset> {
    let model = match ModelArtifact::load(model_path) {
        Ok(artifact) => artifact.model,
        Err(TelemetryError::ModelNotFound { path }) => {
            warn!(path = %path.display(), "no trained model, training on the fly");
            let model = train(dataset, params)?;
            ModelArtifact::new(model.clone(), dataset.len()).save(model_path)?;
            model
        }
        Err(e) => return Err(e),
    };
    detect(dataset, &model, threshold)
}
