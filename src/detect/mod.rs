//! Unsupervised anomaly detection over telemetry datasets.

pub mod artifact;
pub mod engine;
pub mod features;
pub mod forest;

pub use artifact::ModelArtifact;
pub use engine::{detect, detect_with_fallback, normalize_scores, train, DEFAULT_THRESHOLD};
pub use features::{extract, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use forest::{ForestParams, IsolationForest};
