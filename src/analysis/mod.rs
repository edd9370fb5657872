//! Summary statistics and inspection of detected datasets.

pub mod inspect;
pub mod query;
pub mod stats;
pub mod summary;

pub use inspect::{overview, top_anomaly, Overview, TopAnomaly};
pub use query::QueryContext;
pub use stats::{FeatureStats, Series};
pub use summary::{summarize, FeatureSummary, SummaryStats};
