use serde::{Deserialize, Serialize};

/// Descriptive statistics of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureStats {
    pub mean: f64,
    /// Sample standard deviation (n - 1); 0.0 for fewer than two values.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// A column of values for statistical analysis.
pub struct Series {
    values: Vec<f64>,
}

impl Series {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    pub fn sample_variance(&self) -> f64 {
        let n = self.values.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / (n - 1) as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.sample_variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.values.iter().cloned().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }

    /// `None` for an empty series.
    pub fn describe(&self) -> Option<FeatureStats> {
        if self.is_empty() {
            return None;
        }
        Some(FeatureStats {
            mean: self.mean(),
            std: self.std_dev(),
            min: self.min(),
            max: self.max(),
        })
    }
}
