//! Isolation forest: an ensemble of random partitioning trees.
//!
//! Each tree is grown on a subsample of at most `max_samples` rows by
//! picking a random non-constant feature and a uniform split value until
//! every leaf holds one row or the depth limit `ceil(log2(sample_size))` is
//! reached. A point's raw score is `-2^(-E[h(x)] / c(sample_size))`, so a
//! *lower* score means a shorter average path and a more anomalous point.
//!
//! Training is deterministic for a given seed and matrix: trees are grown
//! in order from a single ChaCha stream.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::features::{FeatureVector, FEATURE_COUNT};
use crate::error::{Result, TelemetryError};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Training hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub tree_count: usize,
    /// Expected outlier fraction in (0, 0.5]. Only sets the model's own
    /// decision offset.
    pub contamination: f64,
    pub seed: u64,
    pub max_samples: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            tree_count: 200,
            contamination: 0.03,
            seed: 42,
            max_samples: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// One tree stored as a flat node array; index 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(data: &[FeatureVector], rows: &mut [usize], max_depth: usize, rng: &mut ChaCha8Rng) -> Self {
        let mut nodes = Vec::new();
        grow_node(data, rows, 0, max_depth, rng, &mut nodes);
        Self { nodes }
    }

    /// Every split must name a known feature and point strictly forward to
    /// nodes that exist, which also rules out cycles.
    fn check(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                threshold,
                left,
                right,
            } = node
            {
                if *feature >= FEATURE_COUNT {
                    return Err(format!("node {i} splits on unknown feature {feature}"));
                }
                if threshold.is_nan() {
                    return Err(format!("node {i} has a NaN threshold"));
                }
                for child in [*left, *right] {
                    if child <= i || child >= self.nodes.len() {
                        return Err(format!("node {i} has invalid child index {child}"));
                    }
                }
            }
        }
        Ok(())
    }

    fn path_length(&self, x: &FeatureVector) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
                Some(Node::Leaf { size }) => return depth + average_path_length(*size),
                None => return depth,
            }
        }
    }
}

fn grow_node(
    data: &[FeatureVector],
    rows: &mut [usize],
    depth: usize,
    max_depth: usize,
    rng: &mut ChaCha8Rng,
    nodes: &mut Vec<Node>,
) -> usize {
    let id = nodes.len();
    nodes.push(Node::Leaf { size: rows.len() });
    if depth >= max_depth || rows.len() <= 1 {
        return id;
    }

    let mut lo = [f64::INFINITY; FEATURE_COUNT];
    let mut hi = [f64::NEG_INFINITY; FEATURE_COUNT];
    for &r in rows.iter() {
        for f in 0..FEATURE_COUNT {
            lo[f] = lo[f].min(data[r][f]);
            hi[f] = hi[f].max(data[r][f]);
        }
    }
    // an infinite field leaves no finite range to draw a split from
    let candidates: Vec<usize> = (0..FEATURE_COUNT)
        .filter(|&f| hi[f] > lo[f] && (hi[f] - lo[f]).is_finite())
        .collect();
    if candidates.is_empty() {
        return id;
    }

    let feature = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(lo[feature]..hi[feature]);

    // in-place partition: rows with x <= threshold first
    let mut split = 0;
    for i in 0..rows.len() {
        if data[rows[i]][feature] <= threshold {
            rows.swap(i, split);
            split += 1;
        }
    }
    let (left_rows, right_rows) = rows.split_at_mut(split);
    let left = grow_node(data, left_rows, depth + 1, max_depth, rng, nodes);
    let right = grow_node(data, right_rows, depth + 1, max_depth, rng, nodes);
    nodes[id] = Node::Split {
        feature,
        threshold,
        left,
        right,
    };
    id
}

/// Average path length of an unsuccessful BST search over `n` points,
/// used to normalise depths and to credit unsplit leaves.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Trained isolation forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    params: ForestParams,
    sample_size: usize,
    /// Raw score at the contamination quantile of the training data.
    offset: f64,
    trees: Vec<IsolationTree>,
}

impl IsolationForest {
    /// Fit a forest on `data`.
    pub fn fit(data: &[FeatureVector], params: &ForestParams) -> Result<Self> {
        if data.is_empty() {
            return Err(TelemetryError::EmptyDataset { operation: "training" });
        }
        if params.tree_count == 0 || params.max_samples == 0 {
            return Err(TelemetryError::Config(
                "tree_count and max_samples must be positive".to_string(),
            ));
        }
        if !(params.contamination > 0.0 && params.contamination <= 0.5) {
            return Err(TelemetryError::Config(format!(
                "contamination must be in (0, 0.5], got {}",
                params.contamination
            )));
        }

        let sample_size = params.max_samples.min(data.len());
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

        let trees = (0..params.tree_count)
            .map(|_| {
                let mut rows = index::sample(&mut rng, data.len(), sample_size).into_vec();
                IsolationTree::grow(data, &mut rows, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            params: *params,
            sample_size,
            offset: -0.5,
            trees,
        };
        let training_scores = forest.score_samples(data);
        forest.offset = percentile(&training_scores, params.contamination * 100.0);
        debug!(
            trees = params.tree_count,
            sample_size,
            offset = forest.offset,
            "isolation forest trained"
        );
        Ok(forest)
    }

    /// Raw score per row; lower means more anomalous. Always in [-1, 0).
    pub fn score_samples(&self, data: &[FeatureVector]) -> Vec<f64> {
        let norm = average_path_length(self.sample_size).max(f64::MIN_POSITIVE);
        data.iter()
            .map(|x| {
                let mean_depth = self.trees.iter().map(|t| t.path_length(x)).sum::<f64>()
                    / self.trees.len() as f64;
                -(2f64.powf(-mean_depth / norm))
            })
            .collect()
    }

    /// Raw score shifted by the contamination offset; negative values are
    /// the model's own outliers.
    pub fn decision_function(&self, data: &[FeatureVector]) -> Vec<f64> {
        self.score_samples(data).into_iter().map(|s| s - self.offset).collect()
    }

    pub fn is_outlier(&self, data: &[FeatureVector]) -> Vec<bool> {
        self.decision_function(data).into_iter().map(|d| d < 0.0).collect()
    }

    /// Structural check for a forest read from disk.
    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(TelemetryError::ModelArtifact("forest has no trees".to_string()));
        }
        if self.sample_size == 0 {
            return Err(TelemetryError::ModelArtifact("sample size is zero".to_string()));
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.check()
                .map_err(|e| TelemetryError::ModelArtifact(format!("tree {t}: {e}")))?;
        }
        Ok(())
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

/// Linear-interpolated percentile, `q` in [0, 100].
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
