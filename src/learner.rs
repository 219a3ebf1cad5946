//! Base learner contract and bundled online learners.
//!
//! Anything that can train on single-label projections and emit a vote
//! vector is pluggable: the binary-relevance orchestrator clones one
//! prototype per label, and the active-learning controller wraps one
//! learner pair (main/shadow) per label. The controller itself implements
//! [`BaseLearner`], so controllers nest inside the orchestrator the same
//! way a plain learner does.

use crate::instance::{LabelInstance, TargetPrediction, normalize_votes};
use serde::{Deserialize, Serialize};

/// Failure to measure a model's serialized footprint. Recoverable: the
/// caller substitutes a fixed fallback contribution.
#[derive(Debug, Clone)]
pub struct ModelSizeError(pub String);

impl std::fmt::Display for ModelSizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "model size measurement failed: {}", self.0)
    }
}

impl std::error::Error for ModelSizeError {}

/// Online learner over single-label projections.
///
/// Untrained learners return an empty vote vector; consumers treat that
/// as "no prediction" (no detector feed, empty prediction slot).
pub trait BaseLearner: Send {
    /// Incorporate one labeled projection.
    fn train(&mut self, instance: &LabelInstance<'_>);

    /// Raw, unnormalized vote vector for the projection's target.
    fn votes(&self, instance: &LabelInstance<'_>) -> Vec<f64>;

    /// Normalized per-target prediction, `None` while untrained.
    fn predict(&self, instance: &LabelInstance<'_>) -> Option<TargetPrediction> {
        let votes = self.votes(instance);
        if votes.is_empty() {
            return None;
        }
        if instance.schema.target.is_numeric() {
            Some(TargetPrediction::Numeric(votes[0]))
        } else {
            Some(TargetPrediction::Distribution(normalize_votes(&votes)))
        }
    }

    /// Drop all learned state.
    fn reset(&mut self);

    /// Independent deep clone, trained state included.
    fn clone_box(&self) -> Box<dyn BaseLearner>;

    fn is_randomizable(&self) -> bool {
        false
    }

    fn set_seed(&mut self, _seed: u64) {}

    /// Serialized footprint in bytes.
    fn byte_size(&self) -> Result<usize, ModelSizeError>;

    /// Labels purchased since the last call; plain learners purchase none.
    /// Read-and-zero so periodic reporting never double-counts.
    fn consume_last_query_count(&mut self) -> u64 {
        0
    }

    /// Cumulative warning events (shadow creations).
    fn warning_count(&self) -> u64 {
        0
    }

    /// Cumulative confirmed drifts (shadow promotions).
    fn drift_count(&self) -> u64 {
        0
    }
}

impl Clone for Box<dyn BaseLearner> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

fn bincode_size<T: Serialize>(model: &T) -> Result<usize, ModelSizeError> {
    bincode::serialize(model)
        .map(|bytes| bytes.len())
        .map_err(|e| ModelSizeError(e.to_string()))
}

/// Baseline learner: votes are raw class counts of the labels seen so
/// far. Nominal targets only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MajorityClass {
    counts: Vec<f64>,
}

impl BaseLearner for MajorityClass {
    fn train(&mut self, instance: &LabelInstance<'_>) {
        let Some(target) = instance.target else {
            return;
        };
        if self.counts.is_empty() {
            self.counts = vec![0.0; instance.schema.num_classes()];
        }
        let class = target as usize;
        if class < self.counts.len() {
            self.counts[class] += 1.0;
        }
    }

    fn votes(&self, _instance: &LabelInstance<'_>) -> Vec<f64> {
        self.counts.clone()
    }

    fn reset(&mut self) {
        self.counts.clear();
    }

    fn clone_box(&self) -> Box<dyn BaseLearner> {
        Box::new(self.clone())
    }

    fn byte_size(&self) -> Result<usize, ModelSizeError> {
        bincode_size(self)
    }
}

/// Running per-feature statistics, Welford style.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FeatureStat {
    count: f64,
    mean: f64,
    m2: f64,
}

impl FeatureStat {
    fn observe(&mut self, x: f64) {
        self.count += 1.0;
        let delta = x - self.mean;
        self.mean += delta / self.count;
        self.m2 += delta * (x - self.mean);
    }

    fn variance(&self) -> f64 {
        if self.count > 1.0 {
            (self.m2 / self.count).max(1e-3)
        } else {
            1e-3
        }
    }
}

/// Online Gaussian naive Bayes over numeric inputs and a nominal target.
/// The crate's default base learner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Observation count per class.
    class_counts: Vec<f64>,
    /// Per class, per input feature.
    stats: Vec<Vec<FeatureStat>>,
    total: f64,
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self::default()
    }

    fn log_likelihood(&self, class: usize, inputs: &[f64]) -> f64 {
        let prior = self.class_counts[class] / self.total;
        if prior <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let mut log_p = prior.ln();
        for (j, &x) in inputs.iter().enumerate() {
            let stat = &self.stats[class][j];
            if stat.count < 1.0 {
                continue;
            }
            let var = stat.variance();
            let diff = x - stat.mean;
            log_p += -0.5 * (2.0 * std::f64::consts::PI * var).ln() - diff * diff / (2.0 * var);
        }
        log_p
    }
}

impl BaseLearner for GaussianNaiveBayes {
    fn train(&mut self, instance: &LabelInstance<'_>) {
        let Some(target) = instance.target else {
            return;
        };
        if self.class_counts.is_empty() {
            let k = instance.schema.num_classes();
            self.class_counts = vec![0.0; k];
            self.stats = (0..k)
                .map(|_| vec![FeatureStat::default(); instance.inputs.len()])
                .collect();
        }
        let class = target as usize;
        if class >= self.class_counts.len() {
            return;
        }
        self.class_counts[class] += 1.0;
        self.total += 1.0;
        for (j, &x) in instance.inputs.iter().enumerate() {
            self.stats[class][j].observe(x);
        }
    }

    fn votes(&self, instance: &LabelInstance<'_>) -> Vec<f64> {
        if self.total <= 0.0 {
            return Vec::new();
        }
        let log_p: Vec<f64> = (0..self.class_counts.len())
            .map(|c| self.log_likelihood(c, instance.inputs))
            .collect();
        let max_log = log_p.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if !max_log.is_finite() {
            return vec![0.0; self.class_counts.len()];
        }
        log_p.iter().map(|&lp| (lp - max_log).exp()).collect()
    }

    fn reset(&mut self) {
        self.class_counts.clear();
        self.stats.clear();
        self.total = 0.0;
    }

    fn clone_box(&self) -> Box<dyn BaseLearner> {
        Box::new(self.clone())
    }

    fn byte_size(&self) -> Result<usize, ModelSizeError> {
        bincode_size(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Attribute, LabelSchema, max_index};

    fn binary_schema() -> LabelSchema {
        LabelSchema {
            label_index: 0,
            num_inputs: 1,
            target: Attribute::binary("y"),
        }
    }

    fn labeled<'a>(inputs: &'a [f64], target: f64, schema: &'a LabelSchema) -> LabelInstance<'a> {
        LabelInstance {
            inputs,
            target: Some(target),
            schema,
        }
    }

    #[test]
    fn untrained_learners_emit_no_votes() {
        let schema = binary_schema();
        let instance = labeled(&[0.5], 0.0, &schema);
        assert!(MajorityClass::default().votes(&instance).is_empty());
        assert!(GaussianNaiveBayes::new().votes(&instance).is_empty());
        assert!(GaussianNaiveBayes::new().predict(&instance).is_none());
    }

    #[test]
    fn majority_class_tracks_label_counts() {
        let schema = binary_schema();
        let mut learner = MajorityClass::default();
        for _ in 0..3 {
            learner.train(&labeled(&[0.0], 1.0, &schema));
        }
        learner.train(&labeled(&[0.0], 0.0, &schema));

        let votes = learner.votes(&labeled(&[0.0], 1.0, &schema));
        assert_eq!(votes, vec![1.0, 3.0]);
        assert_eq!(max_index(&votes), 1, "majority label must win");

        learner.reset();
        assert!(learner.votes(&labeled(&[0.0], 1.0, &schema)).is_empty());
    }

    #[test]
    fn naive_bayes_separates_classes() {
        let schema = binary_schema();
        let mut learner = GaussianNaiveBayes::new();
        for i in 0..200 {
            let jitter = (i % 10) as f64 * 0.01;
            learner.train(&labeled(&[0.2 + jitter], 0.0, &schema));
            learner.train(&labeled(&[0.8 + jitter], 1.0, &schema));
        }

        let low = learner.votes(&labeled(&[0.15], 0.0, &schema));
        assert_eq!(max_index(&low), 0, "low inputs belong to class 0");
        let high = learner.votes(&labeled(&[0.85], 1.0, &schema));
        assert_eq!(max_index(&high), 1, "high inputs belong to class 1");
    }

    #[test]
    fn clone_box_is_independent() {
        let schema = binary_schema();
        let mut learner = GaussianNaiveBayes::new();
        learner.train(&labeled(&[0.2], 0.0, &schema));

        let snapshot = learner.clone_box();
        learner.train(&labeled(&[0.9], 1.0, &schema));

        let votes = snapshot.votes(&labeled(&[0.9], 1.0, &schema));
        assert_eq!(
            votes.len(),
            2,
            "clone keeps the trained shape of the original"
        );
        assert_eq!(max_index(&votes), 0, "clone must not see later training");
    }

    #[test]
    fn byte_size_grows_with_training() {
        let schema = binary_schema();
        let mut learner = GaussianNaiveBayes::new();
        let blank = learner.byte_size().expect("blank model serializes");
        learner.train(&labeled(&[0.2], 0.0, &schema));
        let trained = learner.byte_size().expect("trained model serializes");
        assert!(trained > blank, "training must grow the serialized model");
    }
}
