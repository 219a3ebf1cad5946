//! Prequential (test-then-train) multi-label evaluation.
//!
//! Tracks the two headline metrics of the original experiment pipeline,
//! subset accuracy and hamming score, plus the cumulative label spend
//! reported by the learners. Targets missing on an instance are excluded
//! from both metrics rather than counted as errors.

use crate::instance::{MultiLabelPrediction, StreamInstance};
use serde::{Deserialize, Serialize};

/// Point-in-time evaluation figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSnapshot {
    pub examples: u64,
    /// Fraction of examples with every applicable label correct.
    pub subset_accuracy: f64,
    /// Fraction of applicable label decisions that were correct.
    pub hamming_score: f64,
    pub labels_purchased: u64,
}

/// Streaming accumulator over (instance, prediction) pairs.
#[derive(Debug, Clone, Default)]
pub struct PrequentialEvaluator {
    examples: u64,
    subset_correct: u64,
    label_decisions: u64,
    label_correct: u64,
    labels_purchased: u64,
}

impl PrequentialEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one prediction against the instance's true labels. Called
    /// before the instance is used for training.
    pub fn update(&mut self, instance: &StreamInstance, prediction: &MultiLabelPrediction) {
        self.examples += 1;
        let mut all_correct = true;
        for i in 0..instance.num_outputs() {
            let Some(truth) = instance.output(i) else {
                continue;
            };
            self.label_decisions += 1;
            let predicted = prediction.get(i).and_then(|slot| slot.top_class());
            if predicted == Some(truth as usize) {
                self.label_correct += 1;
            } else {
                all_correct = false;
            }
        }
        if all_correct {
            self.subset_correct += 1;
        }
    }

    /// Fold in the labels purchased since the last reporting interval.
    pub fn add_purchased(&mut self, count: u64) {
        self.labels_purchased += count;
    }

    pub fn snapshot(&self) -> EvaluationSnapshot {
        let examples = self.examples.max(1) as f64;
        let decisions = self.label_decisions.max(1) as f64;
        EvaluationSnapshot {
            examples: self.examples,
            subset_accuracy: self.subset_correct as f64 / examples,
            hamming_score: self.label_correct as f64 / decisions,
            labels_purchased: self.labels_purchased,
        }
    }
}
