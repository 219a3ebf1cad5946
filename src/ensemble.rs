//! Binary-relevance orchestrator.
//!
//! Decomposes each multi-label stream instance into one single-target
//! projection per output attribute, routes every projection to its own
//! per-label learner (normally an [`ActiveLearningController`]), and
//! recombines the per-label votes into one joint prediction.
//!
//! The ensemble shape is a stream-header property, so sizing happens on
//! the first training call; per-label projection schemas are built
//! exactly once and cached behind `Arc`s, never rebuilt from later
//! instances.
//!
//! [`ActiveLearningController`]: crate::controller::ActiveLearningController

use crate::instance::{
    LabelInstance, LabelSchema, MultiLabelPrediction, StreamInstance, TargetPrediction,
    normalize_votes,
};
use crate::learner::BaseLearner;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Size contribution substituted when a learner fails to serialize.
pub const FALLBACK_MODEL_BYTES: usize = 1024;
/// Size reported before the ensemble has been initialized.
pub const UNINITIALIZED_ESTIMATE_BYTES: usize = 100 * 1024;

/// Ensemble shape: unknown until the first training call reveals the
/// number of output targets.
enum EnsembleState {
    Uninitialized,
    Initialized {
        learners: Vec<Box<dyn BaseLearner>>,
        schemas: Vec<Option<Arc<LabelSchema>>>,
    },
}

/// Aggregated measurement across all per-label learners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleSnapshot {
    pub num_labels: usize,
    pub warning_count: u64,
    pub drift_count: u64,
    pub model_bytes: usize,
}

/// Binary-relevance ensemble over one prototype learner.
pub struct BinaryRelevance {
    template: Box<dyn BaseLearner>,
    master_seed: u64,
    state: EnsembleState,
}

impl BinaryRelevance {
    pub fn new(template: Box<dyn BaseLearner>) -> Self {
        Self {
            template,
            master_seed: 1,
            state: EnsembleState::Uninitialized,
        }
    }

    pub fn with_seed(template: Box<dyn BaseLearner>, master_seed: u64) -> Self {
        Self {
            template,
            master_seed,
            state: EnsembleState::Uninitialized,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, EnsembleState::Initialized { .. })
    }

    pub fn num_labels(&self) -> usize {
        match &self.state {
            EnsembleState::Uninitialized => 0,
            EnsembleState::Initialized { learners, .. } => learners.len(),
        }
    }

    /// Cached projection schema for label `i`, once built.
    pub fn label_schema(&self, i: usize) -> Option<&Arc<LabelSchema>> {
        match &self.state {
            EnsembleState::Uninitialized => None,
            EnsembleState::Initialized { schemas, .. } => {
                schemas.get(i).and_then(|s| s.as_ref())
            }
        }
    }

    /// Train every applicable per-label learner on its projection of the
    /// instance. The first call establishes the ensemble shape.
    pub fn train(&mut self, instance: &StreamInstance) {
        if let EnsembleState::Uninitialized = self.state {
            let n = instance.num_outputs();
            let learners = (0..n)
                .map(|i| {
                    let mut learner = self.template.clone_box();
                    learner.reset();
                    if learner.is_randomizable() {
                        learner.set_seed(derive_seed(self.master_seed, i));
                    }
                    learner
                })
                .collect();
            self.state = EnsembleState::Initialized {
                learners,
                schemas: vec![None; n],
            };
            debug!(labels = n, "binary-relevance ensemble initialized");
        }

        let EnsembleState::Initialized { learners, schemas } = &mut self.state else {
            return;
        };
        for (i, learner) in learners.iter_mut().enumerate() {
            if !instance.is_applicable(i) {
                continue;
            }
            let schema = schemas[i]
                .get_or_insert_with(|| Arc::new(LabelSchema::from_header(instance.header(), i)))
                .clone();
            let projection = LabelInstance::project(instance, &schema);
            learner.train(&projection);
        }
    }

    /// Joint prediction, one slot per output target. `None` before any
    /// training has occurred. Slots stay empty for inapplicable targets
    /// and for learners that have not produced votes yet.
    pub fn predict(&self, instance: &StreamInstance) -> Option<MultiLabelPrediction> {
        let EnsembleState::Initialized { learners, schemas } = &self.state else {
            debug!("prediction requested before ensemble initialization");
            return None;
        };

        let mut prediction = MultiLabelPrediction::with_slots(learners.len());
        for (i, learner) in learners.iter().enumerate() {
            if !instance.is_applicable(i) {
                continue;
            }
            let Some(schema) = schemas.get(i).and_then(|s| s.as_ref()) else {
                continue;
            };
            let projection = LabelInstance::project(instance, schema);
            let votes = learner.votes(&projection);
            if votes.is_empty() {
                continue;
            }
            let slot = if schema.target.is_numeric() {
                TargetPrediction::Numeric(votes[0])
            } else {
                TargetPrediction::Distribution(normalize_votes(&votes))
            };
            prediction.set(i, slot);
        }
        Some(prediction)
    }

    /// Total serialized footprint across all per-label learners. A
    /// learner that fails to measure contributes a fixed fallback so the
    /// aggregate keeps reporting.
    pub fn estimate_model_size(&self) -> usize {
        match &self.state {
            EnsembleState::Uninitialized => UNINITIALIZED_ESTIMATE_BYTES,
            EnsembleState::Initialized { learners, .. } => learners
                .iter()
                .enumerate()
                .map(|(i, learner)| {
                    learner.byte_size().unwrap_or_else(|e| {
                        warn!(label = i, error = %e, "model size measurement failed");
                        FALLBACK_MODEL_BYTES
                    })
                })
                .sum(),
        }
    }

    /// Labels purchased across all learners since the last call.
    /// Read-and-zero, safe for periodic reporting.
    pub fn consume_last_query_count(&mut self) -> u64 {
        match &mut self.state {
            EnsembleState::Uninitialized => 0,
            EnsembleState::Initialized { learners, .. } => learners
                .iter_mut()
                .map(|l| l.consume_last_query_count())
                .sum(),
        }
    }

    pub fn snapshot(&self) -> EnsembleSnapshot {
        let (warning_count, drift_count) = match &self.state {
            EnsembleState::Uninitialized => (0, 0),
            EnsembleState::Initialized { learners, .. } => learners
                .iter()
                .fold((0, 0), |(w, d), l| (w + l.warning_count(), d + l.drift_count())),
        };
        EnsembleSnapshot {
            num_labels: self.num_labels(),
            warning_count,
            drift_count,
            model_bytes: self.estimate_model_size(),
        }
    }

    /// Discard the ensemble; the next training call re-establishes the
    /// shape from the stream.
    pub fn reset(&mut self) {
        self.state = EnsembleState::Uninitialized;
    }
}

/// Per-label random seed, derived deterministically from the master seed
/// so label processing order never affects reproducibility.
fn derive_seed(master_seed: u64, label_index: usize) -> u64 {
    let mut buf = [0u8; 16];
    buf[..8].copy_from_slice(&master_seed.to_le_bytes());
    buf[8..].copy_from_slice(&(label_index as u64).to_le_bytes());
    xxhash_rust::xxh3::xxh3_64(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ActiveLearningController, ControllerConfig};
    use crate::detector::{AdwinConfig, AdwinFactory};
    use crate::instance::{Attribute, StreamHeader, max_index};
    use crate::learner::{GaussianNaiveBayes, MajorityClass, ModelSizeError};

    fn three_label_header() -> Arc<StreamHeader> {
        Arc::new(StreamHeader::new(
            vec![Attribute::numeric("x0"), Attribute::numeric("x1")],
            vec![
                Attribute::binary("y0"),
                Attribute::binary("y1"),
                Attribute::binary("y2"),
            ],
        ))
    }

    fn instance(
        header: &Arc<StreamHeader>,
        inputs: Vec<f64>,
        outputs: Vec<Option<f64>>,
    ) -> StreamInstance {
        StreamInstance::new(header.clone(), inputs, outputs)
    }

    fn controller_template() -> Box<dyn BaseLearner> {
        Box::new(
            ActiveLearningController::new(
                ControllerConfig {
                    labeling_budget_ratio: 1.0,
                    ..ControllerConfig::default()
                },
                Box::new(GaussianNaiveBayes::new()),
                Arc::new(AdwinFactory::new(AdwinConfig::default())),
            )
            .expect("valid config"),
        )
    }

    #[test]
    fn predict_before_training_is_none() {
        let header = three_label_header();
        let ensemble = BinaryRelevance::new(Box::new(MajorityClass::default()));
        let inst = instance(&header, vec![0.1, 0.2], vec![Some(0.0), Some(1.0), Some(0.0)]);
        assert!(ensemble.predict(&inst).is_none());
        assert!(!ensemble.is_initialized());
    }

    #[test]
    fn first_train_sizes_the_ensemble() {
        let header = three_label_header();
        let mut ensemble = BinaryRelevance::new(Box::new(MajorityClass::default()));
        let inst = instance(&header, vec![0.1, 0.2], vec![Some(0.0), Some(1.0), Some(0.0)]);
        ensemble.train(&inst);

        assert!(ensemble.is_initialized());
        assert_eq!(ensemble.num_labels(), 3);

        let prediction = ensemble.predict(&inst).expect("initialized");
        assert_eq!(prediction.num_slots(), 3, "one slot per output target");
        for i in 0..3 {
            assert!(prediction.get(i).is_some(), "slot {i} must be populated");
        }
    }

    #[test]
    fn schemas_are_built_exactly_once() {
        let header = three_label_header();
        let mut ensemble = BinaryRelevance::new(Box::new(MajorityClass::default()));
        ensemble.train(&instance(
            &header,
            vec![0.1, 0.2],
            vec![Some(0.0), Some(1.0), Some(0.0)],
        ));
        let first = ensemble.label_schema(1).expect("built during training").clone();

        ensemble.train(&instance(
            &header,
            vec![0.9, 0.4],
            vec![Some(1.0), Some(1.0), Some(1.0)],
        ));
        let second = ensemble.label_schema(1).expect("still cached");
        assert!(
            Arc::ptr_eq(&first, second),
            "schema must be referentially identical across instances"
        );
        assert_eq!(first.label_index, 1);
        assert_eq!(first.target.name(), "y1");
    }

    #[test]
    fn inapplicable_targets_are_skipped() {
        let header = three_label_header();
        let mut ensemble = BinaryRelevance::new(Box::new(MajorityClass::default()));
        for _ in 0..5 {
            ensemble.train(&instance(
                &header,
                vec![0.1, 0.2],
                vec![Some(0.0), Some(1.0), Some(1.0)],
            ));
        }

        let sparse = instance(&header, vec![0.1, 0.2], vec![Some(0.0), None, Some(1.0)]);
        let prediction = ensemble.predict(&sparse).expect("initialized");
        assert_eq!(prediction.num_slots(), 3);
        assert!(prediction.get(0).is_some());
        assert!(
            prediction.get(1).is_none(),
            "missing target must leave its slot empty"
        );
        assert!(prediction.get(2).is_some());
    }

    #[test]
    fn categorical_votes_are_normalized() {
        let header = three_label_header();
        let mut ensemble = BinaryRelevance::new(Box::new(MajorityClass::default()));
        for i in 0..10 {
            ensemble.train(&instance(
                &header,
                vec![0.1, 0.2],
                vec![Some((i % 2) as f64), Some(1.0), Some(0.0)],
            ));
        }
        let inst = instance(&header, vec![0.1, 0.2], vec![Some(0.0), Some(1.0), Some(0.0)]);
        let prediction = ensemble.predict(&inst).expect("initialized");
        for i in 0..3 {
            let Some(TargetPrediction::Distribution(dist)) = prediction.get(i) else {
                panic!("expected a distribution slot for label {i}");
            };
            let total: f64 = dist.iter().sum();
            assert!(
                (total - 1.0).abs() < 1e-9,
                "label {i} distribution must sum to 1"
            );
        }
        let Some(TargetPrediction::Distribution(d1)) = prediction.get(1) else {
            unreachable!()
        };
        assert_eq!(max_index(d1), 1, "label 1 was always positive");
    }

    #[test]
    fn numeric_targets_pass_votes_through() {
        /// Regressor stub: remembers the last trained target value.
        #[derive(Debug, Clone, Default)]
        struct LastValue {
            value: Option<f64>,
        }
        impl BaseLearner for LastValue {
            fn train(&mut self, instance: &LabelInstance<'_>) {
                if let Some(target) = instance.target {
                    self.value = Some(target);
                }
            }
            fn votes(&self, _instance: &LabelInstance<'_>) -> Vec<f64> {
                self.value.map(|v| vec![v]).unwrap_or_default()
            }
            fn reset(&mut self) {
                self.value = None;
            }
            fn clone_box(&self) -> Box<dyn BaseLearner> {
                Box::new(self.clone())
            }
            fn byte_size(&self) -> Result<usize, ModelSizeError> {
                Ok(std::mem::size_of::<f64>())
            }
        }

        let header = Arc::new(StreamHeader::new(
            vec![Attribute::numeric("x0")],
            vec![Attribute::numeric("t0"), Attribute::binary("y1")],
        ));
        let mut ensemble = BinaryRelevance::new(Box::new(LastValue::default()));
        ensemble.train(&instance(&header, vec![0.5], vec![Some(3.25), Some(1.0)]));

        let prediction = ensemble
            .predict(&instance(&header, vec![0.5], vec![Some(0.0), Some(1.0)]))
            .expect("initialized");
        assert_eq!(
            prediction.get(0),
            Some(&TargetPrediction::Numeric(3.25)),
            "numeric targets carry the raw vote through"
        );
    }

    #[test]
    fn model_size_substitutes_fallback_on_failure() {
        /// Learner whose footprint cannot be measured.
        #[derive(Debug, Clone, Default)]
        struct Unmeasurable;
        impl BaseLearner for Unmeasurable {
            fn train(&mut self, _instance: &LabelInstance<'_>) {}
            fn votes(&self, _instance: &LabelInstance<'_>) -> Vec<f64> {
                vec![1.0, 1.0]
            }
            fn reset(&mut self) {}
            fn clone_box(&self) -> Box<dyn BaseLearner> {
                Box::new(self.clone())
            }
            fn byte_size(&self) -> Result<usize, ModelSizeError> {
                Err(ModelSizeError("not serializable".to_string()))
            }
        }

        let header = three_label_header();
        let mut ensemble = BinaryRelevance::new(Box::new(Unmeasurable));
        assert_eq!(
            ensemble.estimate_model_size(),
            UNINITIALIZED_ESTIMATE_BYTES,
            "uninitialized ensembles report the placeholder size"
        );

        ensemble.train(&instance(
            &header,
            vec![0.1, 0.2],
            vec![Some(0.0), Some(1.0), Some(0.0)],
        ));
        assert_eq!(
            ensemble.estimate_model_size(),
            3 * FALLBACK_MODEL_BYTES,
            "each failed measurement contributes the fallback size"
        );
    }

    #[test]
    fn full_budget_ensemble_purchases_every_label() {
        let header = three_label_header();
        let mut ensemble = BinaryRelevance::with_seed(controller_template(), 9);
        let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(3);

        let n = 200;
        for _ in 0..n {
            let x0: f64 = rand::Rng::random(&mut rng);
            let x1: f64 = rand::Rng::random(&mut rng);
            let outputs = vec![
                Some(if x0 > 0.5 { 1.0 } else { 0.0 }),
                Some(if x1 > 0.5 { 1.0 } else { 0.0 }),
                Some(if x0 + x1 > 1.0 { 1.0 } else { 0.0 }),
            ];
            ensemble.train(&instance(&header, vec![x0, x1], outputs));
        }

        assert_eq!(
            ensemble.consume_last_query_count(),
            3 * n,
            "budget 1.0 must purchase every label of every instance"
        );
        assert_eq!(ensemble.consume_last_query_count(), 0, "read-and-zero");

        let snapshot = ensemble.snapshot();
        assert_eq!(snapshot.num_labels, 3);
        assert!(snapshot.model_bytes > 0);
    }
}
