//! End-to-end prequential run: synthetic drifting stream through the
//! binary-relevance ensemble of active-learning controllers.

use albr_core::{
    ActiveLearningController, AdwinConfig, AdwinFactory, BinaryRelevance, ControllerConfig,
    DriftingStream, GaussianNaiveBayes, PrequentialEvaluator, SyntheticConfig,
};
use std::sync::Arc;

fn build_ensemble(budget: f64) -> BinaryRelevance {
    let controller = ActiveLearningController::new(
        ControllerConfig {
            labeling_budget_ratio: budget,
            ..ControllerConfig::default()
        },
        Box::new(GaussianNaiveBayes::new()),
        Arc::new(AdwinFactory::new(AdwinConfig::default())),
    )
    .expect("valid config");
    BinaryRelevance::with_seed(Box::new(controller), 7)
}

#[test]
fn budgeted_run_learns_the_stream() {
    let mut ensemble = build_ensemble(0.2);
    let mut evaluator = PrequentialEvaluator::new();
    let stream = DriftingStream::new(SyntheticConfig {
        num_labels: 3,
        seed: 21,
        ..SyntheticConfig::default()
    });

    let total = 6000u64;
    for instance in stream.take(total as usize) {
        if let Some(prediction) = ensemble.predict(&instance) {
            evaluator.update(&instance, &prediction);
        }
        ensemble.train(&instance);
    }
    evaluator.add_purchased(ensemble.consume_last_query_count());

    let snapshot = evaluator.snapshot();
    assert!(
        snapshot.hamming_score > 0.8,
        "noise-free threshold concepts should be learned well, got {}",
        snapshot.hamming_score
    );

    // Spend stays in the neighborhood of budget * labels * instances.
    let spend_ratio = snapshot.labels_purchased as f64 / (3.0 * total as f64);
    assert!(
        spend_ratio < 0.35,
        "label spend ratio {spend_ratio} must stay near the 0.2 budget"
    );
    assert!(spend_ratio > 0.02, "some labels must have been purchased");
}

#[test]
fn drift_run_recovers_and_reports_lifecycle() {
    let mut ensemble = build_ensemble(1.0);
    let stream = DriftingStream::new(SyntheticConfig {
        num_inputs: 1,
        num_labels: 1,
        drift_at: Some(3000),
        seed: 13,
        ..SyntheticConfig::default()
    });

    let mut evaluator_after = PrequentialEvaluator::new();
    for (i, instance) in stream.take(6000).enumerate() {
        if i >= 5000 {
            if let Some(prediction) = ensemble.predict(&instance) {
                evaluator_after.update(&instance, &prediction);
            }
        }
        ensemble.train(&instance);
    }

    let snapshot = ensemble.snapshot();
    assert!(
        snapshot.warning_count >= 1,
        "the concept inversion must raise at least one warning"
    );

    let tail = evaluator_after.snapshot();
    assert!(
        tail.hamming_score > 0.8,
        "accuracy must recover after the drift, got {}",
        tail.hamming_score
    );
}
