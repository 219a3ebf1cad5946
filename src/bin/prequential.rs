//! Prequential experiment runner over the synthetic drifting stream.
//!
//! Test-then-train loop: predict, score, train, and every reporting
//! interval emit one JSON snapshot line combining evaluation figures
//! with the ensemble's budget and lifecycle counters.
//!
//! Usage: prequential [instances] [budget] [drift_at]

use albr_core::{
    ActiveLearningController, AdwinConfig, AdwinFactory, BinaryRelevance, ControllerConfig,
    DriftingStream, GaussianNaiveBayes, PrequentialEvaluator, SyntheticConfig,
};
use std::sync::Arc;
use tracing::info;

const REPORT_INTERVAL: u64 = 1000;

fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let mut args = std::env::args().skip(1);
    let instances: u64 = args
        .next()
        .and_then(|a| a.parse().ok())
        .unwrap_or(20_000);
    let budget: f64 = args.next().and_then(|a| a.parse().ok()).unwrap_or(0.10);
    let drift_at: Option<u64> = args.next().and_then(|a| a.parse().ok());

    let config = ControllerConfig {
        labeling_budget_ratio: budget,
        ..ControllerConfig::default()
    };
    let controller = match ActiveLearningController::new(
        config,
        Box::new(GaussianNaiveBayes::new()),
        Arc::new(AdwinFactory::new(AdwinConfig::default())),
    ) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    let mut ensemble = BinaryRelevance::with_seed(Box::new(controller), 1);

    let stream = DriftingStream::new(SyntheticConfig {
        noise: 0.05,
        drift_at,
        ..SyntheticConfig::default()
    });
    let mut evaluator = PrequentialEvaluator::new();

    info!(instances, budget, ?drift_at, "prequential run starting");

    for (i, instance) in stream.take(instances as usize).enumerate() {
        if let Some(prediction) = ensemble.predict(&instance) {
            evaluator.update(&instance, &prediction);
        }
        ensemble.train(&instance);

        if (i as u64 + 1) % REPORT_INTERVAL == 0 {
            evaluator.add_purchased(ensemble.consume_last_query_count());
            let report = serde_json::json!({
                "instance": i + 1,
                "evaluation": evaluator.snapshot(),
                "ensemble": ensemble.snapshot(),
            });
            println!("{report}");
        }
    }

    evaluator.add_purchased(ensemble.consume_last_query_count());
    let finals = evaluator.snapshot();
    info!(
        examples = finals.examples,
        subset_accuracy = finals.subset_accuracy,
        hamming_score = finals.hamming_score,
        labels_purchased = finals.labels_purchased,
        "prequential run finished"
    );
}
