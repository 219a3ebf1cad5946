//! Budgeted active learning over drifting multi-label data streams.
//!
//! Each output target of the stream gets its own
//! [`ActiveLearningController`]: an online learner pair (deployed main
//! model plus an optional shadow candidate), a change detector over the
//! main model's correctness, and a budgeted uncertainty-sampling query
//! policy. The [`BinaryRelevance`] orchestrator fans a multi-label
//! instance out to the per-label controllers and fans their votes back
//! in as one joint prediction.
//!
//! Processing is single-pass and strictly stream-ordered: one instance
//! is fully handled before the next, nothing is revisited, and memory
//! stays bounded by the configured window sizes.

pub mod controller;
pub mod detector;
pub mod ensemble;
pub mod evaluation;
pub mod instance;
pub mod learner;
pub mod synthetic;

pub use controller::{
    ActiveLearningController, ConfigError, ControllerConfig, ControllerSnapshot, Phase,
};
pub use detector::{Adwin, AdwinConfig, AdwinFactory, ChangeDetector, DetectorFactory};
pub use ensemble::{BinaryRelevance, EnsembleSnapshot};
pub use evaluation::{EvaluationSnapshot, PrequentialEvaluator};
pub use instance::{
    Attribute, LabelInstance, LabelSchema, MultiLabelPrediction, StreamHeader, StreamInstance,
    TargetPrediction,
};
pub use learner::{BaseLearner, GaussianNaiveBayes, MajorityClass, ModelSizeError};
pub use synthetic::{DriftingStream, SyntheticConfig};
