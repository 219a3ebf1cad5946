//! Budgeted active-learning controller for one output target.
//!
//! Decides per instance whether to purchase the true label, tracks a
//! decaying estimate of recent label spend, and runs the warning/drift
//! model-replacement lifecycle: a change-detector warning clones the
//! deployed model into a blank shadow, a confirmed drift promotes the
//! shadow to main. The controller implements [`BaseLearner`], so it
//! plugs into the binary-relevance orchestrator as the per-label unit.

use crate::detector::{ChangeDetector, DetectorFactory};
use crate::instance::{LabelInstance, max_index, top_posterior};
use crate::learner::{BaseLearner, ModelSizeError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Invalid controller option, raised at construction and never during
/// streaming.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Labeling budget outside [0, 1].
    BudgetOutOfRange(f64),
    /// Uncertainty smoothing factor outside [0, 1].
    SmoothingOutOfRange(f64),
    /// Sliding window must hold at least one instance.
    ZeroWindow,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetOutOfRange(v) => {
                write!(f, "labeling budget ratio {v} outside [0, 1]")
            }
            Self::SmoothingOutOfRange(v) => {
                write!(f, "uncertainty smoothing factor {v} outside [0, 1]")
            }
            Self::ZeroWindow => write!(f, "sliding window size must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Immutable controller options, validated once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Instances at stream start queried unconditionally.
    pub initial_phase_instances: u64,
    /// Target long-run fraction of instances to query.
    pub labeling_budget_ratio: f64,
    /// Smoothing factor `b` of the uncertainty query policy.
    pub uncertainty_smoothing: f64,
    /// Window defining the query-rate EMA decay, λ = 1 − 1/window.
    pub sliding_window_size: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            initial_phase_instances: 0,
            labeling_budget_ratio: 0.10,
            uncertainty_smoothing: 0.10,
            sliding_window_size: 300,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.labeling_budget_ratio) {
            return Err(ConfigError::BudgetOutOfRange(self.labeling_budget_ratio));
        }
        if !(0.0..=1.0).contains(&self.uncertainty_smoothing) {
            return Err(ConfigError::SmoothingOutOfRange(self.uncertainty_smoothing));
        }
        if self.sliding_window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }

    fn lambda(&self) -> f64 {
        1.0 - 1.0 / self.sliding_window_size as f64
    }
}

/// Lifecycle state of one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Initial unconditional-query phase.
    Bootstrap,
    /// Budgeted querying, no replacement candidate in flight.
    Steady,
    /// A shadow model is being trained in parallel.
    Warning,
}

/// Point-in-time measurement of one controller, for periodic reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub instances_seen: u64,
    pub labels_purchased: u64,
    pub warning_count: u64,
    pub drift_count: u64,
    pub smoothed_query_rate: f64,
    pub phase: Phase,
}

/// Per-target active-learning unit: one deployed model, at most one
/// shadow candidate, one change detector, one private random source.
pub struct ActiveLearningController {
    config: ControllerConfig,
    template: Box<dyn BaseLearner>,
    detector_factory: Arc<dyn DetectorFactory>,
    main: Box<dyn BaseLearner>,
    shadow: Option<Box<dyn BaseLearner>>,
    detector: Box<dyn ChangeDetector>,
    phase: Phase,
    seed: u64,
    rng: StdRng,
    instances_seen: u64,
    labels_purchased: u64,
    recent_queries: u64,
    query_rate_ema: f64,
    smoothed_query_rate: f64,
    warning_count: u64,
    drift_count: u64,
}

impl ActiveLearningController {
    pub fn new(
        config: ControllerConfig,
        template: Box<dyn BaseLearner>,
        detector_factory: Arc<dyn DetectorFactory>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config, template, detector_factory, 1))
    }

    /// Construction path for already-validated options (cloning).
    fn from_validated(
        config: ControllerConfig,
        template: Box<dyn BaseLearner>,
        detector_factory: Arc<dyn DetectorFactory>,
        seed: u64,
    ) -> Self {
        let mut main = template.clone_box();
        main.reset();
        let detector = detector_factory.build();
        Self {
            config,
            template,
            detector_factory,
            main,
            shadow: None,
            detector,
            phase: Phase::Bootstrap,
            seed,
            rng: StdRng::seed_from_u64(seed),
            instances_seen: 0,
            labels_purchased: 0,
            recent_queries: 0,
            query_rate_ema: 0.0,
            smoothed_query_rate: 0.0,
            warning_count: 0,
            drift_count: 0,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn has_shadow(&self) -> bool {
        self.shadow.is_some()
    }

    pub fn instances_seen(&self) -> u64 {
        self.instances_seen
    }

    pub fn labels_purchased(&self) -> u64 {
        self.labels_purchased
    }

    /// Query rate observed since the bootstrap phase ended.
    pub fn observed_budget_ratio(&self) -> f64 {
        let init = self.config.initial_phase_instances;
        if self.instances_seen <= init {
            return 0.0;
        }
        self.labels_purchased.saturating_sub(init) as f64 / (self.instances_seen - init) as f64
    }

    /// Decayed estimate of recent query activity, normalized by the
    /// window size. Updated after every instance for the next read.
    pub fn smoothed_query_rate(&self) -> f64 {
        self.smoothed_query_rate
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            instances_seen: self.instances_seen,
            labels_purchased: self.labels_purchased,
            warning_count: self.warning_count,
            drift_count: self.drift_count,
            smoothed_query_rate: self.smoothed_query_rate,
            phase: self.phase,
        }
    }

    fn record_query_activity(&mut self, queried: bool) {
        let spent = if queried { 1.0 } else { 0.0 };
        self.query_rate_ema = self.query_rate_ema * self.config.lambda() + spent;
        self.smoothed_query_rate = self.query_rate_ema / self.config.sliding_window_size as f64;
    }
}

impl BaseLearner for ActiveLearningController {
    /// One step of the controller state machine.
    fn train(&mut self, instance: &LabelInstance<'_>) {
        let Some(truth) = instance.target else {
            // Inapplicable target: nothing to purchase, nothing to feed.
            return;
        };
        self.instances_seen += 1;

        // Bootstrap: query and train unconditionally, no drift or
        // uncertainty logic.
        if self.instances_seen <= self.config.initial_phase_instances {
            self.main.train(instance);
            self.labels_purchased += 1;
            self.recent_queries += 1;
            self.query_rate_ema += 1.0;
            self.smoothed_query_rate =
                self.query_rate_ema / self.config.sliding_window_size as f64;
            return;
        }
        if self.phase == Phase::Bootstrap {
            self.phase = Phase::Steady;
        }

        let budget_ratio = self.observed_budget_ratio_before_instance();

        // Feed the detector with the deployed model's correctness; an
        // untrained model produces no prediction and no observation.
        let old_estimate = self.detector.estimate();
        let mut warning = false;
        let mut drift = false;
        let votes = self.main.votes(instance);
        if !votes.is_empty() {
            let correct = max_index(&votes) == truth as usize;
            let changed = self.detector.feed(correct);
            if changed && self.detector.estimate() > old_estimate {
                warning = true;
            }
            if self.detector.drift_confirmed() {
                drift = true;
            }
        }

        if warning && self.shadow.is_none() {
            self.main.reset();
            let mut shadow = self.main.clone_box();
            shadow.reset();
            self.shadow = Some(shadow);
            self.detector = self.detector_factory.build();
            self.warning_count += 1;
            self.phase = Phase::Warning;
            debug!(
                instance = self.instances_seen,
                warnings = self.warning_count,
                "change warning: shadow model started"
            );
        }

        if drift {
            if let Some(promoted) = self.shadow.take() {
                // Ownership transfer: the old main is dropped here.
                self.main = promoted;
                self.detector = self.detector_factory.build();
                self.drift_count += 1;
                self.phase = Phase::Steady;
                debug!(
                    instance = self.instances_seen,
                    drifts = self.drift_count,
                    "drift confirmed: shadow promoted to main"
                );
            }
        }

        let mut queried = false;
        if budget_ratio < self.config.labeling_budget_ratio {
            let posterior = top_posterior(&self.main.votes(instance));
            let p = (posterior - 1.0 / instance.schema.num_classes() as f64).abs();
            let b = self.config.uncertainty_smoothing;
            let threshold = b / (b + p);
            // A full budget degenerates to fully supervised training;
            // otherwise query on a Bernoulli trial biased toward the
            // uncertain region.
            if self.config.labeling_budget_ratio >= 1.0 || self.rng.random::<f64>() < threshold {
                self.main.train(instance);
                if let Some(shadow) = self.shadow.as_mut() {
                    shadow.train(instance);
                }
                queried = true;
                self.labels_purchased += 1;
                self.recent_queries += 1;
            }
        }

        self.record_query_activity(queried);
    }

    fn votes(&self, instance: &LabelInstance<'_>) -> Vec<f64> {
        self.main.votes(instance)
    }

    fn reset(&mut self) {
        self.main = self.template.clone_box();
        self.main.reset();
        self.shadow = None;
        self.detector = self.detector_factory.build();
        self.phase = Phase::Bootstrap;
        self.rng = StdRng::seed_from_u64(self.seed);
        self.instances_seen = 0;
        self.labels_purchased = 0;
        self.recent_queries = 0;
        self.query_rate_ema = 0.0;
        self.smoothed_query_rate = 0.0;
        self.warning_count = 0;
        self.drift_count = 0;
    }

    fn clone_box(&self) -> Box<dyn BaseLearner> {
        Box::new(Self::from_validated(
            self.config.clone(),
            self.template.clone_box(),
            Arc::clone(&self.detector_factory),
            self.seed,
        ))
    }

    fn is_randomizable(&self) -> bool {
        true
    }

    fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn byte_size(&self) -> Result<usize, ModelSizeError> {
        let mut total = self.main.byte_size()?;
        if let Some(shadow) = self.shadow.as_ref() {
            total += shadow.byte_size()?;
        }
        Ok(total)
    }

    fn consume_last_query_count(&mut self) -> u64 {
        std::mem::take(&mut self.recent_queries)
    }

    fn warning_count(&self) -> u64 {
        self.warning_count
    }

    fn drift_count(&self) -> u64 {
        self.drift_count
    }
}

impl ActiveLearningController {
    /// Observed post-bootstrap query ratio with the current instance
    /// already counted in the denominator, matching the update order of
    /// the budget check.
    fn observed_budget_ratio_before_instance(&self) -> f64 {
        let init = self.config.initial_phase_instances;
        let seen = self.instances_seen.saturating_sub(init);
        if seen == 0 {
            return 0.0;
        }
        self.labels_purchased.saturating_sub(init) as f64 / seen as f64
    }
}
