//! Change detection over a binary correctness stream.
//!
//! The controller feeds each detector one observation per instance: did
//! the deployed model classify the instance correctly. The detector keeps
//! a running error-rate estimate and reports two signals: the estimate
//! shifted on this observation (`feed` returns true), and the shift was
//! strong enough to confirm a drift (`drift_confirmed`).
//!
//! Detectors are never reset in place. The owning controller replaces the
//! whole detector through a [`DetectorFactory`] whenever a warning or a
//! drift is handled, so no pre-change statistics survive the transition.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Oracle contract consumed by the active-learning controller.
pub trait ChangeDetector: Send {
    /// Feed one correctness observation. Returns true when the internal
    /// estimate just changed.
    fn feed(&mut self, correct: bool) -> bool;

    /// Current error-rate estimate in [0, 1].
    fn estimate(&self) -> f64;

    /// Whether the most recent observation confirmed a drift.
    fn drift_confirmed(&self) -> bool;
}

/// Builds fresh detectors. Construction is the only reset mechanism.
pub trait DetectorFactory: Send + Sync {
    fn build(&self) -> Box<dyn ChangeDetector>;
}

/// Tuning for [`Adwin`]. The warn delta governs estimate-shift events,
/// the stricter drift delta governs drift confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdwinConfig {
    pub warn_delta: f64,
    pub drift_delta: f64,
    pub max_window: usize,
    pub min_window: usize,
}

impl Default for AdwinConfig {
    fn default() -> Self {
        Self {
            warn_delta: 0.05,
            drift_delta: 0.002,
            max_window: 1000,
            min_window: 30,
        }
    }
}

/// Adaptive-windowing detector over a 0/1 error stream.
///
/// Keeps a short current window of the most recent observations and a
/// long reference window of everything older, both with running sums.
/// When the two means diverge beyond a Bernstein bound at the warn
/// level, the estimate jumps to the recent mean; at the stricter drift
/// level the whole history is cut and the drift flag raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adwin {
    config: AdwinConfig,
    reference: VecDeque<f64>,
    current: VecDeque<f64>,
    ref_sum: f64,
    curr_sum: f64,
    error_estimate: f64,
    drift_flag: bool,
}

impl Adwin {
    pub fn new(config: AdwinConfig) -> Self {
        Self {
            reference: VecDeque::with_capacity(config.max_window),
            current: VecDeque::with_capacity(config.min_window + 1),
            config,
            ref_sum: 0.0,
            curr_sum: 0.0,
            error_estimate: 0.0,
            drift_flag: false,
        }
    }

    fn epsilon(&self, delta: f64, n_ref: f64, n_curr: f64, variance: f64) -> f64 {
        let inv = 1.0 / n_ref + 1.0 / n_curr;
        let ln_term = (2.0 / delta).ln();
        (2.0 * variance * inv * ln_term).sqrt() + (2.0 / 3.0) * inv * ln_term
    }

    fn total_mean(&self) -> f64 {
        let n = (self.reference.len() + self.current.len()) as f64;
        if n > 0.0 {
            (self.ref_sum + self.curr_sum) / n
        } else {
            0.0
        }
    }
}

impl ChangeDetector for Adwin {
    fn feed(&mut self, correct: bool) -> bool {
        let value = if correct { 0.0 } else { 1.0 };
        self.drift_flag = false;

        self.current.push_back(value);
        self.curr_sum += value;

        // Age the oldest recent observation into the reference window.
        if self.current.len() > self.config.min_window {
            if let Some(old) = self.current.pop_front() {
                self.curr_sum -= old;
                self.reference.push_back(old);
                self.ref_sum += old;
            }
            let ref_cap = self.config.max_window.saturating_sub(self.config.min_window);
            if self.reference.len() > ref_cap {
                if let Some(removed) = self.reference.pop_front() {
                    self.ref_sum -= removed;
                }
            }
        }

        if self.reference.len() >= self.config.min_window
            && self.current.len() >= self.config.min_window
        {
            let n_ref = self.reference.len() as f64;
            let n_curr = self.current.len() as f64;
            let mean_ref = self.ref_sum / n_ref;
            let mean_curr = self.curr_sum / n_curr;
            let pooled = (self.ref_sum + self.curr_sum) / (n_ref + n_curr);
            // Bernoulli variance with a floor for degenerate windows.
            let variance = (pooled * (1.0 - pooled)).max(1e-4);
            let diff = (mean_curr - mean_ref).abs();

            if diff > self.epsilon(self.config.drift_delta, n_ref, n_curr, variance) {
                self.drift_flag = true;
                self.error_estimate = mean_curr;
                self.reference.clear();
                self.current.clear();
                self.ref_sum = 0.0;
                self.curr_sum = 0.0;
                return true;
            }
            if diff > self.epsilon(self.config.warn_delta, n_ref, n_curr, variance) {
                self.error_estimate = mean_curr;
                return true;
            }
        }

        self.error_estimate = self.total_mean();
        false
    }

    fn estimate(&self) -> f64 {
        self.error_estimate
    }

    fn drift_confirmed(&self) -> bool {
        self.drift_flag
    }
}

/// Default factory producing [`Adwin`] detectors from one shared config.
#[derive(Debug, Clone, Default)]
pub struct AdwinFactory {
    pub config: AdwinConfig,
}

impl AdwinFactory {
    pub fn new(config: AdwinConfig) -> Self {
        Self { config }
    }
}

impl DetectorFactory for AdwinFactory {
    fn build(&self) -> Box<dyn ChangeDetector> {
        Box::new(Adwin::new(self.config.clone()))
    }
}
