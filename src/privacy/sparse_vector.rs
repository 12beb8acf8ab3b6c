//! Sparse Vector Technique gate.
//!
//! The gate compares a noisy agreement rate against a public threshold. The
//! comparison itself leaks information, so the gate's ε is charged on every
//! call regardless of the outcome.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::mechanisms::LaplaceMechanism;

/// Outcome of one gate check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvtDecision {
    /// Whether the noisy score cleared the threshold.
    pub accepted: bool,
    /// ε to charge for this check (always the gate's ε).
    pub eps_charged: f64,
}

/// Threshold gate on a score in `[0, 1]`, sensitivity 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvtGate {
    threshold: f64,
    epsilon_gate: f64,
    epsilon_report: f64,
}

impl SvtGate {
    /// Create a gate.
    ///
    /// `epsilon_report` is held in reserve for reporting the value of an
    /// accepted score under extra noise. Nothing spends it yet; it is carried
    /// so the configured allocation stays visible.
    pub fn new(threshold: f64, epsilon_gate: f64, epsilon_report: f64) -> Self {
        Self {
            threshold,
            epsilon_gate,
            epsilon_report,
        }
    }

    /// Acceptance threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// ε charged per check.
    pub fn epsilon_gate(&self) -> f64 {
        self.epsilon_gate
    }

    /// ε reserved for value reporting (unspent).
    pub fn epsilon_report(&self) -> f64 {
        self.epsilon_report
    }

    /// Check `agreement` against the threshold under Laplace(0, 1/ε_gate) noise.
    pub fn decide<R: Rng + ?Sized>(&self, agreement: f64, rng: &mut R) -> SvtDecision {
        let mech = LaplaceMechanism::new(1.0, self.epsilon_gate);
        let noisy = agreement + mech.sample(rng);
        tracing::trace!(agreement, noisy, threshold = self.threshold, "svt check");
        SvtDecision {
            accepted: noisy >= self.threshold,
            eps_charged: self.epsilon_gate,
        }
    }
}
