//! Calibrated noise mechanisms.
//!
//! ## Calibration
//!
//! | Mechanism | Guarantee | Scale |
//! |-----------|-----------|-------|
//! | Laplace | (ε, 0)-DP | `b = Δf / ε` |
//! | Gaussian | (ε, δ)-DP | `σ = Δf · sqrt(2·ln(1.25/δ)) / ε` |
//!
//! ## Clamping
//!
//! Mechanisms never reject their parameters. ε and δ are clamped to a strictly
//! positive floor so a zero or negative value degrades to "a lot of noise"
//! instead of a division by zero. Sensitivity is taken by absolute value and
//! capped at [`SENSITIVITY_CEILING`]; an infinite or NaN sensitivity lands on
//! the cap, never on zero. Every draw is finite.
//!
//! ## Randomness
//!
//! Mechanisms hold no random state. Callers pass the generator on every draw,
//! so a run seeded once is reproducible end to end.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Smallest ε a mechanism will calibrate against.
pub const EPSILON_FLOOR: f64 = 1e-12;

/// Smallest δ the Gaussian mechanism will calibrate against.
pub const DELTA_FLOOR: f64 = 1e-12;

/// Largest δ the Gaussian mechanism will calibrate against.
///
/// Above 1.25 the log term turns negative and σ would be NaN.
pub const DELTA_CEILING: f64 = 1.0;

/// Largest sensitivity a mechanism will calibrate against.
///
/// Non-finite sensitivities are raised to this value so they still produce
/// (enormous) noise rather than none.
pub const SENSITIVITY_CEILING: f64 = 1e12;

/// Privacy parameters for a single mechanism invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DpParams {
    /// Privacy loss parameter.
    pub epsilon: f64,
    /// Failure probability (0 for pure ε-DP).
    pub delta: f64,
}

impl DpParams {
    /// Pure ε-DP parameters.
    pub fn pure(epsilon: f64) -> Self {
        Self { epsilon, delta: 0.0 }
    }

    /// Approximate (ε, δ)-DP parameters.
    pub fn approximate(epsilon: f64, delta: f64) -> Self {
        Self { epsilon, delta }
    }
}

fn clamp_epsilon(epsilon: f64) -> f64 {
    // f64::max ignores a NaN operand, so NaN lands on the floor too.
    epsilon.max(EPSILON_FLOOR)
}

fn clamp_sensitivity(sensitivity: f64) -> f64 {
    if sensitivity.is_nan() {
        SENSITIVITY_CEILING
    } else {
        sensitivity.abs().min(SENSITIVITY_CEILING)
    }
}

/// Laplace mechanism for (ε, 0)-DP.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaplaceMechanism {
    sensitivity: f64,
    epsilon: f64,
}

impl LaplaceMechanism {
    /// Create a mechanism for an L1 `sensitivity` and privacy parameter `epsilon`.
    pub fn new(sensitivity: f64, epsilon: f64) -> Self {
        Self {
            sensitivity: clamp_sensitivity(sensitivity),
            epsilon: clamp_epsilon(epsilon),
        }
    }

    /// L1 sensitivity of the query.
    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    /// Effective ε after clamping.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Scale parameter `b = sensitivity / ε`.
    pub fn scale(&self) -> f64 {
        self.sensitivity / self.epsilon
    }

    /// Theoretical variance `2b²`.
    pub fn variance(&self) -> f64 {
        let b = self.scale();
        2.0 * b * b
    }

    /// Draw one Laplace(0, b) value.
    ///
    /// Inverse CDF of a uniform draw `u ∈ [0, 1)`:
    /// `X = -b · sign(u - ½) · ln(1 - 2|u - ½|)`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let centered = rng.gen::<f64>() - 0.5;
        // u = 0 gives ln(0); keep the tail finite.
        let tail = (1.0 - 2.0 * centered.abs()).max(f64::MIN_POSITIVE);
        -self.scale() * centered.signum() * tail.ln()
    }

    /// Draw `n` independent Laplace(0, b) values.
    pub fn sample_n<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.sample(rng)).collect()
    }

    /// Add one noise draw to `value`.
    pub fn add_noise<R: Rng + ?Sized>(&self, value: f64, rng: &mut R) -> f64 {
        value + self.sample(rng)
    }
}

/// Gaussian mechanism for (ε, δ)-DP.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianMechanism {
    sensitivity: f64,
    epsilon: f64,
    delta: f64,
}

impl GaussianMechanism {
    /// Create a mechanism for an L2 `sensitivity` and parameters `epsilon`, `delta`.
    pub fn new(sensitivity: f64, epsilon: f64, delta: f64) -> Self {
        Self {
            sensitivity: clamp_sensitivity(sensitivity),
            epsilon: clamp_epsilon(epsilon),
            delta: delta.max(DELTA_FLOOR).min(DELTA_CEILING),
        }
    }

    /// Create a mechanism from a parameter pair.
    pub fn from_params(sensitivity: f64, params: DpParams) -> Self {
        Self::new(sensitivity, params.epsilon, params.delta)
    }

    /// L2 sensitivity of the query.
    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    /// Effective ε after clamping.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Effective δ after clamping.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Standard deviation `σ = sensitivity · sqrt(2·ln(1.25/δ)) / ε`.
    pub fn sigma(&self) -> f64 {
        self.sensitivity * (2.0 * (1.25 / self.delta).ln()).sqrt() / self.epsilon
    }

    /// Draw one Normal(0, σ²) value.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let z: f64 = rng.sample(StandardNormal);
        z * self.sigma()
    }

    /// Draw `n` independent Normal(0, σ²) values.
    pub fn sample_n<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<f64> {
        let sigma = self.sigma();
        (0..n)
            .map(|_| {
                let z: f64 = rng.sample(StandardNormal);
                z * sigma
            })
            .collect()
    }

    /// Add one noise draw to `value`.
    pub fn add_noise<R: Rng + ?Sized>(&self, value: f64, rng: &mut R) -> f64 {
        value + self.sample(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn mean_and_variance(xs: &[f64]) -> (f64, f64) {
        let n = xs.len() as f64;
        let mean = xs.iter().sum::<f64>() / n;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        (mean, var)
    }

    #[test]
    fn test_laplace_noise_variance() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let mech = LaplaceMechanism::new(1.0, 0.5);
        let xs = mech.sample_n(&mut rng, 10_000);

        let (mean, var) = mean_and_variance(&xs);
        assert!(mean.abs() < 0.2, "mean {mean} too far from 0");

        let expected = mech.variance();
        assert!((expected - 8.0).abs() < 1e-12);
        assert!(
            (var - expected).abs() / expected < 0.25,
            "variance {var} vs expected {expected}"
        );
    }

    #[test]
    fn test_gaussian_noise_variance() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let mech = GaussianMechanism::new(1.0, 1.0, 1e-5);
        let xs = mech.sample_n(&mut rng, 20_000);

        let (mean, var) = mean_and_variance(&xs);
        let sigma = mech.sigma();
        let expected = sigma * sigma;

        assert!(mean.abs() < 0.1 * sigma);
        assert!((var - expected).abs() / expected < 0.1);
    }

    #[test]
    fn test_gaussian_sigma_formula() {
        let mech = GaussianMechanism::new(2.0, 0.5, 1e-6);
        let expected = 2.0 * (2.0 * (1.25f64 / 1e-6).ln()).sqrt() / 0.5;
        assert!((mech.sigma() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_zero_and_negative_parameters_are_clamped() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);

        let laplace = LaplaceMechanism::new(1.0, 0.0);
        assert_eq!(laplace.epsilon(), EPSILON_FLOOR);
        assert!(laplace.sample(&mut rng).is_finite());

        let laplace = LaplaceMechanism::new(1.0, -3.0);
        assert_eq!(laplace.epsilon(), EPSILON_FLOOR);

        let gaussian = GaussianMechanism::new(1.0, 0.0, 0.0);
        assert_eq!(gaussian.delta(), DELTA_FLOOR);
        assert!(gaussian.sigma().is_finite());
        assert!(gaussian.sample(&mut rng).is_finite());

        let gaussian = GaussianMechanism::new(1.0, 1.0, 5.0);
        assert_eq!(gaussian.delta(), DELTA_CEILING);
        assert!(gaussian.sigma().is_finite());
    }

    #[test]
    fn test_non_finite_sensitivity_is_capped_not_zeroed() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);

        for sensitivity in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let laplace = LaplaceMechanism::new(sensitivity, 1.0);
            assert_eq!(laplace.sensitivity(), SENSITIVITY_CEILING);
            assert!(laplace.scale() > 0.0 && laplace.scale().is_finite());
            let x = laplace.sample(&mut rng);
            assert!(x.is_finite());
            assert_ne!(x, 0.0);

            let gaussian = GaussianMechanism::new(sensitivity, 1.0, 1e-6);
            assert_eq!(gaussian.sensitivity(), SENSITIVITY_CEILING);
            assert!(gaussian.sigma() > 0.0 && gaussian.sigma().is_finite());
            assert!(gaussian.sample(&mut rng).is_finite());
        }

        // Worst case: the cap divided by the ε floor still yields finite draws.
        let extreme = LaplaceMechanism::new(f64::INFINITY, 0.0);
        assert!(extreme.sample(&mut StepRng::new(0, 0)).is_finite());
    }

    #[test]
    fn test_laplace_extreme_uniform_stays_finite() {
        // Constant zero stream: u = 0, the ln(0) edge.
        let mut rng = StepRng::new(0, 0);
        let mech = LaplaceMechanism::new(1.0, 1.0);
        let x = mech.sample(&mut rng);
        assert!(x.is_finite());
        assert!(x < 0.0);
    }

    #[test]
    fn test_laplace_midpoint_is_zero_noise() {
        // 1 << 63 maps to u = 0.5 exactly.
        let mut rng = StepRng::new(1 << 63, 0);
        let mech = LaplaceMechanism::new(1.0, 0.1);
        assert_eq!(mech.sample(&mut rng), 0.0);
    }

    #[test]
    fn test_batched_draws_are_independent() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let mech = LaplaceMechanism::new(1.0, 1.0);
        let xs = mech.sample_n(&mut rng, 16);
        assert_eq!(xs.len(), 16);
        let distinct: std::collections::BTreeSet<u64> = xs.iter().map(|x| x.to_bits()).collect();
        assert_eq!(distinct.len(), 16);
    }

    #[test]
    fn test_seeded_draws_reproduce() {
        let mech = LaplaceMechanism::new(1.0, 0.5);
        let a = mech.sample_n(&mut ChaCha20Rng::seed_from_u64(42), 8);
        let b = mech.sample_n(&mut ChaCha20Rng::seed_from_u64(42), 8);
        assert_eq!(a, b);
    }
}
