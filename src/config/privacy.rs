//! Privacy configuration for the generation engines.
//!
//! Every struct rejects unknown fields and requires its core parameters, so a
//! misspelled key fails at load time instead of silently taking a default
//! deep inside a run.
//!
//! ## Fingerprint
//!
//! [`PrivacyConfig::params_hash`] hashes the quantized parameters (floats ×
//! 1e6, rounded to i64) so identical settings give identical fingerprints in
//! the run log.

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_hash_hex, quantize_float};
use crate::privacy::SvtGate;

use super::ConfigError;

/// Which generation loop a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// Noisy-max vote at every position.
    DpVote,
    /// Sparse-vector gate on a baseline proposal, noisy-max vote on reject.
    DpSparseVote,
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DpVote => write!(f, "dp_vote"),
            Self::DpSparseVote => write!(f, "dp_sparse_vote"),
        }
    }
}

/// Parameters of the noisy-max vote and the run budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteConfig {
    /// ε charged per noisy-max vote.
    pub epsilon_per_vote: f64,
    /// δ reserved for Gaussian-mechanism accounting; pure-ε voting ignores it.
    pub delta: f64,
    /// Total ε available to one `generate` call.
    pub max_total_epsilon: f64,
}

impl VoteConfig {
    /// Create a vote configuration.
    pub fn new(epsilon_per_vote: f64, delta: f64, max_total_epsilon: f64) -> Self {
        Self {
            epsilon_per_vote,
            delta,
            max_total_epsilon,
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("epsilon_per_vote", self.epsilon_per_vote)?;
        non_negative("delta", self.delta)?;
        positive("max_total_epsilon", self.max_total_epsilon)?;
        Ok(())
    }
}

/// Sparse-vector gate parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SvtConfig {
    /// Agreement rate the noisy score must reach, in `[0, 1]`.
    pub threshold: f64,
    /// ε charged for every gate check.
    pub epsilon_gate: f64,
    /// ε reserved for reporting accepted values; currently never spent.
    pub epsilon_report: f64,
}

impl SvtConfig {
    /// Create a gate configuration.
    pub fn new(threshold: f64, epsilon_gate: f64, epsilon_report: f64) -> Self {
        Self {
            threshold,
            epsilon_gate,
            epsilon_report,
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidParameter {
                field: "svt.threshold",
                value: self.threshold,
                reason: "must be in [0, 1]",
            });
        }
        positive("svt.epsilon_gate", self.epsilon_gate)?;
        non_negative("svt.epsilon_report", self.epsilon_report)?;
        Ok(())
    }

    /// Build the gate.
    pub fn gate(&self) -> SvtGate {
        SvtGate::new(self.threshold, self.epsilon_gate, self.epsilon_report)
    }
}

/// The `privacy` section of a run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrivacyConfig {
    /// Generation loop.
    pub scheme: Scheme,
    /// Committee size.
    pub m_voters: usize,
    /// ε charged per noisy-max vote.
    pub epsilon_per_vote: f64,
    /// δ reserved for Gaussian-mechanism accounting.
    pub delta: f64,
    /// Total ε per run.
    pub max_total_epsilon: f64,
    /// Gate parameters; required for [`Scheme::DpSparseVote`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svt: Option<SvtConfig>,
}

impl PrivacyConfig {
    /// Vote-only configuration.
    pub fn dp_vote(m_voters: usize, vote: VoteConfig) -> Self {
        Self {
            scheme: Scheme::DpVote,
            m_voters,
            epsilon_per_vote: vote.epsilon_per_vote,
            delta: vote.delta,
            max_total_epsilon: vote.max_total_epsilon,
            svt: None,
        }
    }

    /// Sparse-gated configuration.
    pub fn dp_sparse_vote(m_voters: usize, vote: VoteConfig, svt: SvtConfig) -> Self {
        Self {
            scheme: Scheme::DpSparseVote,
            svt: Some(svt),
            ..Self::dp_vote(m_voters, vote)
        }
    }

    /// The vote parameters.
    pub fn vote_config(&self) -> VoteConfig {
        VoteConfig::new(self.epsilon_per_vote, self.delta, self.max_total_epsilon)
    }

    /// The gate parameters, or an error if the section is missing.
    pub fn svt_config(&self) -> Result<SvtConfig, ConfigError> {
        self.svt.ok_or(ConfigError::MissingSvt)
    }

    /// Check every parameter and the scheme/section pairing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.m_voters == 0 {
            return Err(ConfigError::NoVoters);
        }
        self.vote_config().validate()?;
        match (self.scheme, &self.svt) {
            (Scheme::DpSparseVote, None) => return Err(ConfigError::MissingSvt),
            (_, Some(svt)) => svt.validate()?,
            (Scheme::DpVote, None) => {}
        }
        Ok(())
    }

    /// Fingerprint of the quantized parameters.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(&self.to_quantized())
    }

    fn to_quantized(&self) -> QuantizedPrivacyParams {
        QuantizedPrivacyParams {
            scheme: self.scheme.to_string(),
            m_voters: self.m_voters,
            epsilon_per_vote: quantize_float(self.epsilon_per_vote),
            delta: quantize_float(self.delta),
            max_total_epsilon: quantize_float(self.max_total_epsilon),
            svt: self.svt.map(|svt| QuantizedSvtParams {
                threshold: quantize_float(svt.threshold),
                epsilon_gate: quantize_float(svt.epsilon_gate),
                epsilon_report: quantize_float(svt.epsilon_report),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct QuantizedSvtParams {
    threshold: i64,
    epsilon_gate: i64,
    epsilon_report: i64,
}

#[derive(Debug, Serialize)]
struct QuantizedPrivacyParams {
    scheme: String,
    m_voters: usize,
    epsilon_per_vote: i64,
    delta: i64,
    max_total_epsilon: i64,
    svt: Option<QuantizedSvtParams>,
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            field,
            value,
            reason: "must be a positive finite number",
        })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            field,
            value,
            reason: "must be a non-negative finite number",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparse() -> PrivacyConfig {
        PrivacyConfig::dp_sparse_vote(
            5,
            VoteConfig::new(0.5, 1e-6, 4.0),
            SvtConfig::new(0.6, 0.2, 0.1),
        )
    }

    #[test]
    fn test_parse_dp_vote() {
        let json = r#"{
            "scheme": "dp_vote",
            "m_voters": 3,
            "epsilon_per_vote": 0.5,
            "delta": 1e-6,
            "max_total_epsilon": 1.0
        }"#;
        let cfg: PrivacyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.scheme, Scheme::DpVote);
        assert!(cfg.svt.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = r#"{
            "scheme": "dp_vote",
            "m_voters": 3,
            "epsilon_per_vote": 0.5,
            "delta": 1e-6,
            "max_total_epsilon": 1.0,
            "epsilon_per_voet": 0.1
        }"#;
        assert!(serde_json::from_str::<PrivacyConfig>(json).is_err());
    }

    #[test]
    fn test_missing_field_rejected() {
        let json =
            r#"{ "scheme": "dp_vote", "m_voters": 3, "delta": 0.0, "max_total_epsilon": 1.0 }"#;
        assert!(serde_json::from_str::<PrivacyConfig>(json).is_err());
    }

    #[test]
    fn test_sparse_requires_svt() {
        let mut cfg = sparse();
        cfg.svt = None;
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingSvt)));
    }

    #[test]
    fn test_ranges() {
        assert!(VoteConfig::new(0.0, 0.0, 1.0).validate().is_err());
        assert!(VoteConfig::new(0.5, -1.0, 1.0).validate().is_err());
        assert!(VoteConfig::new(0.5, 0.0, f64::NAN).validate().is_err());
        assert!(SvtConfig::new(1.5, 0.5, 0.0).validate().is_err());
        assert!(SvtConfig::new(0.5, 0.0, 0.0).validate().is_err());
        assert!(SvtConfig::new(0.5, 0.5, -0.1).validate().is_err());
        assert!(SvtConfig::new(1.0, 0.5, 0.0).validate().is_ok());
        assert!(sparse().validate().is_ok());
    }

    #[test]
    fn test_zero_voters_rejected() {
        let cfg = PrivacyConfig::dp_vote(0, VoteConfig::new(0.5, 0.0, 1.0));
        assert!(matches!(cfg.validate(), Err(ConfigError::NoVoters)));
    }

    #[test]
    fn test_params_hash_determinism() {
        assert_eq!(sparse().params_hash(), sparse().params_hash());
    }

    #[test]
    fn test_params_hash_changes() {
        let mut other = sparse();
        other.epsilon_per_vote = 0.25;
        assert_ne!(sparse().params_hash(), other.params_hash());

        let mut other = sparse();
        other.svt = Some(SvtConfig::new(0.6, 0.2, 0.0));
        assert_ne!(sparse().params_hash(), other.params_hash());
    }
}
