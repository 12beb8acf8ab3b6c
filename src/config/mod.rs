//! Validated configuration.

pub mod privacy;
pub mod run;

pub use privacy::{PrivacyConfig, Scheme, SvtConfig, VoteConfig};
pub use run::{GenerationConfig, RetrievalConfig, RunConfig};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A numeric parameter is out of range.
    #[error("invalid {field} = {value}: {reason}")]
    InvalidParameter {
        /// Dotted field path.
        field: &'static str,
        /// Offending value.
        value: f64,
        /// Constraint that failed.
        reason: &'static str,
    },
    /// The sparse-gated scheme was selected without an `svt` section.
    #[error("scheme dp_sparse_vote requires an svt section")]
    MissingSvt,
    /// The committee is empty.
    #[error("m_voters must be at least 1")]
    NoVoters,
    /// Malformed or unknown fields.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Config file could not be read.
    #[error("config read error: {0}")]
    Io(#[from] std::io::Error),
}
