//! Whole-run configuration as loaded by the CLI.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ConfigError, PrivacyConfig};

/// Default number of tokens a run may emit.
pub const DEFAULT_MAX_TOKENS: usize = 256;

/// Default number of passages a retrieval voter reads.
pub const DEFAULT_TOP_K: usize = 6;

/// Default retrieval cache capacity.
pub const DEFAULT_CACHE_ENTRIES: usize = 1024;

/// Output length and randomness settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// Maximum number of emitted tokens.
    pub max_tokens: usize,
    /// Seed for the engine and mock model; fresh entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            seed: None,
        }
    }
}

/// Retrieval settings for the voters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Passages per query.
    pub top_k: usize,
    /// LRU capacity of the shared retrieval cache (0 disables it).
    pub cache_entries: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            cache_entries: DEFAULT_CACHE_ENTRIES,
        }
    }
}

/// A complete run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Privacy section (required).
    pub privacy: PrivacyConfig,
    /// Generation section.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Retrieval section.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl RunConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.privacy.validate()?;
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::InvalidParameter {
                field: "retrieval.top_k",
                value: 0.0,
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}
