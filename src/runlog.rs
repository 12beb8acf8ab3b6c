//! Newline-delimited JSON log of generation runs.
//!
//! One [`RunRecord`] per line. Readers skip lines they cannot parse, so a
//! log that was truncated mid-write or hand-edited still summarizes.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{PrivacyConfig, Scheme};
use crate::engine::{GenerationOutcome, StopReason};

/// Run log errors.
#[derive(Debug, thiserror::Error)]
pub enum RunLogError {
    /// Filesystem error.
    #[error("run log io error: {0}")]
    Io(#[from] std::io::Error),
    /// Record could not be serialized.
    #[error("run log encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One completed run.
///
/// Only `eps_spent` is required when reading. Lines written by older tools
/// that carry just `{"query", "eps_spent"}` still load and summarize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// Completion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Question asked.
    #[serde(default)]
    pub query: String,
    /// Generation loop used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<Scheme>,
    /// ε charged during the run.
    pub eps_spent: f64,
    /// Budget the run was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_epsilon: Option<f64>,
    /// Tokens emitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_emitted: Option<usize>,
    /// Why the run stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    /// [`PrivacyConfig::params_hash`] of the run's parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

impl RunRecord {
    /// Record for `outcome`, stamped now.
    pub fn new(query: &str, privacy: &PrivacyConfig, outcome: &GenerationOutcome) -> Self {
        Self {
            run_id: Some(Uuid::new_v4()),
            timestamp: Some(Utc::now()),
            query: query.to_string(),
            scheme: Some(privacy.scheme),
            eps_spent: outcome.eps_spent,
            max_total_epsilon: Some(privacy.max_total_epsilon),
            tokens_emitted: Some(outcome.tokens.len()),
            stop_reason: Some(outcome.stop_reason),
            config_hash: Some(privacy.params_hash()),
        }
    }
}

/// Aggregate over a log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    /// Number of runs.
    pub runs: usize,
    /// Mean ε spent per run.
    pub mean_eps: f64,
    /// Largest ε spent by one run.
    pub max_eps: f64,
}

/// Append `record` as one line, creating the file if needed.
pub fn append_record(path: impl AsRef<Path>, record: &RunRecord) -> Result<(), RunLogError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Read every parseable record. A missing log holds no records.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<RunRecord>, RunLogError> {
    let file = match std::fs::File::open(path.as_ref()) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RunRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(line = lineno + 1, error = %e, "skipping malformed run record")
            }
        }
    }
    Ok(records)
}

/// Summarize `records`; `None` when there are none.
pub fn summarize(records: &[RunRecord]) -> Option<RunSummary> {
    if records.is_empty() {
        return None;
    }
    let total: f64 = records.iter().map(|r| r.eps_spent).sum();
    let max_eps = records.iter().map(|r| r.eps_spent).fold(f64::NEG_INFINITY, f64::max);
    Some(RunSummary {
        runs: records.len(),
        mean_eps: total / records.len() as f64,
        max_eps,
    })
}
