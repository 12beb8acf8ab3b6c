//! Privacy-budgeted generation loops.
//!
//! ## Step discipline
//!
//! Steps run strictly in sequence: whether step `n + 1` may run at all depends
//! on the ε left after step `n`. Inside a step every voter is queried
//! concurrently, and all answers are collected before the step decides or
//! spends anything. The budget lives on the `generate` call's stack, so voter
//! calls can never observe it mid-update.
//!
//! ## Stopping
//!
//! A run ends on budget exhaustion, an empty committee, a step with no usable
//! proposals, a stop token, or the length limit. None of these is an error;
//! the outcome always carries the exact ε spent.

pub mod sparse;
pub mod vote;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::Scheme;
use crate::privacy::{report_noisy_max, PrivacyBudget, VoteTally};
use crate::voter::{JudgingVoter, Voter};

pub use sparse::DpSparseVoteEngine;
pub use vote::DpVoteEngine;

/// Tokens that end a run once emitted.
pub const DEFAULT_STOP_TOKENS: &[&str] = &["</s>", "<eos>"];

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `max_tokens` tokens were emitted.
    MaxTokens,
    /// The next step could not be paid for.
    BudgetExhausted,
    /// The committee is empty.
    NoVoters,
    /// Every voter returned an empty proposal or failed.
    NoProposals,
    /// The noisy vote produced no token.
    EmptyVote,
    /// The gate accepted an empty baseline proposal.
    EmptyBaseline,
    /// A stop token was emitted.
    StopToken,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MaxTokens => "max_tokens",
            Self::BudgetExhausted => "budget_exhausted",
            Self::NoVoters => "no_voters",
            Self::NoProposals => "no_proposals",
            Self::EmptyVote => "empty_vote",
            Self::EmptyBaseline => "empty_baseline",
            Self::StopToken => "stop_token",
        };
        f.write_str(s)
    }
}

/// Result of one `generate` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    /// Emitted tokens joined by single spaces, trimmed.
    pub text: String,
    /// Total ε charged during the run.
    pub eps_spent: f64,
    /// Emitted tokens in order.
    pub tokens: Vec<String>,
    /// Why the run ended.
    pub stop_reason: StopReason,
    /// Sparse-vector checks performed (each charged).
    pub gate_checks: usize,
    /// Checks that accepted the baseline token.
    pub gate_accepts: usize,
    /// Tokens chosen by a noisy-max vote (each charged).
    pub noisy_votes: usize,
}

impl GenerationOutcome {
    /// `(text, eps_spent)`.
    pub fn into_parts(self) -> (String, f64) {
        (self.text, self.eps_spent)
    }
}

/// Object-safe view of both engines.
#[async_trait]
pub trait PrivateGenerator: Send {
    /// Which loop this engine runs.
    fn scheme(&self) -> Scheme;

    /// Generate up to `max_tokens` tokens for `question` under a fresh budget.
    async fn generate(&mut self, question: &str, max_tokens: usize) -> GenerationOutcome;
}

/// Build a stop-token set.
pub(crate) fn stop_token_set<I, S>(tokens: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tokens.into_iter().map(Into::into).collect()
}

/// Append-only state of a running generation.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    pub tokens: Vec<String>,
    pub gate_checks: usize,
    pub gate_accepts: usize,
    pub noisy_votes: usize,
}

impl RunState {
    pub fn prefix(&self) -> String {
        self.tokens.join(" ")
    }

    /// Append `token`; true if it is a stop token.
    pub fn push(&mut self, token: String, stop_tokens: &BTreeSet<String>) -> bool {
        let stop = stop_tokens.contains(&token);
        self.tokens.push(token);
        stop
    }

    pub fn finish(
        self,
        scheme: Scheme,
        stop_reason: StopReason,
        budget: &PrivacyBudget,
    ) -> GenerationOutcome {
        let text = self.tokens.join(" ").trim().to_string();
        tracing::info!(
            scheme = %scheme,
            tokens = self.tokens.len(),
            eps_spent = budget.spent(),
            max_total = budget.max_total(),
            stop_reason = %stop_reason,
            gate_checks = self.gate_checks,
            noisy_votes = self.noisy_votes,
            "generation finished"
        );
        GenerationOutcome {
            text,
            eps_spent: budget.spent(),
            tokens: self.tokens,
            stop_reason,
            gate_checks: self.gate_checks,
            gate_accepts: self.gate_accepts,
            noisy_votes: self.noisy_votes,
        }
    }
}

/// Outcome of one noisy-max step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VoteStep {
    Token(String),
    NoProposals,
    EmptyVote,
}

/// Ask every voter for a proposal; trimmed, empty ones and failures dropped.
pub(crate) async fn collect_proposals<V>(
    voters: &[Arc<V>],
    question: &str,
    prefix: &str,
) -> Vec<String>
where
    V: Voter + ?Sized,
{
    let results = join_all(voters.iter().map(|v| v.propose_next(question, prefix))).await;
    results
        .into_iter()
        .enumerate()
        .filter_map(|(i, result)| match result {
            Ok(p) => {
                let p = p.trim();
                (!p.is_empty()).then(|| p.to_string())
            }
            Err(e) => {
                tracing::warn!(voter = i, error = %e, "voter proposal failed");
                None
            }
        })
        .collect()
}

/// Fraction of voters agreeing with `candidate`; failures count as disagreement.
pub(crate) async fn agreement_rate<V>(
    voters: &[Arc<V>],
    question: &str,
    prefix: &str,
    candidate: &str,
) -> f64
where
    V: JudgingVoter + ?Sized,
{
    let results = join_all(voters.iter().map(|v| v.agrees(question, prefix, candidate))).await;
    let agreeing = results
        .into_iter()
        .enumerate()
        .filter(|(i, result)| match result {
            Ok(agrees) => *agrees,
            Err(e) => {
                tracing::warn!(voter = *i, error = %e, "voter judgement failed");
                false
            }
        })
        .count();
    agreeing as f64 / voters.len().max(1) as f64
}

/// Collect fresh proposals and pick one by report-noisy-max.
///
/// Spends nothing; the caller charges `epsilon` only for a [`VoteStep::Token`].
pub(crate) async fn noisy_vote<V, R>(
    voters: &[Arc<V>],
    question: &str,
    prefix: &str,
    epsilon: f64,
    rng: &mut R,
) -> VoteStep
where
    V: Voter + ?Sized,
    R: Rng + Send + ?Sized,
{
    let proposals = collect_proposals(voters, question, prefix).await;
    if proposals.is_empty() {
        return VoteStep::NoProposals;
    }

    let tally: VoteTally = proposals.into_iter().collect();
    tracing::debug!(candidates = tally.len(), votes = tally.total_votes(), "noisy vote");

    match report_noisy_max(&tally, epsilon, rng) {
        Some(token) if !token.trim().is_empty() => VoteStep::Token(token),
        _ => VoteStep::EmptyVote,
    }
}

/// Test doubles shared by the engine tests.
#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;

    use crate::voter::{CapabilityError, JudgingVoter, TokenSampler, Voter};

    /// Always proposes `token`; agrees iff `agree`.
    pub struct FixedVoter {
        pub token: String,
        pub agree: bool,
    }

    impl FixedVoter {
        pub fn new(token: &str, agree: bool) -> Self {
            Self {
                token: token.to_string(),
                agree,
            }
        }
    }

    #[async_trait]
    impl Voter for FixedVoter {
        async fn propose_next(&self, _q: &str, _prefix: &str) -> Result<String, CapabilityError> {
            Ok(self.token.clone())
        }
    }

    #[async_trait]
    impl JudgingVoter for FixedVoter {
        async fn agrees(
            &self,
            _q: &str,
            _prefix: &str,
            _candidate: &str,
        ) -> Result<bool, CapabilityError> {
            Ok(self.agree)
        }
    }

    /// Fails every call.
    pub struct BrokenVoter;

    #[async_trait]
    impl Voter for BrokenVoter {
        async fn propose_next(&self, _q: &str, _prefix: &str) -> Result<String, CapabilityError> {
            Err(CapabilityError::Unavailable("offline".to_string()))
        }
    }

    #[async_trait]
    impl JudgingVoter for BrokenVoter {
        async fn agrees(
            &self,
            _q: &str,
            _prefix: &str,
            _candidate: &str,
        ) -> Result<bool, CapabilityError> {
            Err(CapabilityError::Unavailable("offline".to_string()))
        }
    }

    /// Baseline that always samples `token`.
    pub struct FixedSampler(pub String);

    #[async_trait]
    impl TokenSampler for FixedSampler {
        async fn sample_next_token(
            &self,
            _q: &str,
            _prefix: &str,
            _context: &[String],
        ) -> Result<String, CapabilityError> {
            Ok(self.0.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{BrokenVoter, FixedVoter};
    use super::*;
    use rand::rngs::mock::StepRng;

    fn zero_noise() -> StepRng {
        StepRng::new(1 << 63, 0)
    }

    #[tokio::test]
    async fn test_collect_proposals_trims_and_drops() {
        let voters: Vec<Arc<dyn Voter>> = vec![
            Arc::new(FixedVoter::new("  ok ", true)),
            Arc::new(FixedVoter::new("   ", true)),
            Arc::new(FixedVoter::new("", true)),
            Arc::new(BrokenVoter),
        ];
        let proposals = collect_proposals(&voters, "q", "").await;
        assert_eq!(proposals, vec!["ok".to_string()]);
    }

    #[tokio::test]
    async fn test_agreement_rate() {
        let voters: Vec<Arc<dyn JudgingVoter>> = vec![
            Arc::new(FixedVoter::new("a", true)),
            Arc::new(FixedVoter::new("a", true)),
            Arc::new(FixedVoter::new("a", false)),
            Arc::new(BrokenVoter),
        ];
        assert_eq!(agreement_rate(&voters, "q", "", "a").await, 0.5);

        let none: Vec<Arc<dyn JudgingVoter>> = Vec::new();
        assert_eq!(agreement_rate(&none, "q", "", "a").await, 0.0);
    }

    #[tokio::test]
    async fn test_noisy_vote_outcomes() {
        let voters: Vec<Arc<dyn Voter>> = vec![
            Arc::new(FixedVoter::new("b", true)),
            Arc::new(FixedVoter::new("a", true)),
            Arc::new(FixedVoter::new("b", true)),
        ];
        let step = noisy_vote(&voters, "q", "", 1.0, &mut zero_noise()).await;
        assert_eq!(step, VoteStep::Token("b".to_string()));

        let silent: Vec<Arc<dyn Voter>> = vec![Arc::new(FixedVoter::new(" ", true))];
        let step = noisy_vote(&silent, "q", "", 1.0, &mut zero_noise()).await;
        assert_eq!(step, VoteStep::NoProposals);
    }

    #[test]
    fn test_run_state_stop_detection() {
        let stops = stop_token_set(DEFAULT_STOP_TOKENS.iter().copied());
        let mut run = RunState::default();
        assert!(!run.push("hello".to_string(), &stops));
        assert!(run.push("</s>".to_string(), &stops));
        assert_eq!(run.prefix(), "hello </s>");
    }

    #[test]
    fn test_stop_reason_serializes_snake_case() {
        let json = serde_json::to_string(&StopReason::BudgetExhausted).unwrap();
        assert_eq!(json, "\"budget_exhausted\"");
        assert_eq!(StopReason::EmptyBaseline.to_string(), "empty_baseline");
    }
}
