//! Sparse-vector gated generation.
//!
//! Each step samples a candidate from a non-private baseline, asks the
//! committee whether it agrees, and runs the agreement rate through a
//! sparse-vector gate. An accepted candidate is emitted at the cost of the
//! gate check alone. A rejected one falls back to a noisy-max vote over fresh
//! proposals, charged on top of the check.
//!
//! With `k` checks and `v` fallback votes a run spends exactly
//! `k · epsilon_gate + v · epsilon_per_vote`.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use super::{
    agreement_rate, noisy_vote, stop_token_set, GenerationOutcome, PrivateGenerator, RunState,
    StopReason, VoteStep, DEFAULT_STOP_TOKENS,
};
use crate::config::{ConfigError, Scheme, SvtConfig, VoteConfig};
use crate::privacy::{PrivacyBudget, SvtGate};
use crate::voter::{JudgingVoter, TokenSampler};

/// Engine running the gated loop.
pub struct DpSparseVoteEngine<R = ChaCha20Rng> {
    voters: Vec<Arc<dyn JudgingVoter>>,
    baseline: Arc<dyn TokenSampler>,
    config: VoteConfig,
    gate: SvtGate,
    stop_tokens: BTreeSet<String>,
    rng: R,
}

impl DpSparseVoteEngine<ChaCha20Rng> {
    /// Engine seeded from OS entropy.
    pub fn new(
        voters: Vec<Arc<dyn JudgingVoter>>,
        baseline: Arc<dyn TokenSampler>,
        config: VoteConfig,
        svt: SvtConfig,
    ) -> Result<Self, ConfigError> {
        Self::with_rng(voters, baseline, config, svt, ChaCha20Rng::from_entropy())
    }

    /// Engine with a reproducible noise stream.
    pub fn with_seed(
        voters: Vec<Arc<dyn JudgingVoter>>,
        baseline: Arc<dyn TokenSampler>,
        config: VoteConfig,
        svt: SvtConfig,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        Self::with_rng(voters, baseline, config, svt, ChaCha20Rng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> DpSparseVoteEngine<R> {
    /// Engine drawing noise from `rng`.
    pub fn with_rng(
        voters: Vec<Arc<dyn JudgingVoter>>,
        baseline: Arc<dyn TokenSampler>,
        config: VoteConfig,
        svt: SvtConfig,
        rng: R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        svt.validate()?;
        Ok(Self {
            voters,
            baseline,
            config,
            gate: svt.gate(),
            stop_tokens: stop_token_set(DEFAULT_STOP_TOKENS.iter().copied()),
            rng,
        })
    }

    /// Replace the stop-token set.
    pub fn with_stop_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_tokens = stop_token_set(tokens);
        self
    }

    /// Committee size.
    pub fn num_voters(&self) -> usize {
        self.voters.len()
    }

    /// Vote parameters.
    pub fn config(&self) -> &VoteConfig {
        &self.config
    }

    /// The gate.
    pub fn gate(&self) -> &SvtGate {
        &self.gate
    }

    /// Generate up to `max_tokens` tokens under a fresh budget.
    pub async fn generate(&mut self, question: &str, max_tokens: usize) -> GenerationOutcome {
        let eps_vote = self.config.epsilon_per_vote;
        let eps_gate = self.gate.epsilon_gate();
        let mut budget = PrivacyBudget::new(self.config.max_total_epsilon);
        let mut run = RunState::default();

        let stop_reason = if self.voters.is_empty() {
            StopReason::NoVoters
        } else {
            loop {
                if run.tokens.len() >= max_tokens {
                    break StopReason::MaxTokens;
                }
                if !budget.can_spend(eps_gate) {
                    break StopReason::BudgetExhausted;
                }

                let prefix = run.prefix();
                let sampled = self.baseline.sample_next_token(question, &prefix, &[]).await;
                let candidate = match sampled {
                    Ok(token) => token.trim().to_string(),
                    Err(e) => {
                        tracing::warn!(error = %e, "baseline sampling failed");
                        String::new()
                    }
                };

                let agreement = agreement_rate(&self.voters, question, &prefix, &candidate).await;
                let decision = self.gate.decide(agreement, &mut self.rng);
                budget.spend(decision.eps_charged);
                run.gate_checks += 1;

                let token = if decision.accepted {
                    if candidate.is_empty() {
                        break StopReason::EmptyBaseline;
                    }
                    run.gate_accepts += 1;
                    candidate
                } else {
                    if !budget.can_spend(eps_vote) {
                        break StopReason::BudgetExhausted;
                    }
                    let step =
                        noisy_vote(&self.voters, question, &prefix, eps_vote, &mut self.rng).await;
                    let token = match step {
                        VoteStep::Token(token) => token,
                        VoteStep::NoProposals => break StopReason::NoProposals,
                        VoteStep::EmptyVote => break StopReason::EmptyVote,
                    };
                    budget.spend(eps_vote);
                    run.noisy_votes += 1;
                    token
                };

                tracing::debug!(
                    step = run.tokens.len(),
                    agreement,
                    accepted = decision.accepted,
                    token = %token,
                    eps_spent = budget.spent(),
                    "gated step emitted"
                );
                if run.push(token, &self.stop_tokens) {
                    break StopReason::StopToken;
                }
            }
        };

        run.finish(Scheme::DpSparseVote, stop_reason, &budget)
    }
}

#[async_trait]
impl<R: Rng + Send> PrivateGenerator for DpSparseVoteEngine<R> {
    fn scheme(&self) -> Scheme {
        Scheme::DpSparseVote
    }

    async fn generate(&mut self, question: &str, max_tokens: usize) -> GenerationOutcome {
        DpSparseVoteEngine::generate(self, question, max_tokens).await
    }
}
