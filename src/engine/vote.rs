//! Noisy-max vote at every position.
//!
//! Each step asks every voter for a next token, tallies the proposals and
//! reports the winner through report-noisy-max. A step is charged
//! `epsilon_per_vote` only when it emits a token, so a run that emits `n`
//! tokens spends exactly `n · epsilon_per_vote`.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use super::{
    noisy_vote, stop_token_set, GenerationOutcome, PrivateGenerator, RunState, StopReason,
    VoteStep, DEFAULT_STOP_TOKENS,
};
use crate::config::{ConfigError, Scheme, VoteConfig};
use crate::privacy::PrivacyBudget;
use crate::voter::Voter;

/// Engine running the plain noisy-max loop.
pub struct DpVoteEngine<R = ChaCha20Rng> {
    voters: Vec<Arc<dyn Voter>>,
    config: VoteConfig,
    stop_tokens: BTreeSet<String>,
    rng: R,
}

impl DpVoteEngine<ChaCha20Rng> {
    /// Engine seeded from OS entropy.
    pub fn new(voters: Vec<Arc<dyn Voter>>, config: VoteConfig) -> Result<Self, ConfigError> {
        Self::with_rng(voters, config, ChaCha20Rng::from_entropy())
    }

    /// Engine with a reproducible noise stream.
    pub fn with_seed(
        voters: Vec<Arc<dyn Voter>>,
        config: VoteConfig,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        Self::with_rng(voters, config, ChaCha20Rng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> DpVoteEngine<R> {
    /// Engine drawing noise from `rng`.
    pub fn with_rng(
        voters: Vec<Arc<dyn Voter>>,
        config: VoteConfig,
        rng: R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            voters,
            config,
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

    /// Generate up to `max_tokens` tokens under a fresh budget.
    pub async fn generate(&mut self, question: &str, max_tokens: usize) -> GenerationOutcome {
        let eps = self.config.epsilon_per_vote;
        let mut budget = PrivacyBudget::new(self.config.max_total_epsilon);
        let mut run = RunState::default();

        let stop_reason = if self.voters.is_empty() {
            StopReason::NoVoters
        } else {
            loop {
                if run.tokens.len() >= max_tokens {
                    break StopReason::MaxTokens;
                }
                if !budget.can_spend(eps) {
                    break StopReason::BudgetExhausted;
                }

                let prefix = run.prefix();
                let step = noisy_vote(&self.voters, question, &prefix, eps, &mut self.rng).await;
                let token = match step {
                    VoteStep::Token(token) => token,
                    VoteStep::NoProposals => break StopReason::NoProposals,
                    VoteStep::EmptyVote => break StopReason::EmptyVote,
                };
                budget.spend(eps);
                run.noisy_votes += 1;

                tracing::debug!(
                    step = run.tokens.len(),
                    token = %token,
                    eps_spent = budget.spent(),
                    "vote emitted"
                );
                if run.push(token, &self.stop_tokens) {
                    break StopReason::StopToken;
                }
            }
        };

        run.finish(Scheme::DpVote, stop_reason, &budget)
    }
}

#[async_trait]
impl<R: Rng + Send> PrivateGenerator for DpVoteEngine<R> {
    fn scheme(&self) -> Scheme {
        Scheme::DpVote
    }

    async fn generate(&mut self, question: &str, max_tokens: usize) -> GenerationOutcome {
        DpVoteEngine::generate(self, question, max_tokens).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{BrokenVoter, FixedVoter};
    use rand::rngs::mock::StepRng;

    fn fixed(tokens: &[&str]) -> Vec<Arc<dyn Voter>> {
        tokens
            .iter()
            .map(|t| Arc::new(FixedVoter::new(t, true)) as Arc<dyn Voter>)
            .collect()
    }

    fn zero_noise_engine(voters: Vec<Arc<dyn Voter>>, config: VoteConfig) -> DpVoteEngine<StepRng> {
        DpVoteEngine::with_rng(voters, config, StepRng::new(1 << 63, 0)).unwrap()
    }

    #[tokio::test]
    async fn test_budget_bounds_token_count() {
        let voters = fixed(&["ok", "ok", "ok"]);
        let config = VoteConfig::new(0.5, 0.0, 1.0);
        let mut engine = DpVoteEngine::with_seed(voters, config, 1).unwrap();
        let outcome = engine.generate("q", 3).await;

        assert_eq!(outcome.text, "ok ok");
        assert_eq!(outcome.eps_spent, 1.0);
        assert_eq!(outcome.stop_reason, StopReason::BudgetExhausted);
        assert_eq!(outcome.noisy_votes, 2);
    }

    #[tokio::test]
    async fn test_max_tokens_bound() {
        let mut engine = zero_noise_engine(fixed(&["ok", "ok"]), VoteConfig::new(0.25, 0.0, 10.0));
        let outcome = engine.generate("q", 3).await;

        assert_eq!(outcome.tokens.len(), 3);
        assert_eq!(outcome.eps_spent, 0.75);
        assert_eq!(outcome.stop_reason, StopReason::MaxTokens);
    }

    #[tokio::test]
    async fn test_empty_committee() {
        let mut engine = zero_noise_engine(Vec::new(), VoteConfig::new(0.5, 0.0, 1.0));
        let outcome = engine.generate("q", 5).await;

        assert_eq!(outcome.clone().into_parts(), (String::new(), 0.0));
        assert_eq!(outcome.stop_reason, StopReason::NoVoters);
    }

    #[tokio::test]
    async fn test_all_empty_proposals_spend_nothing() {
        let mut voters = fixed(&["  ", ""]);
        voters.push(Arc::new(BrokenVoter));
        let mut engine = zero_noise_engine(voters, VoteConfig::new(0.5, 0.0, 1.0));
        let outcome = engine.generate("q", 5).await;

        assert_eq!(outcome.text, "");
        assert_eq!(outcome.eps_spent, 0.0);
        assert_eq!(outcome.stop_reason, StopReason::NoProposals);
    }

    #[tokio::test]
    async fn test_stop_token_is_emitted_then_stops() {
        let mut engine =
            zero_noise_engine(fixed(&["</s>", "</s>"]), VoteConfig::new(0.1, 0.0, 1.0));
        let outcome = engine.generate("q", 10).await;

        assert_eq!(outcome.tokens, vec!["</s>".to_string()]);
        assert_eq!(outcome.stop_reason, StopReason::StopToken);
        assert!((outcome.eps_spent - 0.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_custom_stop_tokens() {
        let mut engine = zero_noise_engine(fixed(&["done", "done"]), VoteConfig::new(0.1, 0.0, 1.0))
            .with_stop_tokens(["done"]);
        let outcome = engine.generate("q", 10).await;
        assert_eq!(outcome.stop_reason, StopReason::StopToken);
        assert_eq!(outcome.tokens.len(), 1);
    }

    #[tokio::test]
    async fn test_majority_wins_without_noise() {
        let mut engine = zero_noise_engine(fixed(&["b", "a", "b"]), VoteConfig::new(1.0, 0.0, 2.0));
        let outcome = engine.generate("q", 2).await;
        assert_eq!(outcome.text, "b b");
    }

    #[tokio::test]
    async fn test_zero_max_tokens() {
        let mut engine = zero_noise_engine(fixed(&["ok"]), VoteConfig::new(0.5, 0.0, 1.0));
        let outcome = engine.generate("q", 0).await;
        assert_eq!(outcome.stop_reason, StopReason::MaxTokens);
        assert_eq!(outcome.eps_spent, 0.0);
    }

    #[tokio::test]
    async fn test_fresh_budget_per_call() {
        let mut engine = zero_noise_engine(fixed(&["ok"]), VoteConfig::new(0.5, 0.0, 1.0));
        let first = engine.generate("q", 5).await;
        let second = engine.generate("q", 5).await;
        assert_eq!(first.eps_spent, 1.0);
        assert_eq!(second.eps_spent, 1.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(DpVoteEngine::new(fixed(&["ok"]), VoteConfig::new(0.0, 0.0, 1.0)).is_err());
    }

    #[tokio::test]
    async fn test_trait_object_dispatch() {
        let mut engine: Box<dyn PrivateGenerator> =
            Box::new(zero_noise_engine(fixed(&["ok"]), VoteConfig::new(0.5, 0.0, 1.0)));
        assert_eq!(engine.scheme(), Scheme::DpVote);
        let outcome = engine.generate("q", 1).await;
        assert_eq!(outcome.text, "ok");
    }
}
