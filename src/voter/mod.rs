//! Capabilities the engines consume.
//!
//! The engines never see a model or an index directly. They talk to voters
//! (propose a token, judge a candidate), to a baseline sampler (propose a
//! token outside the private computation), and voters in turn talk to a
//! retriever. Mock and live implementations are interchangeable behind these
//! traits. Retrieval lives in [`crate::retrieval`].

pub mod mock;
pub mod retrieval;

use async_trait::async_trait;

pub use mock::MockModel;
pub use retrieval::RetrievalVoter;

/// Error raised by a capability backend.
///
/// The engines treat a failed call like an empty answer: the voter is dropped
/// from that step's tally, or counted as disagreeing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CapabilityError {
    /// Backend reported a failure.
    #[error("backend error: {0}")]
    Backend(String),
    /// Backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl CapabilityError {
    /// Wrap any error as a backend error.
    pub fn from_backend<E: std::error::Error>(e: E) -> Self {
        Self::Backend(e.to_string())
    }
}

/// A committee member that proposes the next token.
#[async_trait]
pub trait Voter: Send + Sync {
    /// Propose the next token given the question and the text emitted so far.
    async fn propose_next(&self, question: &str, prefix: &str) -> Result<String, CapabilityError>;
}

/// A voter that can also judge a candidate token.
#[async_trait]
pub trait JudgingVoter: Voter {
    /// Whether this voter agrees that `candidate` is the next token.
    async fn agrees(
        &self,
        question: &str,
        prefix: &str,
        candidate: &str,
    ) -> Result<bool, CapabilityError>;
}

/// Samples a next token from a question, a prefix and context passages.
///
/// The sparse-gated engine uses one as its non-private baseline.
#[async_trait]
pub trait TokenSampler: Send + Sync {
    /// Sample the next token.
    async fn sample_next_token(
        &self,
        question: &str,
        prefix: &str,
        context: &[String],
    ) -> Result<String, CapabilityError>;
}

/// A token sampler that can also answer yes/no about a candidate.
#[async_trait]
pub trait LanguageModel: TokenSampler {
    /// Whether `candidate` is the next token given the context.
    async fn yesno(
        &self,
        question: &str,
        prefix: &str,
        candidate: &str,
        context: &[String],
    ) -> Result<bool, CapabilityError>;
}
