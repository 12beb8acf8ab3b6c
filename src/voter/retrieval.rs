//! Retrieval-augmented voter.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::run::DEFAULT_TOP_K;
use crate::retrieval::Retriever;

use super::{CapabilityError, JudgingVoter, LanguageModel, Voter};

/// A voter that retrieves passages for the question and asks a model.
///
/// Several voters may share one retriever and one model; each call is a
/// read-only query against both.
pub struct RetrievalVoter<R: ?Sized, M: ?Sized> {
    retriever: Arc<R>,
    model: Arc<M>,
    top_k: usize,
}

impl<R, M> RetrievalVoter<R, M>
where
    R: Retriever + ?Sized,
    M: LanguageModel + ?Sized,
{
    /// Create a voter reading the default number of passages.
    pub fn new(retriever: Arc<R>, model: Arc<M>) -> Self {
        Self::with_top_k(retriever, model, DEFAULT_TOP_K)
    }

    /// Create a voter reading `top_k` passages per call.
    pub fn with_top_k(retriever: Arc<R>, model: Arc<M>, top_k: usize) -> Self {
        Self {
            retriever,
            model,
            top_k: top_k.max(1),
        }
    }

    /// Passages read per call.
    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

#[async_trait]
impl<R, M> Voter for RetrievalVoter<R, M>
where
    R: Retriever + ?Sized,
    M: LanguageModel + ?Sized,
{
    async fn propose_next(&self, question: &str, prefix: &str) -> Result<String, CapabilityError> {
        let context = self.retriever.similarity_search(question, self.top_k).await?;
        self.model.sample_next_token(question, prefix, &context).await
    }
}

#[async_trait]
impl<R, M> JudgingVoter for RetrievalVoter<R, M>
where
    R: Retriever + ?Sized,
    M: LanguageModel + ?Sized,
{
    async fn agrees(
        &self,
        question: &str,
        prefix: &str,
        candidate: &str,
    ) -> Result<bool, CapabilityError> {
        let context = self.retriever.similarity_search(question, self.top_k).await?;
        self.model.yesno(question, prefix, candidate, &context).await
    }
}
