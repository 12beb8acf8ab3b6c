//! Passage retrieval backends.
//!
//! Retrieval sits outside the private computation: voters read passages to
//! form their proposals, and the engines only ever see the proposals.

pub mod cache;
pub mod chunking;
pub mod content;
pub mod memory;

use async_trait::async_trait;

use crate::voter::CapabilityError;

/// Ranked passage retrieval.
///
/// Implementations return at most `k` passages, best first, and an empty
/// list when nothing is indexed.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` passages relevant to `query`.
    async fn similarity_search(&self, query: &str, k: usize)
        -> Result<Vec<String>, CapabilityError>;
}

/// Error type for passage store persistence and chunking.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// Filesystem error.
    #[error("retrieval io error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed store JSON.
    #[error("retrieval store format error: {0}")]
    Format(#[from] serde_json::Error),
}

pub use cache::{CacheConfig, CacheStats, CachingRetriever};
pub use chunking::{chunk_dir, chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use content::{normalize_text, passage_digest};
pub use memory::{InMemoryPassageStore, Passage, StoreSnapshot};
