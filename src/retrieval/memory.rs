//! In-memory passage store.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::content::{passage_digest, terms};
use super::{RetrievalError, Retriever};
use crate::voter::CapabilityError;

/// A retrievable text passage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Source identifier, e.g. `"notes.md:1100"`.
    #[serde(default)]
    pub id: String,
    /// Passage text.
    #[serde(default)]
    pub text: String,
}

impl Passage {
    /// Create a passage.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// On-disk form of a store: `{"docs": [{"id": ..., "text": ...}]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Stored passages in insertion order.
    #[serde(default)]
    pub docs: Vec<Passage>,
}

/// In-memory passage store.
///
/// Ranks by the number of distinct query terms a passage contains, ties
/// broken by insertion order. Passages with the same normalized content are
/// returned once.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPassageStore {
    passages: Vec<Passage>,
    /// Term set per passage, parallel to `passages`.
    terms: Vec<BTreeSet<String>>,
}

impl InMemoryPassageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from passages.
    pub fn from_passages(passages: impl IntoIterator<Item = Passage>) -> Self {
        let mut store = Self::new();
        for passage in passages {
            store.push(passage);
        }
        store
    }

    /// Add a passage.
    pub fn add_passage(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.push(Passage::new(id, text));
    }

    fn push(&mut self, passage: Passage) {
        self.terms.push(terms(&passage.text).collect());
        self.passages.push(passage);
    }

    /// Number of passages.
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// Whether the store holds no passages.
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// All passages in insertion order.
    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    /// Up to `k` passage texts for `query`, best first.
    pub fn search(&self, query: &str, k: usize) -> Vec<String> {
        if self.passages.is_empty() || k == 0 {
            return Vec::new();
        }

        let query_terms: BTreeSet<String> = terms(query).collect();
        let mut ranked: Vec<(usize, usize)> = self
            .terms
            .iter()
            .enumerate()
            .map(|(i, passage_terms)| (i, query_terms.intersection(passage_terms).count()))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::with_capacity(k);
        for (i, _) in ranked {
            let text = self.passages[i].text.trim();
            if text.is_empty() || !seen.insert(passage_digest(text)) {
                continue;
            }
            out.push(text.to_string());
            if out.len() >= k {
                break;
            }
        }
        out
    }

    /// Snapshot for serialization.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            docs: self.passages.clone(),
        }
    }

    /// Rebuild from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self::from_passages(snapshot.docs)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, RetrievalError> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, RetrievalError> {
        let snapshot: StoreSnapshot = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the store to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RetrievalError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load a store from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RetrievalError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Open the index a run retrieves from.
    ///
    /// No path or a missing file yields an empty store; a malformed file is
    /// an error. An empty result is logged at `warn`, since every voter then
    /// answers from the question alone.
    pub fn open_index(path: Option<&Path>) -> Result<Self, RetrievalError> {
        let store = match path {
            Some(path) if path.exists() => Self::load(path)?,
            Some(path) => {
                tracing::warn!(index = %path.display(), "index file not found");
                Self::new()
            }
            None => Self::new(),
        };
        if store.is_empty() {
            tracing::warn!("passage index is empty; voters run without retrieved context");
        }
        Ok(store)
    }
}

#[async_trait]
impl Retriever for InMemoryPassageStore {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<String>, CapabilityError> {
        Ok(self.search(query, k))
    }
}
