//! Seeded stand-in language model.
//!
//! Samples a "next token" from the words of the question and the retrieved
//! passages, and agrees with a candidate when it occurs in the passages or
//! the prefix. Good enough to drive the engines end to end without a backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use super::{CapabilityError, LanguageModel, TokenSampler};

/// Tokens sampled when neither the question nor the context has any words.
pub const FALLBACK_VOCAB: &[&str] = &[
    ",", ".", "and", "with", "the", "is", "suggests", "likely", "because", "not",
];

/// Only context words longer than this are sampled.
const MIN_CONTEXT_WORD_LEN: usize = 3;

/// Only the first this-many candidate words are sampled.
const BAG_LIMIT: usize = 50;

/// Seeded mock model.
pub struct MockModel {
    rng: Mutex<ChaCha20Rng>,
}

impl MockModel {
    /// Model with a fixed seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
        }
    }

    /// Model seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::from_entropy()),
        }
    }

    fn bag(question: &str, context: &[String]) -> Vec<String> {
        let mut bag: Vec<String> = question
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        for passage in context {
            bag.extend(
                passage
                    .to_lowercase()
                    .split_whitespace()
                    .filter(|w| w.chars().count() > MIN_CONTEXT_WORD_LEN)
                    .map(str::to_string),
            );
        }
        bag.truncate(BAG_LIMIT);
        bag
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::with_seed(7)
    }
}

#[async_trait]
impl TokenSampler for MockModel {
    async fn sample_next_token(
        &self,
        question: &str,
        _prefix: &str,
        context: &[String],
    ) -> Result<String, CapabilityError> {
        let bag = Self::bag(question, context);
        let mut rng = self.rng.lock();
        let token = match bag.choose(&mut *rng) {
            Some(word) => word.clone(),
            None => FALLBACK_VOCAB
                .choose(&mut *rng)
                .map(|w| w.to_string())
                .unwrap_or_default(),
        };
        Ok(token)
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn yesno(
        &self,
        _question: &str,
        prefix: &str,
        candidate: &str,
        context: &[String],
    ) -> Result<bool, CapabilityError> {
        let haystack = format!("{} {}", context.join(" "), prefix).to_lowercase();
        Ok(haystack.contains(&candidate.trim().to_lowercase()))
    }
}
