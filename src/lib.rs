//! # dp-vote-kernel
//!
//! Differentially private answer generation by committee voting.
//!
//! A committee of voters, each reading its own retrieved passages, proposes
//! the next token. The committee's choice is released through calibrated
//! noise, and every release is charged against a per-run ε budget.
//!
//! ## Core Contract
//!
//! 1. Every emitted token is chosen by a DP mechanism (noisy-max vote or a
//!    sparse-vector gate over a baseline proposal)
//! 2. Every mechanism invocation is charged before the next one may start
//! 3. A run never starts a step it cannot pay for, and reports the exact ε
//!    it spent
//!
//! ## Architecture
//!
//! ```text
//! Question → Engine ──► Voters ──► Retriever (cached) → passages
//!              │           │
//!              │           └─► proposals / agreement
//!              ▼
//!     SvtGate / report_noisy_max ──► PrivacyBudget
//!              │
//!              ▼
//!     GenerationOutcome → RunRecord (JSONL)
//! ```
//!
//! ## Determinism
//!
//! All noise comes from an RNG owned by the engine. The same seed, voters and
//! question give the same output and the same spend.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod config;
pub mod engine;
pub mod privacy;
pub mod retrieval;
pub mod runlog;
pub mod voter;

// Re-exports
pub use canonical::{canonical_hash, canonical_hash_hex, quantize_float, to_canonical_bytes};
pub use config::{
    ConfigError, GenerationConfig, PrivacyConfig, RetrievalConfig, RunConfig, Scheme, SvtConfig,
    VoteConfig,
};
pub use engine::{
    DpSparseVoteEngine, DpVoteEngine, GenerationOutcome, PrivateGenerator, StopReason,
    DEFAULT_STOP_TOKENS,
};
pub use privacy::{
    report_noisy_max, BudgetError, DpParams, GaussianMechanism, LaplaceMechanism, PrivacyBudget,
    SvtDecision, SvtGate, VoteTally,
};
pub use retrieval::{
    CacheConfig, CacheStats, CachingRetriever, InMemoryPassageStore, Passage, RetrievalError,
    Retriever,
};
pub use runlog::{RunLogError, RunRecord, RunSummary};
pub use voter::{
    CapabilityError, JudgingVoter, LanguageModel, MockModel, RetrievalVoter, TokenSampler, Voter,
};

