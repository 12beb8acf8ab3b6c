//! Report-noisy-max aggregation of voter proposals.
//!
//! Each voter contributes one unit to exactly one token, so adding or
//! removing a voter changes one count by at most one (L1 sensitivity 1).
//! Adding independent Laplace(0, 1/ε) noise to every count and releasing only
//! the arg-max key is ε-differentially private.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::mechanisms::LaplaceMechanism;

/// Vote counts per candidate token.
///
/// Backed by a `BTreeMap` so iteration is in lexicographic key order; together
/// with the strict comparison in [`report_noisy_max`] this fixes the tie rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    counts: BTreeMap<String, u64>,
}

impl VoteTally {
    /// Create an empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one vote for `token`.
    pub fn add(&mut self, token: impl Into<String>) {
        *self.counts.entry(token.into()).or_insert(0) += 1;
    }

    /// Count for `token` (0 if absent).
    pub fn count(&self, token: &str) -> u64 {
        self.counts.get(token).copied().unwrap_or(0)
    }

    /// Number of distinct candidates.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether no votes were recorded.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of votes.
    pub fn total_votes(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Iterate `(token, count)` in lexicographic token order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<S: Into<String>> FromIterator<S> for VoteTally {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tally = Self::new();
        for token in iter {
            tally.add(token);
        }
        tally
    }
}

/// Return the key with the largest Laplace-noised count.
///
/// Sensitivity is fixed at 1. Returns `None` for an empty tally. When two
/// noised values are exactly equal the lexicographically smaller key wins.
pub fn report_noisy_max<R: Rng + ?Sized>(
    tally: &VoteTally,
    epsilon: f64,
    rng: &mut R,
) -> Option<String> {
    let mech = LaplaceMechanism::new(1.0, epsilon);

    let mut best: Option<(&str, f64)> = None;
    for (token, count) in tally.iter() {
        let noisy = count as f64 + mech.sample(rng);
        match best {
            Some((_, top)) if noisy <= top => {}
            _ => best = Some((token, noisy)),
        }
    }

    best.map(|(token, _)| token.to_string())
}
