//! Privacy budget accounting under sequential composition.
//!
//! A [`PrivacyBudget`] is created once per generation run and charged by the
//! loop that owns it. Sequential composition means the total privacy loss of
//! a run is the plain sum of every ε charged.
//!
//! ## Contract
//!
//! [`PrivacyBudget::spend`] does not enforce the bound. Callers check
//! [`PrivacyBudget::can_spend`] first; both generation loops do. Code that
//! wants the bound enforced by the accountant itself uses
//! [`PrivacyBudget::try_spend`].

use serde::{Deserialize, Serialize};

/// Error returned by [`PrivacyBudget::try_spend`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BudgetError {
    /// The requested amount does not fit in the remaining budget.
    #[error("privacy budget exhausted: requested {requested}, remaining {remaining}")]
    Exhausted {
        /// ε requested.
        requested: f64,
        /// ε left before the request.
        remaining: f64,
    },
}

/// Running total of ε spent against a fixed maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyBudget {
    max_total: f64,
    spent: f64,
}

impl PrivacyBudget {
    /// Create an untouched budget with `max_total` ε available.
    pub fn new(max_total: f64) -> Self {
        Self {
            max_total,
            spent: 0.0,
        }
    }

    /// Whether `amount` more ε fits: `spent + amount ≤ max_total`.
    pub fn can_spend(&self, amount: f64) -> bool {
        self.spent + amount <= self.max_total
    }

    /// Charge `amount` ε unconditionally.
    ///
    /// Callers must check [`can_spend`](Self::can_spend) first. An overrun is
    /// recorded as-is and logged.
    pub fn spend(&mut self, amount: f64) {
        self.spent += amount;
        if self.spent > self.max_total {
            tracing::warn!(
                spent = self.spent,
                max_total = self.max_total,
                amount,
                "privacy budget overrun: spend without a prior can_spend check"
            );
        }
    }

    /// Charge `amount` ε only if it fits; leaves the budget untouched otherwise.
    pub fn try_spend(&mut self, amount: f64) -> Result<(), BudgetError> {
        if !self.can_spend(amount) {
            return Err(BudgetError::Exhausted {
                requested: amount,
                remaining: self.remaining(),
            });
        }
        self.spent += amount;
        Ok(())
    }

    /// Total ε charged so far.
    pub fn spent(&self) -> f64 {
        self.spent
    }

    /// Configured maximum.
    pub fn max_total(&self) -> f64 {
        self.max_total
    }

    /// ε still available (never negative).
    pub fn remaining(&self) -> f64 {
        (self.max_total - self.spent).max(0.0)
    }

    /// Whether the budget has been pushed past its maximum.
    pub fn is_overrun(&self) -> bool {
        self.spent > self.max_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fresh_budget() {
        let budget = PrivacyBudget::new(1.0);
        assert_eq!(budget.spent(), 0.0);
        assert_eq!(budget.remaining(), 1.0);
        assert!(budget.can_spend(1.0));
        assert!(!budget.can_spend(1.5));
    }

    #[test]
    fn test_can_spend_does_not_mutate() {
        let budget = PrivacyBudget::new(1.0);
        for _ in 0..10 {
            assert!(budget.can_spend(0.5));
        }
        assert_eq!(budget.spent(), 0.0);
    }

    #[test]
    fn test_exact_fill() {
        let mut budget = PrivacyBudget::new(1.0);
        budget.spend(0.5);
        assert!(budget.can_spend(0.5));
        budget.spend(0.5);
        assert_eq!(budget.spent(), 1.0);
        assert!(!budget.can_spend(0.5));
        assert!(budget.can_spend(0.0));
        assert!(!budget.is_overrun());
    }

    #[test]
    fn test_spend_does_not_enforce_bound() {
        let mut budget = PrivacyBudget::new(1.0);
        budget.spend(0.8);
        budget.spend(0.8);
        assert!((budget.spent() - 1.6).abs() < 1e-12);
        assert!(budget.is_overrun());
        assert_eq!(budget.remaining(), 0.0);
        assert!(!budget.can_spend(0.0));
    }

    #[test]
    fn test_try_spend_refuses_overrun() {
        let mut budget = PrivacyBudget::new(1.0);
        assert!(budget.try_spend(0.75).is_ok());

        let err = budget.try_spend(0.5).unwrap_err();
        assert!(matches!(err, BudgetError::Exhausted { requested, .. } if requested == 0.5));
        assert_eq!(budget.spent(), 0.75);
    }

    #[test]
    fn test_zero_budget() {
        let mut budget = PrivacyBudget::new(0.0);
        assert!(budget.can_spend(0.0));
        assert!(!budget.can_spend(f64::MIN_POSITIVE));
        assert!(budget.try_spend(0.1).is_err());
    }

    proptest! {
        #[test]
        fn prop_checked_spend_never_exceeds_max(
            max_total in 0.0f64..10.0,
            amounts in proptest::collection::vec(0.0f64..2.0, 0..64),
        ) {
            let mut budget = PrivacyBudget::new(max_total);
            let mut previous = budget.spent();

            for amount in amounts {
                if budget.can_spend(amount) {
                    budget.spend(amount);
                }
                prop_assert!(budget.spent() >= previous);
                prop_assert!(budget.spent() <= budget.max_total());
                previous = budget.spent();
            }
        }

        #[test]
        fn prop_try_spend_matches_check_then_spend(
            max_total in 0.0f64..5.0,
            amounts in proptest::collection::vec(0.0f64..1.0, 0..32),
        ) {
            let mut checked = PrivacyBudget::new(max_total);
            let mut hardened = PrivacyBudget::new(max_total);

            for amount in amounts {
                if checked.can_spend(amount) {
                    checked.spend(amount);
                }
                let _ = hardened.try_spend(amount);
            }

            prop_assert_eq!(checked.spent(), hardened.spent());
        }
    }
}
