//! Differential privacy primitives.

pub mod mechanisms;
pub mod budget;
pub mod vote;
pub mod sparse_vector;

pub use mechanisms::{
    DpParams, LaplaceMechanism, GaussianMechanism,
    EPSILON_FLOOR, DELTA_FLOOR, DELTA_CEILING, SENSITIVITY_CEILING,
};
pub use budget::{PrivacyBudget, BudgetError};
pub use vote::{VoteTally, report_noisy_max};
pub use sparse_vector::{SvtGate, SvtDecision};
