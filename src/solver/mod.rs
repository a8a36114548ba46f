//! Dual-problem solvers
//!
//! Two in-process solvers: SMO for the C-SVC dual used by the kernel SVM
//! estimator, and dual coordinate descent for the logistic regression dual.
//! The file-based external backend lives in the `liblinear` module.

pub mod dcd;
pub mod smo;

pub use self::dcd::DcdBackend;
pub use self::smo::{SmoConfig, SmoSolution, SmoSolver};
