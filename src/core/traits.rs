//! Capability traits shared by the surrogate estimator families

use crate::core::{DualFit, IndexedWeight, Result, SparseVector};

/// Binary surrogate estimator contract
///
/// Implemented by both the in-process kernel SVM and the dual logistic
/// regression estimator. The one-vs-rest dispatcher is generic over this
/// trait and must not assume which concrete family it holds.
///
/// All query operations require a prior successful `fit` and are read-only
/// against the bound state.
pub trait BinaryEstimator: Send + Sync {
    /// Bind training data and train the dual representation
    ///
    /// Labels must be in {0, 1}. Runs the consistency self-check; on
    /// divergence between the dual reconstruction and the solver's native
    /// outputs the fit fails and the estimator stays unusable.
    fn fit(&mut self, rows: &[SparseVector], y: &[usize]) -> Result<()>;

    /// Raw decision value per query row, in input order
    fn decision_function(&self, rows: &[SparseVector]) -> Result<Vec<f64>>;

    /// Predicted label in {0, 1} per query row
    fn predict(&self, rows: &[SparseVector]) -> Result<Vec<usize>>;

    /// Per-training-instance weight vector over the full training index space
    fn get_weight(&self) -> Result<IndexedWeight>;

    /// Signed contribution of every training instance to the decision on `x`
    ///
    /// Positive means the instance pushed the decision toward class 1.
    fn explain(&self, x: &SparseVector) -> Result<IndexedWeight>;

    /// Kernel similarity of `x` to the training rows (or a subset of them)
    fn similarity(&self, x: &SparseVector, train_indices: Option<&[usize]>) -> Result<Vec<f64>>;
}

/// Dual-solver backend for the kernel logistic regression estimator
///
/// The file-based external solver is one concrete variant; an in-process
/// dual coordinate descent solver is another. Both return the signed dual
/// coefficients together with the backend's own predictions on the training
/// set, which the estimator checks its reconstruction against.
pub trait DualSolverBackend: Send + Sync {
    /// Train on `rows` with labels in {-1, +1} and regularization `c`
    fn fit(&self, rows: &[SparseVector], y: &[i8], c: f64) -> Result<DualFit>;
}
