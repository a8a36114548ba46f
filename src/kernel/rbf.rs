//! RBF (Radial Basis Function) kernel implementation
//!
//! The RBF kernel is defined as: K(x, y) = exp(-γ * ||x - y||²)
//! where γ (gamma) is a hyperparameter that controls the kernel width.

use crate::core::SparseVector;
use crate::kernel::Kernel;

/// RBF (Radial Basis Function) kernel: K(x, y) = exp(-γ * ||x - y||²)
///
/// The gamma parameter controls the "reach" of each training example:
/// high gamma means only close points influence each other, low gamma lets
/// distant points matter. Gamma is resolved once at fit time through
/// [`crate::kernel::KernelConfig`] and frozen afterwards.
#[derive(Debug, Clone, Copy)]
pub struct RbfKernel {
    gamma: f64,
}

impl RbfKernel {
    /// Create a new RBF kernel with specified gamma parameter
    ///
    /// # Panics
    /// Panics if gamma is not positive
    pub fn new(gamma: f64) -> Self {
        assert!(gamma > 0.0, "Gamma must be positive, got: {}", gamma);
        Self { gamma }
    }

    /// Get the gamma parameter
    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

impl Kernel for RbfKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        let squared_distance = squared_euclidean_distance(x, y);
        (-self.gamma * squared_distance).exp()
    }
}

/// Compute squared Euclidean distance between two sparse vectors
///
/// Merges the two sorted index lists: overlapping indices contribute
/// (xᵢ - yᵢ)², indices present in only one vector contribute that value
/// squared.
pub(crate) fn squared_euclidean_distance(x: &SparseVector, y: &SparseVector) -> f64 {
    let mut distance_sq = 0.0;
    let mut i = 0;
    let mut j = 0;

    while i < x.indices.len() && j < y.indices.len() {
        let x_idx = x.indices[i];
        let y_idx = y.indices[j];

        if x_idx == y_idx {
            let diff = x.values[i] - y.values[j];
            distance_sq += diff * diff;
            i += 1;
            j += 1;
        } else if x_idx < y_idx {
            distance_sq += x.values[i] * x.values[i];
            i += 1;
        } else {
            distance_sq += y.values[j] * y.values[j];
            j += 1;
        }
    }

    while i < x.indices.len() {
        distance_sq += x.values[i] * x.values[i];
        i += 1;
    }

    while j < y.indices.len() {
        distance_sq += y.values[j] * y.values[j];
        j += 1;
    }

    distance_sq
}
