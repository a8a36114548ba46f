//! Sigmoid (hyperbolic tangent) kernel implementation
//!
//! K(x, y) = tanh(γ * <x, y> + coef0)
//!
//! Not positive semi-definite for all parameter values; still accepted here
//! because the contribution decomposition only relies on the decision value
//! being a coefficient-weighted sum of per-instance kernel terms.

use crate::core::SparseVector;
use crate::kernel::linear::dot_product_sparse;
use crate::kernel::Kernel;

/// Sigmoid kernel: K(x, y) = tanh(γ * <x, y> + coef0)
#[derive(Debug, Clone, Copy)]
pub struct SigmoidKernel {
    gamma: f64,
    coef0: f64,
}

impl SigmoidKernel {
    /// Create a new sigmoid kernel
    ///
    /// # Panics
    /// Panics if gamma is not positive
    pub fn new(gamma: f64, coef0: f64) -> Self {
        assert!(gamma > 0.0, "Gamma must be positive, got: {}", gamma);
        Self { gamma, coef0 }
    }

    /// Get the gamma parameter
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Get the independent term
    pub fn coef0(&self) -> f64 {
        self.coef0
    }
}

impl Kernel for SigmoidKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        let dot = dot_product_sparse(x, y);
        (self.gamma * dot + self.coef0).tanh()
    }
}
