//! Polynomial kernel implementation
//!
//! K(x, y) = (γ * <x, y> + coef0)^degree

use crate::core::SparseVector;
use crate::kernel::linear::dot_product_sparse;
use crate::kernel::Kernel;

/// Polynomial kernel: K(x, y) = (γ * <x, y> + coef0)^degree
///
/// Captures feature interactions up to `degree`. With degree 1, γ = 1 and
/// coef0 = 0 this reduces to the linear kernel.
#[derive(Debug, Clone, Copy)]
pub struct PolynomialKernel {
    gamma: f64,
    coef0: f64,
    degree: u32,
}

impl PolynomialKernel {
    /// Create a new polynomial kernel
    ///
    /// # Panics
    /// Panics if gamma is not positive or degree is zero
    pub fn new(gamma: f64, coef0: f64, degree: u32) -> Self {
        assert!(gamma > 0.0, "Gamma must be positive, got: {}", gamma);
        assert!(degree > 0, "Degree must be positive");
        Self {
            gamma,
            coef0,
            degree,
        }
    }

    /// Get the gamma parameter
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Get the independent term
    pub fn coef0(&self) -> f64 {
        self.coef0
    }

    /// Get the polynomial degree
    pub fn degree(&self) -> u32 {
        self.degree
    }
}

impl Kernel for PolynomialKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        let dot = dot_product_sparse(x, y);
        (self.gamma * dot + self.coef0).powi(self.degree as i32)
    }
}
