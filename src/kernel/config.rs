//! Kernel registry and hyperparameter resolution
//!
//! Estimators are configured with a [`KernelConfig`] and resolve it into a
//! concrete kernel exactly once at fit time. The gamma policy follows the
//! usual convention: `Scale` is 1 / (n_features * variance of the training
//! features), `Auto` is 1 / n_features, and `Value` is taken verbatim.

use crate::core::{KernexError, Result, SparseVector};
use crate::kernel::{Kernel, LinearKernel, PolynomialKernel, RbfKernel, SigmoidKernel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Gamma resolution policy for the non-linear kernels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gamma {
    /// 1 / (n_features * variance of the training feature matrix)
    Scale,
    /// 1 / n_features
    Auto,
    /// Use the given value verbatim
    Value(f64),
}

impl Default for Gamma {
    fn default() -> Self {
        Gamma::Scale
    }
}

/// Kernel configuration, resolved to a concrete kernel at fit time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelConfig {
    Linear,
    Rbf { gamma: Gamma },
    Polynomial { gamma: Gamma, coef0: f64, degree: u32 },
    Sigmoid { gamma: Gamma, coef0: f64 },
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig::Linear
    }
}

/// Fully resolved kernel hyperparameters, frozen at fit time
///
/// Unlike [`KernelConfig`] there is no gamma policy left to apply, so the
/// same kernel can be reinstantiated later (e.g. when loading a snapshot)
/// without access to the training matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ResolvedKernel {
    Linear,
    Rbf { gamma: f64 },
    Polynomial { gamma: f64, coef0: f64, degree: u32 },
    Sigmoid { gamma: f64, coef0: f64 },
}

impl ResolvedKernel {
    /// Instantiate the concrete kernel
    pub fn instantiate(&self) -> Result<Arc<dyn Kernel>> {
        let check_gamma = |gamma: f64| -> Result<f64> {
            if gamma <= 0.0 || !gamma.is_finite() {
                return Err(KernexError::Configuration(format!(
                    "Resolved gamma must be positive and finite, got {gamma}"
                )));
            }
            Ok(gamma)
        };

        match *self {
            ResolvedKernel::Linear => Ok(Arc::new(LinearKernel::new())),
            ResolvedKernel::Rbf { gamma } => Ok(Arc::new(RbfKernel::new(check_gamma(gamma)?))),
            ResolvedKernel::Polynomial {
                gamma,
                coef0,
                degree,
            } => Ok(Arc::new(PolynomialKernel::new(
                check_gamma(gamma)?,
                coef0,
                degree,
            ))),
            ResolvedKernel::Sigmoid { gamma, coef0 } => {
                Ok(Arc::new(SigmoidKernel::new(check_gamma(gamma)?, coef0)))
            }
        }
    }
}

impl KernelConfig {
    /// Look up a kernel by name with default hyperparameters
    ///
    /// Accepts `linear`, `rbf`, `poly` and `sigmoid`; anything else is a
    /// configuration error.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "linear" => Ok(KernelConfig::Linear),
            "rbf" => Ok(KernelConfig::Rbf {
                gamma: Gamma::Scale,
            }),
            "poly" => Ok(KernelConfig::Polynomial {
                gamma: Gamma::Scale,
                coef0: 0.0,
                degree: 3,
            }),
            "sigmoid" => Ok(KernelConfig::Sigmoid {
                gamma: Gamma::Scale,
                coef0: 0.0,
            }),
            other => Err(KernexError::Configuration(format!(
                "Unknown kernel: '{other}' (expected linear, rbf, poly or sigmoid)"
            ))),
        }
    }

    /// Resolve this configuration against the training matrix
    ///
    /// `feature_variance` is only consulted for the `Gamma::Scale` policy;
    /// pass the value computed from the training matrix. The resolved gamma
    /// is frozen for the estimator's lifetime.
    pub fn resolve(&self, n_features: usize, feature_variance: f64) -> Result<ResolvedKernel> {
        match *self {
            KernelConfig::Linear => Ok(ResolvedKernel::Linear),
            KernelConfig::Rbf { gamma } => {
                let gamma = resolve_gamma(gamma, n_features, feature_variance)?;
                Ok(ResolvedKernel::Rbf { gamma })
            }
            KernelConfig::Polynomial {
                gamma,
                coef0,
                degree,
            } => {
                if degree == 0 {
                    return Err(KernexError::Configuration(
                        "Polynomial degree must be positive".to_string(),
                    ));
                }
                let gamma = resolve_gamma(gamma, n_features, feature_variance)?;
                Ok(ResolvedKernel::Polynomial {
                    gamma,
                    coef0,
                    degree,
                })
            }
            KernelConfig::Sigmoid { gamma, coef0 } => {
                let gamma = resolve_gamma(gamma, n_features, feature_variance)?;
                Ok(ResolvedKernel::Sigmoid { gamma, coef0 })
            }
        }
    }
}

fn resolve_gamma(gamma: Gamma, n_features: usize, feature_variance: f64) -> Result<f64> {
    if n_features == 0 {
        return Err(KernexError::Configuration(
            "Cannot resolve gamma for a zero-width feature matrix".to_string(),
        ));
    }

    let value = match gamma {
        Gamma::Scale => {
            if feature_variance <= 0.0 || !feature_variance.is_finite() {
                return Err(KernexError::Configuration(format!(
                    "Gamma 'scale' requires positive feature variance, got {feature_variance}"
                )));
            }
            1.0 / (n_features as f64 * feature_variance)
        }
        Gamma::Auto => 1.0 / n_features as f64,
        Gamma::Value(v) => v,
    };

    if value <= 0.0 || !value.is_finite() {
        return Err(KernexError::Configuration(format!(
            "Resolved gamma must be positive and finite, got {value}"
        )));
    }

    Ok(value)
}

/// Variance of the training feature matrix, implicit zeros included
///
/// Matches the variance of the dense n_samples x n_features matrix the
/// sparse rows represent, which is what the `Gamma::Scale` policy expects.
pub fn feature_variance(rows: &[SparseVector], n_features: usize) -> f64 {
    let total = rows.len() * n_features;
    if total == 0 {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for row in rows {
        for &v in &row.values {
            sum += v;
            sum_sq += v * v;
        }
    }

    let mean = sum / total as f64;
    (sum_sq / total as f64 - mean * mean).max(0.0)
}
