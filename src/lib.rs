//! Kernel-surrogate explanation engine for classifiers
//!
//! Fits a kernel SVM or a dual logistic regression whose decision value is a
//! sum of per-training-instance kernel terms, then decomposes any prediction
//! into the signed contribution of each training instance.

pub mod cache;
pub mod core;
pub mod kernel;
pub mod liblinear;
pub mod persistence;
pub mod solver;
pub mod surrogate;

// Re-export main types for convenience
pub use crate::cache::{CacheStats, KernelRowCache};
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::core::{KernexError, Result};
pub use crate::kernel::{Gamma, Kernel, KernelConfig, LinearKernel, ResolvedKernel};
pub use crate::liblinear::{LiblinearBackend, SolverId};
pub use crate::solver::{DcdBackend, SmoConfig, SmoSolver};
pub use crate::surrogate::{
    BinaryKernelLogisticRegression, BinarySvm, KlrExplainer, KlrParams, OneVsRest, SvmExplainer,
    SvmParams,
};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
