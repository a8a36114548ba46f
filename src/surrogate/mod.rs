//! Surrogate estimator families
//!
//! Two families share the [`crate::core::BinaryEstimator`] contract: the
//! kernel SVM (`svm`) and the dual logistic regression (`klr`). Multiclass
//! dispatch and the public facades live in `ovr`.

pub mod klr;
pub mod ovr;
pub mod svm;

pub use self::klr::{BinaryKernelLogisticRegression, KlrParams};
pub use self::ovr::{KlrExplainer, OneVsRest, SvmExplainer};
pub use self::svm::{BinarySvm, SvmParams};
