//! Kernel functions and the fit-time kernel registry

pub mod config;
pub mod linear;
pub mod polynomial;
pub mod rbf;
pub mod sigmoid;
pub mod traits;

pub use self::config::{feature_variance, Gamma, KernelConfig, ResolvedKernel};
pub use self::linear::LinearKernel;
pub use self::polynomial::PolynomialKernel;
pub use self::rbf::RbfKernel;
pub use self::sigmoid::SigmoidKernel;
pub use self::traits::{similarity_matrix, similarity_row, Kernel};
