//! Kernel trait definition

use crate::core::SparseVector;

/// Kernel function trait
///
/// A kernel function K(x, y) must satisfy Mercer's condition to be valid for
/// SVM training. Any kernel of a (query, single-training-instance) pair keeps
/// the contribution decomposition exact, because the decision value is a sum
/// of per-instance kernel terms weighted by scalar dual coefficients.
pub trait Kernel: Send + Sync + std::fmt::Debug {
    /// Compute kernel value K(x, y)
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64;
}

/// Similarity of one query row against a block of reference rows
pub fn similarity_row(kernel: &dyn Kernel, x: &SparseVector, refs: &[SparseVector]) -> Vec<f64> {
    refs.iter().map(|r| kernel.compute(x, r)).collect()
}

/// Dense similarity matrix of shape (n_query, n_reference)
pub fn similarity_matrix(
    kernel: &dyn Kernel,
    queries: &[SparseVector],
    refs: &[SparseVector],
) -> Vec<Vec<f64>> {
    queries
        .iter()
        .map(|q| similarity_row(kernel, q, refs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::LinearKernel;

    #[test]
    fn test_similarity_matrix_shape() {
        let kernel = LinearKernel::new();
        let queries = vec![
            SparseVector::new(vec![0], vec![1.0]),
            SparseVector::new(vec![0], vec![2.0]),
        ];
        let refs = vec![
            SparseVector::new(vec![0], vec![3.0]),
            SparseVector::new(vec![0], vec![4.0]),
            SparseVector::new(vec![0], vec![5.0]),
        ];

        let sim = similarity_matrix(&kernel, &queries, &refs);
        assert_eq!(sim.len(), 2);
        assert_eq!(sim[0], vec![3.0, 4.0, 5.0]);
        assert_eq!(sim[1], vec![6.0, 8.0, 10.0]);
    }
}
