//! Core type definitions: sparse feature rows and indexed weight vectors

use serde::{Deserialize, Serialize};

/// Sparse feature row with sorted indices
///
/// Tree-derived feature matrices (leaf one-hot encodings, path features) are
/// mostly zero, so instances are kept as index/value pairs. A dense row is
/// simply a row where every index is present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    /// Sorted indices of non-zero elements
    pub indices: Vec<usize>,
    /// Values corresponding to indices
    pub values: Vec<f64>,
}

impl SparseVector {
    /// Create a new sparse vector, ensuring indices are sorted
    pub fn new(indices: Vec<usize>, values: Vec<f64>) -> Self {
        assert_eq!(
            indices.len(),
            values.len(),
            "Indices and values must have same length"
        );

        // Sort by indices
        let mut pairs: Vec<_> = indices.into_iter().zip(values).collect();
        pairs.sort_by_key(|&(idx, _)| idx);

        let (indices, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self { indices, values }
    }

    /// Create an empty sparse vector
    pub fn empty() -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build a sparse row from a dense slice, dropping exact zeros
    pub fn from_dense(row: &[f64]) -> Self {
        let (indices, values) = row
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0.0)
            .map(|(i, &v)| (i, v))
            .unzip();
        Self { indices, values }
    }

    /// Get the value at a specific index (0 if not present)
    pub fn get(&self, index: usize) -> f64 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    /// Compute squared L2 norm
    pub fn norm_squared(&self) -> f64 {
        self.values.iter().map(|&v| v * v).sum()
    }

    /// Number of non-zero elements
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Check if vector is empty
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// One past the largest index, or 0 for an empty vector
    pub fn width(&self) -> usize {
        self.indices.last().map_or(0, |&i| i + 1)
    }
}

/// Number of feature columns spanned by a set of rows
pub fn n_features(rows: &[SparseVector]) -> usize {
    rows.iter().map(|r| r.width()).max().unwrap_or(0)
}

/// Weight vector over the training-set index space
///
/// A single abstraction for both dual representations: the kernel SVM keeps
/// weights only at support-vector indices, the dual logistic regression keeps
/// one weight per training instance. `n_train` is the logical length; indices
/// not present are zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedWeight {
    indices: Vec<usize>,
    values: Vec<f64>,
    n_train: usize,
}

impl IndexedWeight {
    /// Create an indexed weight vector; indices are sorted on construction
    ///
    /// # Panics
    /// Panics if `indices` and `values` differ in length or an index is out
    /// of range for `n_train`.
    pub fn new(indices: Vec<usize>, values: Vec<f64>, n_train: usize) -> Self {
        assert_eq!(
            indices.len(),
            values.len(),
            "Indices and values must have same length"
        );
        assert!(
            indices.iter().all(|&i| i < n_train),
            "Index out of range for training set of size {n_train}"
        );

        let mut pairs: Vec<_> = indices.into_iter().zip(values).collect();
        pairs.sort_by_key(|&(idx, _)| idx);
        let (indices, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();

        Self {
            indices,
            values,
            n_train,
        }
    }

    /// Create a dense weight vector covering every training instance
    pub fn dense(values: Vec<f64>) -> Self {
        let n_train = values.len();
        Self {
            indices: (0..n_train).collect(),
            values,
            n_train,
        }
    }

    /// Value at training index `i` (0 if not present)
    pub fn get(&self, i: usize) -> f64 {
        match self.indices.binary_search(&i) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    /// Materialize as a dense vector of length `n_train`
    pub fn to_dense(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.n_train];
        for (&i, &v) in self.indices.iter().zip(self.values.iter()) {
            out[i] = v;
        }
        out
    }

    /// Sum of all stored values
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Flip the sign of every stored value
    pub fn negate(&mut self) {
        for v in &mut self.values {
            *v = -*v;
        }
    }

    /// Indices carrying a stored value
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Stored values, aligned with `indices()`
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Logical length (training-set size)
    pub fn n_train(&self) -> usize {
        self.n_train
    }
}

/// Result of a dual-solver backend fit
///
/// Bundles the signed dual coefficients with the backend's own predictions on
/// the training set, so the estimator can verify its reconstruction against
/// the solver's native outputs.
#[derive(Debug, Clone)]
pub struct DualFit {
    /// Signed dual coefficient per training instance (alpha_i * y_i)
    pub coef: Vec<f64>,
    /// Backend's predicted labels on the training set, remapped to {0, 1}
    pub train_labels: Vec<usize>,
    /// Backend's class probabilities on the training set, as [p0, p1]
    ///
    /// `None` when the backend's solver cannot produce probability
    /// estimates (e.g. the squared-hinge SVC dual); such backends are not
    /// usable by the logistic regression estimator.
    pub train_proba: Option<Vec<[f64; 2]>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_vector_creation() {
        let sv = SparseVector::new(vec![2, 0, 4], vec![2.0, 1.0, 3.0]);

        // Indices are sorted on construction
        assert_eq!(sv.indices, vec![0, 2, 4]);
        assert_eq!(sv.values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_sparse_vector_get() {
        let sv = SparseVector::new(vec![1, 3, 5], vec![1.0, 2.0, 3.0]);

        assert_eq!(sv.get(0), 0.0);
        assert_eq!(sv.get(1), 1.0);
        assert_eq!(sv.get(3), 2.0);
        assert_eq!(sv.get(5), 3.0);
        assert_eq!(sv.get(6), 0.0);
    }

    #[test]
    fn test_sparse_vector_from_dense() {
        let sv = SparseVector::from_dense(&[0.0, 1.5, 0.0, -2.0]);
        assert_eq!(sv.indices, vec![1, 3]);
        assert_eq!(sv.values, vec![1.5, -2.0]);
        assert_eq!(sv.width(), 4);
    }

    #[test]
    fn test_sparse_vector_norm_and_width() {
        let sv = SparseVector::new(vec![0, 1], vec![3.0, 4.0]);
        assert_eq!(sv.norm_squared(), 25.0);
        assert_eq!(sv.width(), 2);
        assert_eq!(SparseVector::empty().width(), 0);
    }

    #[test]
    fn test_n_features() {
        let rows = vec![
            SparseVector::new(vec![0, 7], vec![1.0, 1.0]),
            SparseVector::new(vec![2], vec![1.0]),
        ];
        assert_eq!(n_features(&rows), 8);
        assert_eq!(n_features(&[]), 0);
    }

    #[test]
    #[should_panic(expected = "Indices and values must have same length")]
    fn test_sparse_vector_length_mismatch() {
        SparseVector::new(vec![0, 1], vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_indexed_weight_sparse() {
        let w = IndexedWeight::new(vec![5, 1], vec![0.5, -1.0], 8);

        assert_eq!(w.indices(), &[1, 5]);
        assert_eq!(w.values(), &[-1.0, 0.5]);
        assert_eq!(w.n_train(), 8);
        assert_eq!(w.nnz(), 2);
        assert_eq!(w.get(1), -1.0);
        assert_eq!(w.get(2), 0.0);
        assert_eq!(w.sum(), -0.5);
        assert_eq!(
            w.to_dense(),
            vec![0.0, -1.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0]
        );
    }

    #[test]
    fn test_indexed_weight_dense() {
        let w = IndexedWeight::dense(vec![1.0, -2.0, 3.0]);
        assert_eq!(w.n_train(), 3);
        assert_eq!(w.nnz(), 3);
        assert_eq!(w.to_dense(), vec![1.0, -2.0, 3.0]);
    }

    #[test]
    fn test_indexed_weight_negate() {
        let mut w = IndexedWeight::new(vec![0, 2], vec![1.0, -3.0], 4);
        w.negate();
        assert_eq!(w.to_dense(), vec![-1.0, 0.0, 3.0, 0.0]);
    }

    #[test]
    #[should_panic(expected = "Index out of range")]
    fn test_indexed_weight_out_of_range() {
        IndexedWeight::new(vec![4], vec![1.0], 4);
    }
}
