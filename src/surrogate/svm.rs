//! Binary kernel SVM surrogate
//!
//! Trains a C-SVC with the in-process SMO solver, then serves every query
//! through the compressed dual representation: decision(x) =
//! sum over support vectors of coef_j * K(x, x_j) + intercept. Explanations
//! fall out of the same sum, one signed term per training instance.

use crate::core::{
    n_features, BinaryEstimator, IndexedWeight, KernexError, Result, SparseVector,
};
use crate::kernel::{
    feature_variance, similarity_row, Kernel, KernelConfig, ResolvedKernel,
};
use crate::solver::{SmoConfig, SmoSolver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Multipliers below this are treated as zero when selecting support vectors
const SUPPORT_THRESHOLD: f64 = 1e-12;

/// Hyperparameters for the binary kernel SVM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmParams {
    /// Regularization parameter
    pub c: f64,
    /// Kernel configuration, resolved at fit time
    pub kernel: KernelConfig,
    /// Maximum number of query rows scored per block
    pub pred_size: usize,
    /// Number of training rows verified by the post-fit self-check
    pub n_check: usize,
    /// Absolute tolerance for the decision-value self-check
    pub check_tolerance: f64,
    /// SMO stopping tolerance
    pub solver_tolerance: f64,
    /// SMO outer-pass limit
    pub max_iterations: usize,
    /// Kernel row cache budget in bytes
    pub cache_bytes: usize,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelConfig::Linear,
            pred_size: 1000,
            n_check: 10,
            check_tolerance: 1e-6,
            solver_tolerance: 1e-3,
            max_iterations: 10_000,
            cache_bytes: 100_000_000,
        }
    }
}

#[derive(Clone, Debug)]
struct SvmState {
    rows: Vec<SparseVector>,
    n_features: usize,
    resolved: ResolvedKernel,
    kernel: Arc<dyn Kernel>,
    /// Signed dual coefficients (alpha_j * y_j) at the support indices
    coef: Vec<f64>,
    /// Sorted training indices of the support vectors
    coef_indices: Vec<usize>,
    intercept: f64,
}

/// Binary kernel SVM with per-training-instance explanations
#[derive(Clone, Debug, Default)]
pub struct BinarySvm {
    params: SvmParams,
    state: Option<SvmState>,
}

impl BinarySvm {
    pub fn new(params: SvmParams) -> Self {
        Self {
            params,
            state: None,
        }
    }

    pub fn params(&self) -> &SvmParams {
        &self.params
    }

    /// Resolved kernel hyperparameters, available after a successful fit
    pub fn resolved_kernel(&self) -> Result<ResolvedKernel> {
        Ok(self.state()?.resolved)
    }

    /// Intercept of the fitted decision function
    pub fn intercept(&self) -> Result<f64> {
        Ok(self.state()?.intercept)
    }

    /// Number of support vectors
    pub fn n_support(&self) -> Result<usize> {
        Ok(self.state()?.coef_indices.len())
    }

    fn state(&self) -> Result<&SvmState> {
        self.state.as_ref().ok_or(KernexError::NotFitted)
    }

    pub(crate) fn training_rows(&self) -> Result<&[SparseVector]> {
        Ok(&self.state()?.rows)
    }

    pub(crate) fn feature_count(&self) -> Result<usize> {
        Ok(self.state()?.n_features)
    }

    pub(crate) fn support_indices(&self) -> Result<&[usize]> {
        Ok(&self.state()?.coef_indices)
    }

    pub(crate) fn support_coef(&self) -> Result<&[f64]> {
        Ok(&self.state()?.coef)
    }

    fn check_width(state: &SvmState, x: &SparseVector) -> Result<()> {
        if x.width() > state.n_features {
            return Err(KernexError::Precondition(format!(
                "Query row has {} feature columns, model was fitted with {}",
                x.width(),
                state.n_features
            )));
        }
        Ok(())
    }

    fn decision_one(state: &SvmState, support_rows: &[SparseVector], x: &SparseVector) -> f64 {
        let sim = similarity_row(state.kernel.as_ref(), x, support_rows);
        sim.iter()
            .zip(state.coef.iter())
            .map(|(&s, &c)| s * c)
            .sum::<f64>()
            + state.intercept
    }

    fn support_rows(state: &SvmState) -> Vec<SparseVector> {
        state
            .coef_indices
            .iter()
            .map(|&i| state.rows[i].clone())
            .collect()
    }

    /// Rebuild a fitted estimator from its persisted parts
    ///
    /// Used when loading a snapshot; the self-check already ran when the
    /// snapshot was produced.
    pub(crate) fn from_parts(
        params: SvmParams,
        rows: Vec<SparseVector>,
        n_features: usize,
        resolved: ResolvedKernel,
        coef_indices: Vec<usize>,
        coef: Vec<f64>,
        intercept: f64,
    ) -> Result<Self> {
        if coef.len() != coef_indices.len() {
            return Err(KernexError::Serialization(format!(
                "Support coefficient count {} does not match index count {}",
                coef.len(),
                coef_indices.len()
            )));
        }
        if coef_indices.iter().any(|&i| i >= rows.len()) {
            return Err(KernexError::Serialization(
                "Support index out of range for stored training rows".to_string(),
            ));
        }

        let kernel = resolved.instantiate()?;
        Ok(Self {
            params,
            state: Some(SvmState {
                rows,
                n_features,
                resolved,
                kernel,
                coef,
                coef_indices,
                intercept,
            }),
        })
    }
}

/// Compare reconstructed decision values against the solver's native ones.
///
/// Values must agree within `tolerance`, and both must land on the same side
/// of the decision boundary (class 1 at decision >= 0). A pair straddling
/// zero fails even when the values themselves are within tolerance.
fn verify_reconstruction(reconstructed: &[f64], native: &[f64], tolerance: f64) -> Result<()> {
    for (i, (&actual, &expected)) in reconstructed.iter().zip(native.iter()).enumerate() {
        if (actual - expected).abs() > tolerance {
            return Err(KernexError::Consistency {
                context: "svm decision".to_string(),
                index: i,
                expected,
                actual,
            });
        }
        if (actual >= 0.0) != (expected >= 0.0) {
            return Err(KernexError::Consistency {
                context: "svm label".to_string(),
                index: i,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

impl BinaryEstimator for BinarySvm {
    fn fit(&mut self, rows: &[SparseVector], y: &[usize]) -> Result<()> {
        self.state = None;

        if rows.is_empty() {
            return Err(KernexError::EmptyDataset);
        }
        if rows.len() != y.len() {
            return Err(KernexError::Precondition(format!(
                "Label count {} does not match row count {}",
                y.len(),
                rows.len()
            )));
        }
        for &label in y {
            if label > 1 {
                return Err(KernexError::InvalidLabel {
                    expected: "0 or 1",
                    actual: label as f64,
                });
            }
        }

        let width = n_features(rows);
        let variance = feature_variance(rows, width);
        let resolved = self.params.kernel.resolve(width, variance)?;
        let kernel = resolved.instantiate()?;

        let y_signed: Vec<f64> = y.iter().map(|&l| if l == 1 { 1.0 } else { -1.0 }).collect();

        let solver = SmoSolver::new(
            Arc::clone(&kernel),
            SmoConfig {
                c: self.params.c,
                tolerance: self.params.solver_tolerance,
                max_iterations: self.params.max_iterations,
                cache_bytes: self.params.cache_bytes,
            },
        );
        let solution = solver.solve(rows, &y_signed)?;

        let mut coef_indices = Vec::new();
        let mut coef = Vec::new();
        for (i, &alpha) in solution.alpha.iter().enumerate() {
            if alpha > SUPPORT_THRESHOLD {
                coef_indices.push(i);
                coef.push(alpha * y_signed[i]);
            }
        }

        self.state = Some(SvmState {
            rows: rows.to_vec(),
            n_features: width,
            resolved,
            kernel: Arc::clone(&kernel),
            coef,
            coef_indices,
            intercept: solution.b,
        });

        // Verify the compressed dual reproduces the solver's own decision
        // values and predicted labels on a prefix of the training set. A
        // divergence means the support-vector compression lost mass and
        // every downstream explanation would be wrong, so the fit fails hard.
        let n_check = self.params.n_check.min(rows.len());
        let reconstructed = self.decision_function(&rows[..n_check])?;
        let native: Vec<f64> = rows[..n_check]
            .iter()
            .map(|x| solution.native_decision(x, kernel.as_ref(), rows, &y_signed))
            .collect();
        if let Err(e) = verify_reconstruction(&reconstructed, &native, self.params.check_tolerance)
        {
            self.state = None;
            return Err(e);
        }

        log::info!(
            "Fitted binary SVM on {} rows ({} support vectors)",
            rows.len(),
            self.state.as_ref().map_or(0, |s| s.coef_indices.len())
        );
        Ok(())
    }

    fn decision_function(&self, rows: &[SparseVector]) -> Result<Vec<f64>> {
        let state = self.state()?;
        let support_rows = Self::support_rows(state);

        let mut decisions = Vec::with_capacity(rows.len());
        for block in rows.chunks(self.params.pred_size.max(1)) {
            for x in block {
                Self::check_width(state, x)?;
                decisions.push(Self::decision_one(state, &support_rows, x));
            }
        }
        Ok(decisions)
    }

    fn predict(&self, rows: &[SparseVector]) -> Result<Vec<usize>> {
        Ok(self
            .decision_function(rows)?
            .into_iter()
            .map(|d| usize::from(d >= 0.0))
            .collect())
    }

    fn get_weight(&self) -> Result<IndexedWeight> {
        let state = self.state()?;
        Ok(IndexedWeight::new(
            state.coef_indices.clone(),
            state.coef.clone(),
            state.rows.len(),
        ))
    }

    fn explain(&self, x: &SparseVector) -> Result<IndexedWeight> {
        let state = self.state()?;
        Self::check_width(state, x)?;

        let support_rows = Self::support_rows(state);
        let sim = similarity_row(state.kernel.as_ref(), x, &support_rows);
        let impact: Vec<f64> = sim
            .iter()
            .zip(state.coef.iter())
            .map(|(&s, &c)| s * c)
            .collect();

        Ok(IndexedWeight::new(
            state.coef_indices.clone(),
            impact,
            state.rows.len(),
        ))
    }

    fn similarity(&self, x: &SparseVector, train_indices: Option<&[usize]>) -> Result<Vec<f64>> {
        let state = self.state()?;
        Self::check_width(state, x)?;

        match train_indices {
            Some(indices) => indices
                .iter()
                .map(|&i| {
                    state.rows.get(i).map(|r| state.kernel.compute(x, r)).ok_or_else(|| {
                        KernexError::Precondition(format!(
                            "Training index {i} out of range for {} rows",
                            state.rows.len()
                        ))
                    })
                })
                .collect(),
            None => Ok(similarity_row(state.kernel.as_ref(), x, &state.rows)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Gamma;
    use approx::assert_abs_diff_eq;

    fn two_blobs() -> (Vec<SparseVector>, Vec<usize>) {
        let rows = vec![
            SparseVector::new(vec![0, 1], vec![2.0, 2.0]),
            SparseVector::new(vec![0, 1], vec![2.5, 1.5]),
            SparseVector::new(vec![0, 1], vec![1.5, 2.5]),
            SparseVector::new(vec![0, 1], vec![-2.0, -2.0]),
            SparseVector::new(vec![0, 1], vec![-2.5, -1.5]),
            SparseVector::new(vec![0, 1], vec![-1.5, -2.5]),
        ];
        let y = vec![1, 1, 1, 0, 0, 0];
        (rows, y)
    }

    #[test]
    fn test_not_fitted() {
        let svm = BinarySvm::default();
        let x = SparseVector::new(vec![0], vec![1.0]);
        assert!(matches!(svm.explain(&x), Err(KernexError::NotFitted)));
        assert!(matches!(svm.get_weight(), Err(KernexError::NotFitted)));
    }

    #[test]
    fn test_invalid_label() {
        let mut svm = BinarySvm::default();
        let rows = vec![SparseVector::new(vec![0], vec![1.0])];
        let result = svm.fit(&rows, &[2]);
        assert!(matches!(result, Err(KernexError::InvalidLabel { .. })));
    }

    #[test]
    fn test_fit_predict_separable() {
        let (rows, y) = two_blobs();
        let mut svm = BinarySvm::default();
        svm.fit(&rows, &y).expect("Should fit");

        assert_eq!(svm.predict(&rows).unwrap(), y);
    }

    #[test]
    fn test_explain_sums_to_decision() {
        let (rows, y) = two_blobs();
        let mut svm = BinarySvm::new(SvmParams {
            kernel: KernelConfig::Rbf {
                gamma: Gamma::Scale,
            },
            ..SvmParams::default()
        });
        svm.fit(&rows, &y).expect("Should fit");

        let x = SparseVector::new(vec![0, 1], vec![1.8, 2.2]);
        let decision = svm.decision_function(std::slice::from_ref(&x)).unwrap()[0];
        let impact = svm.explain(&x).unwrap();
        let intercept = svm.intercept().unwrap();

        assert_abs_diff_eq!(impact.sum() + intercept, decision, epsilon = 1e-9);
    }

    #[test]
    fn test_explain_equals_similarity_times_weight() {
        let (rows, y) = two_blobs();
        let mut svm = BinarySvm::default();
        svm.fit(&rows, &y).expect("Should fit");

        let x = SparseVector::new(vec![0, 1], vec![-1.0, -1.2]);
        let impact = svm.explain(&x).unwrap().to_dense();
        let sim = svm.similarity(&x, None).unwrap();
        let weight = svm.get_weight().unwrap().to_dense();

        for i in 0..rows.len() {
            assert_abs_diff_eq!(impact[i], sim[i] * weight[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_explain_equals_similarity_times_weight_rbf() {
        let (rows, y) = two_blobs();
        let mut svm = BinarySvm::new(SvmParams {
            kernel: KernelConfig::Rbf {
                gamma: Gamma::Scale,
            },
            ..SvmParams::default()
        });
        svm.fit(&rows, &y).expect("Should fit");

        let x = SparseVector::new(vec![0, 1], vec![-1.0, -1.2]);
        let impact = svm.explain(&x).unwrap().to_dense();
        let sim = svm.similarity(&x, None).unwrap();
        let weight = svm.get_weight().unwrap().to_dense();

        for i in 0..rows.len() {
            assert_abs_diff_eq!(impact[i], sim[i] * weight[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_verify_reconstruction_decision_gap() {
        let err = verify_reconstruction(&[1.0, 2.5], &[1.0, 2.0], 1e-6).unwrap_err();
        assert!(matches!(
            err,
            KernexError::Consistency { ref context, index: 1, .. } if context == "svm decision"
        ));
    }

    #[test]
    fn test_verify_reconstruction_label_flip() {
        // Both values sit within tolerance of each other but straddle the
        // decision boundary, so the predicted labels disagree.
        let err = verify_reconstruction(&[5e-7], &[-4e-7], 1e-6).unwrap_err();
        assert!(matches!(
            err,
            KernexError::Consistency { ref context, index: 0, .. } if context == "svm label"
        ));

        assert!(verify_reconstruction(&[5e-7, -1.5], &[4e-7, -1.5], 1e-6).is_ok());
    }

    #[test]
    fn test_weight_zero_outside_support() {
        let (rows, y) = two_blobs();
        let mut svm = BinarySvm::default();
        svm.fit(&rows, &y).expect("Should fit");

        let weight = svm.get_weight().unwrap();
        assert_eq!(weight.n_train(), rows.len());
        assert!(weight.nnz() <= rows.len());
        assert!(weight.nnz() >= 1);
    }

    #[test]
    fn test_similarity_subset() {
        let (rows, y) = two_blobs();
        let mut svm = BinarySvm::default();
        svm.fit(&rows, &y).expect("Should fit");

        let x = SparseVector::new(vec![0, 1], vec![1.0, 1.0]);
        let all = svm.similarity(&x, None).unwrap();
        let subset = svm.similarity(&x, Some(&[4, 1])).unwrap();
        assert_eq!(subset, vec![all[4], all[1]]);

        let err = svm.similarity(&x, Some(&[99])).unwrap_err();
        assert!(matches!(err, KernexError::Precondition(_)));
    }

    #[test]
    fn test_query_width_rejected() {
        let (rows, y) = two_blobs();
        let mut svm = BinarySvm::default();
        svm.fit(&rows, &y).expect("Should fit");

        let wide = SparseVector::new(vec![5], vec![1.0]);
        let err = svm.decision_function(std::slice::from_ref(&wide)).unwrap_err();
        assert!(matches!(err, KernexError::Precondition(_)));
    }

    #[test]
    fn test_blocked_prediction_matches_unblocked() {
        let (rows, y) = two_blobs();
        let mut blocked = BinarySvm::new(SvmParams {
            pred_size: 2,
            ..SvmParams::default()
        });
        let mut whole = BinarySvm::default();
        blocked.fit(&rows, &y).expect("Should fit");
        whole.fit(&rows, &y).expect("Should fit");

        assert_eq!(
            blocked.decision_function(&rows).unwrap(),
            whole.decision_function(&rows).unwrap()
        );
    }

    #[test]
    fn test_failed_fit_leaves_estimator_unusable() {
        let mut svm = BinarySvm::default();
        let rows = vec![SparseVector::new(vec![0], vec![1.0])];
        assert!(svm.fit(&rows, &[2]).is_err());
        assert!(matches!(svm.predict(&rows), Err(KernexError::NotFitted)));
    }
}
