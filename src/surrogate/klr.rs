//! Binary kernel logistic regression surrogate
//!
//! Delegates training to a dual-solver backend (in-process coordinate
//! descent or the external file-based solver) and keeps one signed dual
//! coefficient per training instance. Every query is served through the
//! linear-kernel dual reconstruction: logit(x) = sum over training rows of
//! coef_j * <x, x_j>, so probabilities, labels and explanations all come
//! from the same per-instance decomposition.

use crate::core::{
    BinaryEstimator, DualFit, DualSolverBackend, IndexedWeight, KernexError, Result, SparseVector,
};
use crate::kernel::{similarity_row, Kernel, LinearKernel};
use crate::solver::DcdBackend;

/// Hyperparameters for the dual logistic regression estimator
#[derive(Debug, Clone)]
pub struct KlrParams {
    /// Regularization parameter, bounding each multiplier by 0 <= alpha <= C
    pub c: f64,
    /// Maximum number of query rows scored per block
    pub pred_size: usize,
    /// Number of training rows verified by the post-fit self-check
    pub n_check: usize,
    /// Absolute tolerance when comparing reconstructed probabilities against
    /// the backend's native ones
    pub proba_tolerance: f64,
}

impl Default for KlrParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            pred_size: 1000,
            n_check: 10,
            proba_tolerance: 1e-5,
        }
    }
}

#[derive(Clone)]
struct KlrState {
    rows: Vec<SparseVector>,
    n_features: usize,
    /// Signed dual coefficient per training instance
    coef: Vec<f64>,
}

/// Binary kernel logistic regression over a dual-solver backend
#[derive(Clone)]
pub struct BinaryKernelLogisticRegression<B = DcdBackend> {
    backend: B,
    params: KlrParams,
    kernel: LinearKernel,
    state: Option<KlrState>,
}

impl Default for BinaryKernelLogisticRegression<DcdBackend> {
    fn default() -> Self {
        Self::new(DcdBackend::default(), KlrParams::default())
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl<B: DualSolverBackend> BinaryKernelLogisticRegression<B> {
    pub fn new(backend: B, params: KlrParams) -> Self {
        Self {
            backend,
            params,
            kernel: LinearKernel::new(),
            state: None,
        }
    }

    pub fn params(&self) -> &KlrParams {
        &self.params
    }

    fn state(&self) -> Result<&KlrState> {
        self.state.as_ref().ok_or(KernexError::NotFitted)
    }

    fn check_width(state: &KlrState, x: &SparseVector) -> Result<()> {
        if x.width() > state.n_features {
            return Err(KernexError::Precondition(format!(
                "Query row has {} feature columns, model was fitted with {}",
                x.width(),
                state.n_features
            )));
        }
        Ok(())
    }

    /// Class probabilities [p0, p1] per query row
    pub fn predict_proba(&self, rows: &[SparseVector]) -> Result<Vec<[f64; 2]>> {
        Ok(self
            .decision_function(rows)?
            .into_iter()
            .map(|logit| {
                let p1 = sigmoid(logit);
                [1.0 - p1, p1]
            })
            .collect())
    }
}

impl<B: DualSolverBackend> BinaryEstimator for BinaryKernelLogisticRegression<B> {
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

        // The dual solvers converge faster with symmetric labels
        let y_signed: Vec<i8> = y.iter().map(|&l| if l == 1 { 1 } else { -1 }).collect();
        let DualFit {
            coef,
            train_labels,
            train_proba,
        } = self.backend.fit(rows, &y_signed, self.params.c)?;

        // The self-check below compares probabilities, so a backend whose
        // solver cannot produce them (a plain SVC dual) is not usable here.
        let train_proba = train_proba.ok_or_else(|| {
            KernexError::Configuration(
                "Dual solver backend does not report probability estimates".to_string(),
            )
        })?;

        if coef.len() != rows.len() {
            return Err(KernexError::Precondition(format!(
                "Backend returned {} coefficients for {} training rows",
                coef.len(),
                rows.len()
            )));
        }

        self.state = Some(KlrState {
            rows: rows.to_vec(),
            n_features: crate::core::n_features(rows),
            coef,
        });

        // The reconstruction must agree with the backend's own training-set
        // predictions, otherwise the coefficients were parsed or ordered
        // wrong and every explanation would be garbage.
        let n_check = self.params.n_check.min(rows.len());
        let labels = self.predict(&rows[..n_check])?;
        let proba = self.predict_proba(&rows[..n_check])?;
        for i in 0..n_check {
            if labels[i] != train_labels[i] {
                self.state = None;
                return Err(KernexError::Consistency {
                    context: "klr label".to_string(),
                    index: i,
                    expected: train_labels[i] as f64,
                    actual: labels[i] as f64,
                });
            }
            for k in 0..2 {
                if (proba[i][k] - train_proba[i][k]).abs() > self.params.proba_tolerance {
                    self.state = None;
                    return Err(KernexError::Consistency {
                        context: format!("klr probability of class {k}"),
                        index: i,
                        expected: train_proba[i][k],
                        actual: proba[i][k],
                    });
                }
            }
        }

        log::info!("Fitted dual logistic regression on {} rows", rows.len());
        Ok(())
    }

    fn decision_function(&self, rows: &[SparseVector]) -> Result<Vec<f64>> {
        let state = self.state()?;

        let mut logits = Vec::with_capacity(rows.len());
        for block in rows.chunks(self.params.pred_size.max(1)) {
            for x in block {
                Self::check_width(state, x)?;
                let sim = similarity_row(&self.kernel, x, &state.rows);
                logits.push(
                    sim.iter()
                        .zip(state.coef.iter())
                        .map(|(&s, &c)| s * c)
                        .sum(),
                );
            }
        }
        Ok(logits)
    }

    fn predict(&self, rows: &[SparseVector]) -> Result<Vec<usize>> {
        Ok(self
            .predict_proba(rows)?
            .into_iter()
            .map(|[p0, p1]| usize::from(p1 > p0))
            .collect())
    }

    fn get_weight(&self) -> Result<IndexedWeight> {
        Ok(IndexedWeight::dense(self.state()?.coef.clone()))
    }

    fn explain(&self, x: &SparseVector) -> Result<IndexedWeight> {
        let state = self.state()?;
        Self::check_width(state, x)?;

        let sim = similarity_row(&self.kernel, x, &state.rows);
        let impact: Vec<f64> = sim
            .iter()
            .zip(state.coef.iter())
            .map(|(&s, &c)| s * c)
            .collect();
        Ok(IndexedWeight::dense(impact))
    }

    fn similarity(&self, x: &SparseVector, train_indices: Option<&[usize]>) -> Result<Vec<f64>> {
        let state = self.state()?;
        Self::check_width(state, x)?;

        match train_indices {
            Some(indices) => indices
                .iter()
                .map(|&i| {
                    state.rows.get(i).map(|r| self.kernel.compute(x, r)).ok_or_else(|| {
                        KernexError::Precondition(format!(
                            "Training index {i} out of range for {} rows",
                            state.rows.len()
                        ))
                    })
                })
                .collect(),
            None => Ok(similarity_row(&self.kernel, x, &state.rows)),
        }
    }
}
