//! Dual coordinate descent for L2-regularized logistic regression
//!
//! In-process backend for the dual logistic regression estimator. Solves the
//! same dual problem as the external `train -s 7` solver: one coordinate pass
//! per instance, each coordinate update a small Newton iteration on the
//! per-instance subproblem, with a shrinking inner tolerance.

use crate::core::{DualFit, DualSolverBackend, KernexError, Result, SparseVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// In-process dual logistic regression solver
#[derive(Debug, Clone)]
pub struct DcdBackend {
    /// Maximum number of outer passes over the training set
    pub max_iterations: usize,
    /// Stopping tolerance on the maximum projected gradient
    pub epsilon: f64,
    /// Seed for the per-pass coordinate shuffle
    pub random_state: u64,
}

impl Default for DcdBackend {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            epsilon: 0.1,
            random_state: 1,
        }
    }
}

impl DcdBackend {
    pub fn new(random_state: u64) -> Self {
        Self {
            random_state,
            ..Self::default()
        }
    }
}

fn dot_dense(w: &[f64], x: &SparseVector) -> f64 {
    x.indices
        .iter()
        .zip(x.values.iter())
        .map(|(&i, &v)| w[i] * v)
        .sum()
}

fn axpy(w: &mut [f64], scale: f64, x: &SparseVector) {
    for (&i, &v) in x.indices.iter().zip(x.values.iter()) {
        w[i] += scale * v;
    }
}

impl DualSolverBackend for DcdBackend {
    fn fit(&self, rows: &[SparseVector], y: &[i8], c: f64) -> Result<DualFit> {
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
            if label != 1 && label != -1 {
                return Err(KernexError::InvalidLabel {
                    expected: "-1 or +1",
                    actual: label as f64,
                });
            }
        }
        if c <= 0.0 || !c.is_finite() {
            return Err(KernexError::Configuration(format!(
                "Regularization c must be positive and finite, got {c}"
            )));
        }

        let n = rows.len();
        let n_features = crate::core::n_features(rows);
        let max_inner = 100;
        let mut innereps = 1e-2;
        let innereps_min = 1e-8_f64.min(self.epsilon);

        // alpha[2i] is the multiplier for instance i, alpha[2i+1] its
        // complement C - alpha[2i]; both stay strictly inside (0, C).
        let init = (0.001 * c).min(1e-8);
        let mut alpha = vec![0.0; 2 * n];
        for i in 0..n {
            alpha[2 * i] = init;
            alpha[2 * i + 1] = c - init;
        }

        let mut w = vec![0.0; n_features];
        let xtx: Vec<f64> = rows.iter().map(|r| r.norm_squared()).collect();
        for (i, row) in rows.iter().enumerate() {
            axpy(&mut w, y[i] as f64 * alpha[2 * i], row);
        }

        let mut rng = StdRng::seed_from_u64(self.random_state);
        let mut index: Vec<usize> = (0..n).collect();
        let mut iterations = 0;

        while iterations < self.max_iterations {
            // Fisher-Yates pass order
            for i in 0..n {
                let j = rng.gen_range(i..n);
                index.swap(i, j);
            }

            let mut newton_iter = 0;
            let mut gmax = 0.0_f64;

            for &i in &index {
                let yi = y[i] as f64;
                let a = xtx[i];
                let b = yi * dot_dense(&w, &rows[i]);

                // Pick the coordinate direction with descending objective
                let (ind1, ind2, sign) =
                    if 0.5 * a * (alpha[2 * i + 1] - alpha[2 * i]) + b < 0.0 {
                        (2 * i + 1, 2 * i, -1.0)
                    } else {
                        (2 * i, 2 * i + 1, 1.0)
                    };

                let alpha_old = alpha[ind1];
                let mut z = alpha_old;
                if c - z < 0.5 * c {
                    z *= 0.1;
                }
                let mut gp = a * (z - alpha_old) + sign * b + (z / (c - z)).ln();
                gmax = gmax.max(gp.abs());

                // Newton iteration on the one-variable subproblem
                let eta = 0.1;
                let mut inner = 0;
                while gp.abs() > innereps && inner <= max_inner {
                    let gpp = a + c / ((c - z) * z);
                    let tentative = z - gp / gpp;
                    if tentative <= 0.0 {
                        z *= eta;
                    } else {
                        z = tentative;
                    }
                    gp = a * (z - alpha_old) + sign * b + (z / (c - z)).ln();
                    newton_iter += 1;
                    inner += 1;
                }

                if inner > 0 {
                    alpha[ind1] = z;
                    alpha[ind2] = c - z;
                    axpy(&mut w, sign * (z - alpha_old) * yi, &rows[i]);
                }
            }

            iterations += 1;

            if gmax < self.epsilon {
                break;
            }
            if newton_iter <= n / 10 {
                innereps = innereps_min.max(0.1 * innereps);
            }
        }

        log::debug!("DCD converged after {iterations} passes over {n} instances");

        let coef: Vec<f64> = (0..n).map(|i| alpha[2 * i] * y[i] as f64).collect();

        // Native training-set predictions from the primal weights. Decision
        // values are oriented toward the +1 label; p1 is its probability.
        let mut train_labels = Vec::with_capacity(n);
        let mut train_proba = Vec::with_capacity(n);
        for row in rows {
            let decision = dot_dense(&w, row);
            let p1 = 1.0 / (1.0 + (-decision).exp());
            train_labels.push(if decision > 0.0 { 1 } else { 0 });
            train_proba.push([1.0 - p1, p1]);
        }

        Ok(DualFit {
            coef,
            train_labels,
            train_proba: Some(train_proba),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Vec<SparseVector>, Vec<i8>) {
        let rows = vec![
            SparseVector::new(vec![0, 1], vec![2.0, 1.5]),
            SparseVector::new(vec![0, 1], vec![1.5, 2.0]),
            SparseVector::new(vec![0, 1], vec![2.5, 2.5]),
            SparseVector::new(vec![0, 1], vec![-2.0, -1.5]),
            SparseVector::new(vec![0, 1], vec![-1.5, -2.0]),
            SparseVector::new(vec![0, 1], vec![-2.5, -2.5]),
        ];
        let y = vec![1, 1, 1, -1, -1, -1];
        (rows, y)
    }

    #[test]
    fn test_empty_dataset() {
        let result = DcdBackend::default().fit(&[], &[], 1.0);
        assert!(matches!(result, Err(KernexError::EmptyDataset)));
    }

    #[test]
    fn test_invalid_label() {
        let rows = vec![SparseVector::new(vec![0], vec![1.0])];
        let result = DcdBackend::default().fit(&rows, &[0], 1.0);
        assert!(matches!(result, Err(KernexError::InvalidLabel { .. })));
    }

    #[test]
    fn test_invalid_c() {
        let rows = vec![SparseVector::new(vec![0], vec![1.0])];
        let result = DcdBackend::default().fit(&rows, &[1], 0.0);
        assert!(matches!(result, Err(KernexError::Configuration(_))));
    }

    #[test]
    fn test_separable_training_predictions() {
        let (rows, y) = blobs();
        let fit = DcdBackend::default().fit(&rows, &y, 1.0).expect("Should fit");

        let proba = fit.train_proba.as_ref().expect("Solver reports probabilities");
        for (i, &label) in y.iter().enumerate() {
            let expected = if label == 1 { 1 } else { 0 };
            assert_eq!(fit.train_labels[i], expected);
            let [p0, p1] = proba[i];
            assert!((p0 + p1 - 1.0).abs() < 1e-12);
            assert!(if expected == 1 { p1 > 0.5 } else { p0 > 0.5 });
        }
    }

    #[test]
    fn test_coef_signs_follow_labels() {
        let (rows, y) = blobs();
        let fit = DcdBackend::default().fit(&rows, &y, 1.0).expect("Should fit");

        // alpha stays strictly inside (0, C), so each signed coefficient
        // carries its instance's label sign and stays within the box.
        assert_eq!(fit.coef.len(), rows.len());
        for (&coef, &label) in fit.coef.iter().zip(y.iter()) {
            assert!(coef * label as f64 > 0.0);
            assert!(coef.abs() < 1.0 + 1e-12);
        }
    }

    #[test]
    fn test_reconstruction_matches_native_decision() {
        let (rows, y) = blobs();
        let fit = DcdBackend::default().fit(&rows, &y, 1.0).expect("Should fit");

        // w = sum_j coef_j x_j, so the linear-kernel dual reconstruction of
        // the decision must match the probability the backend reports.
        let proba = fit.train_proba.as_ref().expect("Solver reports probabilities");
        for (i, x) in rows.iter().enumerate() {
            let decision: f64 = rows
                .iter()
                .zip(fit.coef.iter())
                .map(|(xj, &cj)| {
                    cj * xj
                        .indices
                        .iter()
                        .zip(xj.values.iter())
                        .map(|(&k, &v)| v * x.get(k))
                        .sum::<f64>()
                })
                .sum();
            let p1 = 1.0 / (1.0 + (-decision).exp());
            assert!((p1 - proba[i][1]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let (rows, y) = blobs();
        let a = DcdBackend::new(42).fit(&rows, &y, 1.0).expect("Should fit");
        let b = DcdBackend::new(42).fit(&rows, &y, 1.0).expect("Should fit");
        assert_eq!(a.coef, b.coef);
        assert_eq!(a.train_proba, b.train_proba);
    }
}
