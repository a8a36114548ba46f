//! Sequential Minimal Optimization (SMO) solver
//!
//! In-process trainer for the binary kernel SVM surrogate. Solves the C-SVC
//! dual problem by repeatedly optimizing pairs of Lagrange multipliers,
//! using the classic heuristics: KKT-violating first variable, second
//! variable maximizing |E1 - E2|, with a sequential fallback scan.

use crate::cache::KernelRowCache;
use crate::core::{KernexError, Result, SparseVector};
use crate::kernel::Kernel;
use std::sync::Arc;

/// Configuration for the SMO solver
#[derive(Debug, Clone)]
pub struct SmoConfig {
    /// Regularization parameter (upper bound for alpha)
    pub c: f64,
    /// Tolerance for KKT conditions
    pub tolerance: f64,
    /// Maximum number of outer passes
    pub max_iterations: usize,
    /// Kernel row cache budget in bytes
    pub cache_bytes: usize,
}

impl Default for SmoConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            tolerance: 1e-3,
            max_iterations: 10_000,
            cache_bytes: 100_000_000,
        }
    }
}

/// Solution of the dual problem
///
/// `alpha` holds the raw (non-negative) multipliers for every training row;
/// the caller derives signed coefficients and support indices from it.
#[derive(Debug, Clone)]
pub struct SmoSolution {
    pub alpha: Vec<f64>,
    pub b: f64,
    pub iterations: usize,
}

impl SmoSolution {
    /// Decision value recomputed from the full multiplier vector
    ///
    /// This is the solver's native output: the sum runs over every training
    /// row, with no support-vector subsetting. Estimators check their
    /// compressed dual reconstruction against it.
    pub fn native_decision(
        &self,
        x: &SparseVector,
        kernel: &dyn Kernel,
        rows: &[SparseVector],
        y: &[f64],
    ) -> f64 {
        let mut value = self.b;
        for (i, row) in rows.iter().enumerate() {
            if self.alpha[i] != 0.0 {
                value += self.alpha[i] * y[i] * kernel.compute(x, row);
            }
        }
        value
    }
}

/// SMO solver over a shared kernel
pub struct SmoSolver {
    kernel: Arc<dyn Kernel>,
    config: SmoConfig,
}

impl SmoSolver {
    /// Create a new solver with the given kernel and configuration
    pub fn new(kernel: Arc<dyn Kernel>, config: SmoConfig) -> Self {
        Self { kernel, config }
    }

    /// Solve the dual problem for labels in {-1, +1}
    pub fn solve(&self, rows: &[SparseVector], y: &[f64]) -> Result<SmoSolution> {
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
            if label != 1.0 && label != -1.0 {
                return Err(KernexError::InvalidLabel {
                    expected: "-1 or +1",
                    actual: label,
                });
            }
        }

        let n = rows.len();

        // Single sample: the equality constraint forces alpha to zero, so the
        // decision is pure bias. Predict the sample's own label.
        if n == 1 {
            return Ok(SmoSolution {
                alpha: vec![0.0],
                b: y[0],
                iterations: 0,
            });
        }

        let mut cache = KernelRowCache::with_memory_limit(self.config.cache_bytes, n);
        let mut alpha = vec![0.0; n];

        // Error cache without bias: E_i = sum_j alpha_j y_j K(i,j) - y_i.
        // All alphas start at zero, so E_i = -y_i.
        let mut errors: Vec<f64> = y.iter().map(|&label| -label).collect();

        let mut iterations = 0;
        let mut num_changed = 0;
        let mut examine_all = true;

        while (num_changed > 0 || examine_all) && iterations < self.config.max_iterations {
            num_changed = 0;

            for i in 0..n {
                let at_bound = alpha[i] <= 0.0 || alpha[i] >= self.config.c;
                if !examine_all && at_bound {
                    continue;
                }
                if self.examine(i, rows, y, &mut alpha, &mut errors, &mut cache)? {
                    num_changed += 1;
                }
            }

            if examine_all {
                examine_all = false;
            } else if num_changed == 0 {
                examine_all = true;
            }

            iterations += 1;
        }

        let b = self.bias(&alpha, &errors);
        log::debug!(
            "SMO converged after {iterations} passes ({} bound-free multipliers, cache hit rate {:.2})",
            alpha
                .iter()
                .filter(|&&a| a > 0.0 && a < self.config.c)
                .count(),
            cache.hit_rate()
        );

        Ok(SmoSolution {
            alpha,
            b,
            iterations,
        })
    }

    fn examine(
        &self,
        i: usize,
        rows: &[SparseVector],
        y: &[f64],
        alpha: &mut [f64],
        errors: &mut [f64],
        cache: &mut KernelRowCache,
    ) -> Result<bool> {
        let r_i = errors[i] * y[i];
        let violates = (r_i < -self.config.tolerance && alpha[i] < self.config.c)
            || (r_i > self.config.tolerance && alpha[i] > 0.0);
        if !violates {
            return Ok(false);
        }

        // Second choice heuristic: maximize |E_i - E_j|
        let mut best_j = None;
        let mut max_diff = 0.0;
        for j in 0..rows.len() {
            if j == i {
                continue;
            }
            let diff = (errors[i] - errors[j]).abs();
            if diff > max_diff {
                max_diff = diff;
                best_j = Some(j);
            }
        }

        if let Some(j) = best_j {
            if self.take_step(i, j, rows, y, alpha, errors, cache)? {
                return Ok(true);
            }
        }

        // Fallback: sequential scan over all remaining candidates
        for j in 0..rows.len() {
            if j == i || Some(j) == best_j {
                continue;
            }
            if self.take_step(i, j, rows, y, alpha, errors, cache)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    #[allow(clippy::too_many_arguments)]
    fn take_step(
        &self,
        i: usize,
        j: usize,
        rows: &[SparseVector],
        y: &[f64],
        alpha: &mut [f64],
        errors: &mut [f64],
        cache: &mut KernelRowCache,
    ) -> Result<bool> {
        if i == j {
            return Ok(false);
        }

        let alpha_i_old = alpha[i];
        let alpha_j_old = alpha[j];
        let s = y[i] * y[j];

        let (low, high) = if y[i] != y[j] {
            let diff = alpha_j_old - alpha_i_old;
            (0.0_f64.max(diff), self.config.c.min(self.config.c + diff))
        } else {
            let sum = alpha_i_old + alpha_j_old;
            (0.0_f64.max(sum - self.config.c), self.config.c.min(sum))
        };

        if low >= high {
            return Ok(false);
        }

        let row_i = cache.row(i, self.kernel.as_ref(), rows);
        let row_j = cache.row(j, self.kernel.as_ref(), rows);

        let eta = row_i[i] + row_j[j] - 2.0 * row_i[j];
        if eta <= 0.0 {
            // Quadratic form not positive definite along this direction
            return Ok(false);
        }

        let mut alpha_j_new = alpha_j_old + y[j] * (errors[i] - errors[j]) / eta;
        alpha_j_new = alpha_j_new.clamp(low, high);

        if (alpha_j_new - alpha_j_old).abs()
            < 1e-8 * (alpha_j_new + alpha_j_old + 1e-8)
        {
            return Ok(false);
        }

        let alpha_i_new = alpha_i_old + s * (alpha_j_old - alpha_j_new);

        alpha[i] = alpha_i_new;
        alpha[j] = alpha_j_new;

        let delta_i = y[i] * (alpha_i_new - alpha_i_old);
        let delta_j = y[j] * (alpha_j_new - alpha_j_old);
        for k in 0..rows.len() {
            errors[k] += delta_i * row_i[k] + delta_j * row_j[k];
        }

        Ok(true)
    }

    /// Bias from the mean error over margin support vectors
    fn bias(&self, alpha: &[f64], errors: &[f64]) -> f64 {
        let margin_eps = 1e-8;
        let mut sum = 0.0;
        let mut count = 0;

        for (&a, &e) in alpha.iter().zip(errors.iter()) {
            if a > margin_eps && a < self.config.c - margin_eps {
                sum += e;
                count += 1;
            }
        }

        if count == 0 {
            // Fall back to all support vectors
            for (&a, &e) in alpha.iter().zip(errors.iter()) {
                if a > margin_eps {
                    sum += e;
                    count += 1;
                }
            }
        }

        if count > 0 {
            -sum / count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::LinearKernel;

    fn solver() -> SmoSolver {
        SmoSolver::new(Arc::new(LinearKernel::new()), SmoConfig::default())
    }

    #[test]
    fn test_empty_dataset() {
        let result = solver().solve(&[], &[]);
        assert!(matches!(result, Err(KernexError::EmptyDataset)));
    }

    #[test]
    fn test_invalid_labels() {
        let rows = vec![SparseVector::new(vec![0], vec![1.0])];
        let result = solver().solve(&rows, &[0.5]);
        assert!(matches!(
            result,
            Err(KernexError::InvalidLabel { actual, .. }) if actual == 0.5
        ));
    }

    #[test]
    fn test_label_count_mismatch() {
        let rows = vec![SparseVector::new(vec![0], vec![1.0])];
        let result = solver().solve(&rows, &[1.0, -1.0]);
        assert!(matches!(result, Err(KernexError::Precondition(_))));
    }

    #[test]
    fn test_separable_problem() {
        let rows = vec![
            SparseVector::new(vec![0], vec![2.0]),
            SparseVector::new(vec![0], vec![-2.0]),
            SparseVector::new(vec![0], vec![1.5]),
            SparseVector::new(vec![0], vec![-1.5]),
        ];
        let y = [1.0, -1.0, 1.0, -1.0];

        let solution = solver().solve(&rows, &y).expect("Should solve");
        assert_eq!(solution.alpha.len(), 4);
        assert!(solution.iterations > 0);

        // Training predictions from the native decision
        let kernel = LinearKernel::new();
        for (row, &label) in rows.iter().zip(y.iter()) {
            let d = solution.native_decision(row, &kernel, &rows, &y);
            assert_eq!(d >= 0.0, label > 0.0, "decision {d} vs label {label}");
        }
    }

    #[test]
    fn test_equality_constraint() {
        let rows = vec![
            SparseVector::new(vec![0, 1], vec![1.0, 1.0]),
            SparseVector::new(vec![0, 1], vec![-1.0, -1.0]),
            SparseVector::new(vec![0, 1], vec![1.0, 0.5]),
            SparseVector::new(vec![0, 1], vec![-0.5, -1.0]),
        ];
        let y = [1.0, -1.0, 1.0, -1.0];

        let solution = solver().solve(&rows, &y).expect("Should solve");
        let constraint: f64 = solution
            .alpha
            .iter()
            .zip(y.iter())
            .map(|(&a, &label)| a * label)
            .sum();
        assert!(constraint.abs() < 1e-8, "constraint violation {constraint}");
    }

    #[test]
    fn test_alpha_within_box() {
        let config = SmoConfig {
            c: 0.5,
            ..SmoConfig::default()
        };
        let smo = SmoSolver::new(Arc::new(LinearKernel::new()), config);

        // Overlapping classes force some multipliers to the C bound
        let rows = vec![
            SparseVector::new(vec![0], vec![1.0]),
            SparseVector::new(vec![0], vec![-1.0]),
            SparseVector::new(vec![0], vec![-0.2]),
            SparseVector::new(vec![0], vec![0.2]),
        ];
        let y = [1.0, -1.0, 1.0, -1.0];

        let solution = smo.solve(&rows, &y).expect("Should solve");
        for &a in &solution.alpha {
            assert!((-1e-12..=0.5 + 1e-12).contains(&a));
        }
    }

    #[test]
    fn test_single_sample() {
        let rows = vec![SparseVector::new(vec![0], vec![3.0])];
        let solution = solver().solve(&rows, &[-1.0]).expect("Should solve");
        assert_eq!(solution.alpha, vec![0.0]);
        assert_eq!(solution.b, -1.0);
    }

    #[test]
    fn test_deterministic() {
        let rows = vec![
            SparseVector::new(vec![0, 1], vec![2.0, 1.0]),
            SparseVector::new(vec![0, 1], vec![-1.0, -2.0]),
            SparseVector::new(vec![0, 1], vec![1.5, 0.5]),
            SparseVector::new(vec![0, 1], vec![-0.5, -1.5]),
        ];
        let y = [1.0, -1.0, 1.0, -1.0];

        let a = solver().solve(&rows, &y).expect("Should solve");
        let b = solver().solve(&rows, &y).expect("Should solve");
        assert_eq!(a.alpha, b.alpha);
        assert_eq!(a.b, b.b);
    }
}
