//! One-vs-rest dispatch over binary surrogate estimators
//!
//! Multiclass problems are decomposed into one binary problem per class,
//! each fitted by a clone of the prototype estimator. Two classes collapse
//! to a single estimator oriented toward the larger label; its explanations
//! are sign-flipped when the explained label is the smaller class, so a
//! positive contribution always pushes toward the explained label.

use crate::core::{BinaryEstimator, IndexedWeight, KernexError, Result, SparseVector};
use crate::solver::DcdBackend;
use crate::surrogate::klr::{BinaryKernelLogisticRegression, KlrParams};
use crate::surrogate::svm::{BinarySvm, SvmParams};

/// One-vs-rest wrapper generic over the binary estimator family
#[derive(Clone, Debug)]
pub struct OneVsRest<E> {
    prototype: E,
    estimators: Vec<E>,
    classes: Vec<usize>,
    n_train: usize,
}

impl<E: BinaryEstimator + Clone> OneVsRest<E> {
    pub fn new(prototype: E) -> Self {
        Self {
            prototype,
            estimators: Vec::new(),
            classes: Vec::new(),
            n_train: 0,
        }
    }

    /// Class labels seen at fit time, ascending
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Number of training rows seen at fit time
    pub fn n_train(&self) -> usize {
        self.n_train
    }

    /// Fitted per-class estimators (one for a binary problem)
    pub fn estimators(&self) -> &[E] {
        &self.estimators
    }

    fn fitted(&self) -> Result<()> {
        if self.estimators.is_empty() {
            return Err(KernexError::NotFitted);
        }
        Ok(())
    }

    fn class_index(&self, label: usize) -> Result<usize> {
        self.classes
            .binary_search(&label)
            .map_err(|_| {
                KernexError::Precondition(format!(
                    "Label {label} was not present in the training set"
                ))
            })
    }

    /// Fit one binary estimator per class (one total for two classes)
    pub fn fit(&mut self, rows: &[SparseVector], y: &[usize]) -> Result<()> {
        self.estimators.clear();
        self.classes.clear();

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

        let mut classes: Vec<usize> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(KernexError::Precondition(format!(
                "Need at least two classes, got {}",
                classes.len()
            )));
        }

        let targets: &[usize] = if classes.len() == 2 {
            // Single estimator oriented toward the larger label
            &classes[1..]
        } else {
            &classes
        };

        let mut estimators = Vec::with_capacity(targets.len());
        for &target in targets {
            let y_bin: Vec<usize> = y.iter().map(|&l| usize::from(l == target)).collect();
            let mut estimator = self.prototype.clone();
            estimator.fit(rows, &y_bin)?;
            estimators.push(estimator);
        }

        self.estimators = estimators;
        self.classes = classes;
        self.n_train = rows.len();
        Ok(())
    }

    /// Decision values of shape (n_rows, n_estimators)
    pub fn decision_function(&self, rows: &[SparseVector]) -> Result<Vec<Vec<f64>>> {
        self.fitted()?;

        let per_estimator: Vec<Vec<f64>> = self
            .estimators
            .iter()
            .map(|e| e.decision_function(rows))
            .collect::<Result<_>>()?;

        Ok((0..rows.len())
            .map(|i| per_estimator.iter().map(|d| d[i]).collect())
            .collect())
    }

    /// Predicted class label per query row
    pub fn predict(&self, rows: &[SparseVector]) -> Result<Vec<usize>> {
        self.fitted()?;

        if self.estimators.len() == 1 {
            return Ok(self.estimators[0]
                .predict(rows)?
                .into_iter()
                .map(|bit| self.classes[bit])
                .collect());
        }

        let decisions = self.decision_function(rows)?;
        Ok(decisions
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (k, &d) in row.iter().enumerate() {
                    if d > row[best] {
                        best = k;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    /// Per-class training-instance weights, one vector per estimator
    pub fn get_weight(&self) -> Result<Vec<IndexedWeight>> {
        self.fitted()?;
        self.estimators.iter().map(|e| e.get_weight()).collect()
    }

    /// Contributions of every training instance to the decision on `x`
    ///
    /// Positive values push toward `target` (the predicted label when
    /// `target` is `None`). For binary problems the single estimator is
    /// oriented toward the larger class, so its contributions are negated
    /// when the explained label is the smaller one.
    pub fn explain(&self, x: &SparseVector, target: Option<usize>) -> Result<IndexedWeight> {
        self.fitted()?;

        let label = match target {
            Some(label) => label,
            None => self.predict(std::slice::from_ref(x))?[0],
        };
        let class_index = self.class_index(label)?;

        if self.estimators.len() == 1 {
            let mut impact = self.estimators[0].explain(x)?;
            if class_index == 0 {
                impact.negate();
            }
            Ok(impact)
        } else {
            self.estimators[class_index].explain(x)
        }
    }

    /// Explain a batch of rows, one weight vector per row
    ///
    /// `y[i]`, when given, is the target label for row i; otherwise each row
    /// is explained toward its predicted label.
    pub fn explain_all(
        &self,
        rows: &[SparseVector],
        y: Option<&[usize]>,
    ) -> Result<Vec<IndexedWeight>> {
        if let Some(y) = y {
            if y.len() != rows.len() {
                return Err(KernexError::Precondition(format!(
                    "Target label count {} does not match row count {}",
                    y.len(),
                    rows.len()
                )));
            }
        }
        rows.iter()
            .enumerate()
            .map(|(i, x)| self.explain(x, y.map(|y| y[i])))
            .collect()
    }

    /// Kernel similarity of `x` to the training rows
    ///
    /// All estimators share one resolved kernel and one training set, so the
    /// first estimator answers for everyone.
    pub fn similarity(&self, x: &SparseVector, train_indices: Option<&[usize]>) -> Result<Vec<f64>> {
        self.fitted()?;
        self.estimators[0].similarity(x, train_indices)
    }

    /// Rebuild a fitted dispatcher from persisted parts
    pub(crate) fn from_parts(
        prototype: E,
        estimators: Vec<E>,
        classes: Vec<usize>,
        n_train: usize,
    ) -> Result<Self> {
        let expected = if classes.len() == 2 { 1 } else { classes.len() };
        if classes.len() < 2 || estimators.len() != expected {
            return Err(KernexError::Serialization(format!(
                "Snapshot has {} estimators for {} classes",
                estimators.len(),
                classes.len()
            )));
        }
        Ok(Self {
            prototype,
            estimators,
            classes,
            n_train,
        })
    }
}

/// Kernel SVM explainer over one-vs-rest dispatch
#[derive(Clone, Debug, Default)]
pub struct SvmExplainer {
    ovr: OneVsRest<BinarySvm>,
}

impl Default for OneVsRest<BinarySvm> {
    fn default() -> Self {
        OneVsRest::new(BinarySvm::default())
    }
}

impl SvmExplainer {
    pub fn new(params: SvmParams) -> Self {
        Self {
            ovr: OneVsRest::new(BinarySvm::new(params)),
        }
    }

    pub fn fit(&mut self, rows: &[SparseVector], y: &[usize]) -> Result<()> {
        self.ovr.fit(rows, y)
    }

    pub fn classes(&self) -> &[usize] {
        self.ovr.classes()
    }

    pub fn decision_function(&self, rows: &[SparseVector]) -> Result<Vec<Vec<f64>>> {
        self.ovr.decision_function(rows)
    }

    pub fn predict(&self, rows: &[SparseVector]) -> Result<Vec<usize>> {
        self.ovr.predict(rows)
    }

    pub fn get_weight(&self) -> Result<Vec<IndexedWeight>> {
        self.ovr.get_weight()
    }

    /// Decision-function intercept per estimator
    pub fn intercepts(&self) -> Result<Vec<f64>> {
        self.ovr.fitted()?;
        self.ovr.estimators().iter().map(|e| e.intercept()).collect()
    }

    pub fn explain(&self, x: &SparseVector, target: Option<usize>) -> Result<IndexedWeight> {
        self.ovr.explain(x, target)
    }

    pub fn explain_all(
        &self,
        rows: &[SparseVector],
        y: Option<&[usize]>,
    ) -> Result<Vec<IndexedWeight>> {
        self.ovr.explain_all(rows, y)
    }

    pub fn similarity(&self, x: &SparseVector, train_indices: Option<&[usize]>) -> Result<Vec<f64>> {
        self.ovr.similarity(x, train_indices)
    }

    pub(crate) fn ovr(&self) -> &OneVsRest<BinarySvm> {
        &self.ovr
    }

    pub(crate) fn from_ovr(ovr: OneVsRest<BinarySvm>) -> Self {
        Self { ovr }
    }
}

/// Dual logistic regression explainer over one-vs-rest dispatch
#[derive(Clone)]
pub struct KlrExplainer<B = DcdBackend> {
    ovr: OneVsRest<BinaryKernelLogisticRegression<B>>,
}

impl Default for KlrExplainer<DcdBackend> {
    fn default() -> Self {
        Self {
            ovr: OneVsRest::new(BinaryKernelLogisticRegression::default()),
        }
    }
}

impl<B: crate::core::DualSolverBackend + Clone> KlrExplainer<B> {
    pub fn new(backend: B, params: KlrParams) -> Self {
        Self {
            ovr: OneVsRest::new(BinaryKernelLogisticRegression::new(backend, params)),
        }
    }

    pub fn fit(&mut self, rows: &[SparseVector], y: &[usize]) -> Result<()> {
        self.ovr.fit(rows, y)
    }

    pub fn classes(&self) -> &[usize] {
        self.ovr.classes()
    }

    pub fn predict(&self, rows: &[SparseVector]) -> Result<Vec<usize>> {
        self.ovr.predict(rows)
    }

    /// Class probabilities of shape (n_rows, n_classes)
    ///
    /// For more than two classes the per-estimator sigmoid outputs are
    /// normalized to sum to one, the usual one-vs-rest convention.
    pub fn predict_proba(&self, rows: &[SparseVector]) -> Result<Vec<Vec<f64>>> {
        let estimators = self.ovr.estimators();
        if estimators.is_empty() {
            return Err(KernexError::NotFitted);
        }

        if estimators.len() == 1 {
            return Ok(estimators[0]
                .predict_proba(rows)?
                .into_iter()
                .map(|p| p.to_vec())
                .collect());
        }

        let per_estimator: Vec<Vec<[f64; 2]>> = estimators
            .iter()
            .map(|e| e.predict_proba(rows))
            .collect::<Result<_>>()?;

        Ok((0..rows.len())
            .map(|i| {
                let raw: Vec<f64> = per_estimator.iter().map(|p| p[i][1]).collect();
                let total: f64 = raw.iter().sum();
                if total > 0.0 {
                    raw.into_iter().map(|p| p / total).collect()
                } else {
                    vec![1.0 / raw.len() as f64; raw.len()]
                }
            })
            .collect())
    }

    pub fn get_weight(&self) -> Result<Vec<IndexedWeight>> {
        self.ovr.get_weight()
    }

    pub fn explain(&self, x: &SparseVector, target: Option<usize>) -> Result<IndexedWeight> {
        self.ovr.explain(x, target)
    }

    pub fn explain_all(
        &self,
        rows: &[SparseVector],
        y: Option<&[usize]>,
    ) -> Result<Vec<IndexedWeight>> {
        self.ovr.explain_all(rows, y)
    }

    pub fn similarity(&self, x: &SparseVector, train_indices: Option<&[usize]>) -> Result<Vec<f64>> {
        self.ovr.similarity(x, train_indices)
    }
}
