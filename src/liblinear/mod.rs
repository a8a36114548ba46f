//! File-based adapter for the external liblinear `train`/`predict` binaries
//!
//! The dual logistic regression estimator can delegate its solve to a
//! patched liblinear build that appends the dual coefficients to the model
//! file. This module owns the round trip: write the training set in sparse
//! text format, invoke the solver, parse the model and prediction files
//! back, and clean up the scratch directory.
//!
//! File formats:
//!   training data  one row per line, `<label> <idx>:<value> ...` with
//!                  1-based feature indices and labels in {-1, +1}
//!   model          liblinear header (`solver_type`, `nr_class`, `label`,
//!                  `nr_feature`, `bias`), a `w` block with one primal
//!                  weight per line, then `nr_sample <n>` and an `alpha`
//!                  block holding the n signed dual coefficients
//!   predictions    with probabilities: a `labels 1 -1` (or `labels 1 0`)
//!                  header, then `<label> <p_first> <p_second>` per row;
//!                  without: one bare label per line

use crate::core::{DualFit, DualSolverBackend, KernexError, Result, SparseVector};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Dual solvers exposed by the external `train` binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverId {
    /// `-s 1`: L2-regularized squared-hinge SVC, dual formulation
    L2LossSvcDual,
    /// `-s 7`: L2-regularized logistic regression, dual formulation
    LogisticRegressionDual,
}

impl SolverId {
    /// Value for the `-s` command-line flag
    pub fn flag(&self) -> &'static str {
        match self {
            SolverId::L2LossSvcDual => "1",
            SolverId::LogisticRegressionDual => "7",
        }
    }

    /// Name written in the model file header
    pub fn model_name(&self) -> &'static str {
        match self {
            SolverId::L2LossSvcDual => "L2R_L2LOSS_SVC_DUAL",
            SolverId::LogisticRegressionDual => "L2R_LR_DUAL",
        }
    }

    /// Whether `predict` can emit probability estimates for this solver
    pub fn supports_probability(&self) -> bool {
        matches!(self, SolverId::LogisticRegressionDual)
    }
}

/// Scratch directory for one solver invocation
///
/// Created by wiping and recreating the root, so stale files from an
/// interrupted earlier run never leak into the current fit. Removed again
/// when dropped.
pub struct SolverWorkspace {
    root: PathBuf,
}

impl SolverWorkspace {
    /// Wipe and recreate the directory at `root`
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        match fs::remove_dir_all(&root) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn train_file(&self) -> PathBuf {
        self.root.join("train_data")
    }

    pub fn model_file(&self) -> PathBuf {
        self.root.join("model")
    }

    pub fn prediction_file(&self) -> PathBuf {
        self.root.join("prediction")
    }
}

impl Drop for SolverWorkspace {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove solver workspace {}: {e}", self.root.display());
            }
        }
    }
}

/// Write rows and labels in the sparse training format
///
/// Feature indices are written 1-based; exact zeros are omitted.
pub fn write_training_file(path: &Path, rows: &[SparseVector], y: &[i8]) -> Result<()> {
    if rows.len() != y.len() {
        return Err(KernexError::Precondition(format!(
            "Label count {} does not match row count {}",
            y.len(),
            rows.len()
        )));
    }

    let mut out = BufWriter::new(fs::File::create(path)?);
    for (row, &label) in rows.iter().zip(y.iter()) {
        write!(out, "{label}")?;
        for (&i, &v) in row.indices.iter().zip(row.values.iter()) {
            if v != 0.0 {
                write!(out, " {}:{}", i + 1, v)?;
            }
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// Parsed model file contents
#[derive(Debug, Clone)]
pub struct ParsedModel {
    /// Number of feature columns the solver saw
    pub nr_feature: usize,
    /// Primal weight vector, one entry per feature
    pub weights: Vec<f64>,
    /// Signed dual coefficient per training instance (alpha block)
    pub coef: Vec<f64>,
}

/// Parse a model file produced by `train -s 1|7 -B 0`
pub fn parse_model_file(path: &Path) -> Result<ParsedModel> {
    let content = fs::read_to_string(path).map_err(|e| {
        KernexError::ExternalProcess(format!(
            "Solver produced no model file at {}: {e}",
            path.display()
        ))
    })?;
    let lines: Vec<&str> = content.lines().collect();

    let mut nr_feature: Option<usize> = None;
    let mut nr_sample: Option<usize> = None;
    let mut weights: Option<Vec<f64>> = None;
    let mut coef: Option<Vec<f64>> = None;

    let field = |line: &str, n: usize| -> Result<String> {
        line.split_whitespace()
            .nth(n)
            .map(str::to_string)
            .ok_or_else(|| KernexError::Parse(format!("Malformed model line: '{line}'")))
    };

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        if line.starts_with("solver_type") {
            let name = field(line, 1)?;
            if name != "L2R_LR_DUAL" && name != "L2R_L2LOSS_SVC_DUAL" {
                return Err(KernexError::Parse(format!(
                    "Unsupported solver type in model file: '{name}'"
                )));
            }
        } else if line.starts_with("nr_class") {
            if field(line, 1)? != "2" {
                return Err(KernexError::Parse(format!(
                    "Expected a binary model, got line: '{line}'"
                )));
            }
        } else if line.starts_with("label") {
            let first = field(line, 1)?;
            let second = field(line, 2)?;
            if first != "1" || (second != "0" && second != "-1") {
                return Err(KernexError::Parse(format!(
                    "Unexpected label ordering in model file: '{line}'"
                )));
            }
        } else if line.starts_with("nr_feature") {
            nr_feature = Some(field(line, 1)?.parse().map_err(|_| {
                KernexError::Parse(format!("Invalid feature count: '{line}'"))
            })?);
        } else if line.starts_with("nr_sample") {
            nr_sample = Some(field(line, 1)?.parse().map_err(|_| {
                KernexError::Parse(format!("Invalid sample count: '{line}'"))
            })?);
        } else if line == "w" {
            let n = nr_feature.ok_or_else(|| {
                KernexError::Parse("Model file has a w block before nr_feature".to_string())
            })?;
            let block = lines.get(i + 1..i + 1 + n).ok_or_else(|| {
                KernexError::Parse(format!(
                    "Model file w block truncated: expected {n} weights"
                ))
            })?;
            let parsed: std::result::Result<Vec<f64>, _> =
                block.iter().map(|l| l.trim().parse::<f64>()).collect();
            weights = Some(parsed.map_err(|_| {
                KernexError::Parse("Invalid weight value in model file w block".to_string())
            })?);
            i += n;
        } else if line == "alpha" {
            let values = lines.get(i + 1).ok_or_else(|| {
                KernexError::Parse("Model file alpha block truncated".to_string())
            })?;
            let parsed: std::result::Result<Vec<f64>, _> = values
                .split_whitespace()
                .map(|v| v.parse::<f64>())
                .collect();
            coef = Some(parsed.map_err(|_| {
                KernexError::Parse("Invalid coefficient in model file alpha block".to_string())
            })?);
            i += 1;
        }
        i += 1;
    }

    let nr_feature =
        nr_feature.ok_or_else(|| KernexError::Parse("Model file missing nr_feature".to_string()))?;
    let weights =
        weights.ok_or_else(|| KernexError::Parse("Model file missing w block".to_string()))?;
    let coef =
        coef.ok_or_else(|| KernexError::Parse("Model file missing alpha block".to_string()))?;
    let nr_sample =
        nr_sample.ok_or_else(|| KernexError::Parse("Model file missing nr_sample".to_string()))?;

    if coef.len() != nr_sample {
        return Err(KernexError::Parse(format!(
            "Model file alpha count {} does not match nr_sample {nr_sample}",
            coef.len()
        )));
    }

    Ok(ParsedModel {
        nr_feature,
        weights,
        coef,
    })
}

/// Parse a label-only prediction file (`predict -b 0`)
///
/// Labels of -1 are remapped to 0.
pub fn parse_label_predictions(path: &Path) -> Result<Vec<usize>> {
    let content = fs::read_to_string(path).map_err(|e| {
        KernexError::ExternalProcess(format!(
            "Solver produced no prediction file at {}: {e}",
            path.display()
        ))
    })?;

    content
        .lines()
        .map(|line| {
            let label: i64 = line.trim().parse().map_err(|_| {
                KernexError::Parse(format!("Invalid prediction line: '{line}'"))
            })?;
            match label {
                1 => Ok(1),
                0 | -1 => Ok(0),
                other => Err(KernexError::Parse(format!(
                    "Unexpected predicted label: {other}"
                ))),
            }
        })
        .collect()
}

/// Parse a probability prediction file (`predict -b 1`)
///
/// Returns labels remapped to {0, 1} and per-row probabilities as [p0, p1].
/// The header orders the columns; the first column is always the probability
/// of label 1.
pub fn parse_probability_predictions(path: &Path) -> Result<(Vec<usize>, Vec<[f64; 2]>)> {
    let content = fs::read_to_string(path).map_err(|e| {
        KernexError::ExternalProcess(format!(
            "Solver produced no prediction file at {}: {e}",
            path.display()
        ))
    })?;
    let mut lines = content.lines();

    let header = lines
        .next()
        .ok_or_else(|| KernexError::Parse("Empty prediction file".to_string()))?;
    if header != "labels 1 -1" && header != "labels 1 0" {
        return Err(KernexError::Parse(format!(
            "Unexpected prediction header: '{header}'"
        )));
    }

    let mut labels = Vec::new();
    let mut proba = Vec::new();
    for line in lines {
        let mut items = line.split_whitespace();
        let (label, p1, p0) = match (items.next(), items.next(), items.next()) {
            (Some(l), Some(a), Some(b)) => {
                let label: i64 = l.parse().map_err(|_| {
                    KernexError::Parse(format!("Invalid prediction line: '{line}'"))
                })?;
                let p1: f64 = a.parse().map_err(|_| {
                    KernexError::Parse(format!("Invalid prediction line: '{line}'"))
                })?;
                let p0: f64 = b.parse().map_err(|_| {
                    KernexError::Parse(format!("Invalid prediction line: '{line}'"))
                })?;
                (label, p1, p0)
            }
            _ => {
                return Err(KernexError::Parse(format!(
                    "Invalid prediction line: '{line}'"
                )))
            }
        };

        labels.push(match label {
            1 => 1,
            0 | -1 => 0,
            other => {
                return Err(KernexError::Parse(format!(
                    "Unexpected predicted label: {other}"
                )))
            }
        });
        proba.push([p0, p1]);
    }

    Ok((labels, proba))
}

/// Dual-solver backend shelling out to external `train`/`predict` binaries
#[derive(Debug, Clone)]
pub struct LiblinearBackend {
    train_bin: PathBuf,
    predict_bin: PathBuf,
    workspace_root: PathBuf,
    solver: SolverId,
}

impl LiblinearBackend {
    /// Backend using `train`/`predict` from PATH and a `.temp_klr` scratch dir
    pub fn new(solver: SolverId) -> Self {
        Self {
            train_bin: PathBuf::from("train"),
            predict_bin: PathBuf::from("predict"),
            workspace_root: PathBuf::from(".temp_klr"),
            solver,
        }
    }

    pub fn with_binaries(
        mut self,
        train_bin: impl Into<PathBuf>,
        predict_bin: impl Into<PathBuf>,
    ) -> Self {
        self.train_bin = train_bin.into();
        self.predict_bin = predict_bin.into();
        self
    }

    pub fn with_workspace(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    fn run(&self, bin: &Path, args: &[&str]) -> Result<()> {
        let output = Command::new(bin).args(args).output().map_err(|e| {
            KernexError::ExternalProcess(format!(
                "Failed to launch solver binary {}: {e}",
                bin.display()
            ))
        })?;

        if !output.status.success() {
            return Err(KernexError::ExternalProcess(format!(
                "{} exited with {}: {}",
                bin.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl DualSolverBackend for LiblinearBackend {
    fn fit(&self, rows: &[SparseVector], y: &[i8], c: f64) -> Result<DualFit> {
        if rows.is_empty() {
            return Err(KernexError::EmptyDataset);
        }
        for &label in y {
            if label != 1 && label != -1 {
                return Err(KernexError::InvalidLabel {
                    expected: "-1 or +1",
                    actual: label as f64,
                });
            }
        }

        let workspace = SolverWorkspace::create(&self.workspace_root)?;
        let train_file = workspace.train_file();
        let model_file = workspace.model_file();
        let prediction_file = workspace.prediction_file();

        write_training_file(&train_file, rows, y)?;

        let c_arg = c.to_string();
        log::debug!(
            "Running {} -s {} -B 0 -c {c_arg} on {} rows",
            self.train_bin.display(),
            self.solver.flag(),
            rows.len()
        );
        self.run(
            &self.train_bin,
            &[
                "-s",
                self.solver.flag(),
                "-B",
                "0",
                "-c",
                &c_arg,
                train_file.to_str().unwrap_or_default(),
                model_file.to_str().unwrap_or_default(),
            ],
        )?;

        let model = parse_model_file(&model_file)?;
        if model.coef.len() != rows.len() {
            return Err(KernexError::ExternalProcess(format!(
                "Solver returned {} dual coefficients for {} training rows",
                model.coef.len(),
                rows.len()
            )));
        }

        let b_flag = if self.solver.supports_probability() {
            "1"
        } else {
            "0"
        };
        self.run(
            &self.predict_bin,
            &[
                "-b",
                b_flag,
                train_file.to_str().unwrap_or_default(),
                model_file.to_str().unwrap_or_default(),
                prediction_file.to_str().unwrap_or_default(),
            ],
        )?;

        let (train_labels, train_proba) = if self.solver.supports_probability() {
            let (labels, proba) = parse_probability_predictions(&prediction_file)?;
            (labels, Some(proba))
        } else {
            // The SVC dual has no probability model; only labels are native
            (parse_label_predictions(&prediction_file)?, None)
        };

        if train_labels.len() != rows.len() {
            return Err(KernexError::ExternalProcess(format!(
                "Solver returned {} predictions for {} training rows",
                train_labels.len(),
                rows.len()
            )));
        }

        Ok(DualFit {
            coef: model.coef,
            train_labels,
            train_proba,
        })
    }
}
