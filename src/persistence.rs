//! JSON snapshots of fitted SVM explainers
//!
//! A snapshot stores everything a later process needs to reproduce the
//! fitted decomposition bit for bit: the training rows, the resolved kernel
//! hyperparameters and the compressed dual representation of every
//! estimator. The post-fit self-check ran when the model was fitted, so
//! loading only re-validates structural integrity.

use crate::core::{KernexError, Result, SparseVector};
use crate::kernel::ResolvedKernel;
use crate::surrogate::ovr::OneVsRest;
use crate::surrogate::svm::{BinarySvm, SvmParams};
use crate::surrogate::SvmExplainer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct EstimatorSnapshot {
    kernel: ResolvedKernel,
    support_indices: Vec<usize>,
    coef: Vec<f64>,
    intercept: f64,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    format_version: u32,
    library_version: String,
    created_at: DateTime<Utc>,
    params: SvmParams,
    classes: Vec<usize>,
    n_features: usize,
    rows: Vec<SparseVector>,
    estimators: Vec<EstimatorSnapshot>,
}

/// Write a fitted explainer to `path` as JSON
pub fn save(explainer: &SvmExplainer, path: &Path) -> Result<()> {
    let ovr = explainer.ovr();
    let estimators = ovr.estimators();
    if estimators.is_empty() {
        return Err(KernexError::NotFitted);
    }

    // Every estimator holds the same training rows; store them once.
    let first = &estimators[0];
    let snapshot = Snapshot {
        format_version: FORMAT_VERSION,
        library_version: env!("CARGO_PKG_VERSION").to_string(),
        created_at: Utc::now(),
        params: first.params().clone(),
        classes: ovr.classes().to_vec(),
        n_features: first.feature_count()?,
        rows: first.training_rows()?.to_vec(),
        estimators: estimators
            .iter()
            .map(|e| {
                Ok(EstimatorSnapshot {
                    kernel: e.resolved_kernel()?,
                    support_indices: e.support_indices()?.to_vec(),
                    coef: e.support_coef()?.to_vec(),
                    intercept: e.intercept()?,
                })
            })
            .collect::<Result<_>>()?,
    };

    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), &snapshot)
        .map_err(|e| KernexError::Serialization(e.to_string()))?;

    log::info!(
        "Saved explainer snapshot to {} ({} classes, {} training rows)",
        path.display(),
        snapshot.classes.len(),
        snapshot.rows.len()
    );
    Ok(())
}

/// Load a fitted explainer from a JSON snapshot
pub fn load(path: &Path) -> Result<SvmExplainer> {
    let file = File::open(path)?;
    let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| KernexError::Serialization(e.to_string()))?;

    if snapshot.format_version != FORMAT_VERSION {
        return Err(KernexError::Serialization(format!(
            "Unsupported snapshot format version {} (expected {FORMAT_VERSION})",
            snapshot.format_version
        )));
    }

    let estimators: Vec<BinarySvm> = snapshot
        .estimators
        .into_iter()
        .map(|e| {
            BinarySvm::from_parts(
                snapshot.params.clone(),
                snapshot.rows.clone(),
                snapshot.n_features,
                e.kernel,
                e.support_indices,
                e.coef,
                e.intercept,
            )
        })
        .collect::<Result<_>>()?;

    let n_train = snapshot.rows.len();
    let ovr = OneVsRest::from_parts(
        BinarySvm::new(snapshot.params),
        estimators,
        snapshot.classes,
        n_train,
    )?;
    Ok(SvmExplainer::from_ovr(ovr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Gamma, KernelConfig};
    use std::fs;
    use tempfile::tempdir;

    fn fitted_explainer() -> (SvmExplainer, Vec<SparseVector>) {
        let rows = vec![
            SparseVector::new(vec![0, 1], vec![2.0, 2.0]),
            SparseVector::new(vec![0, 1], vec![2.5, 1.5]),
            SparseVector::new(vec![0, 1], vec![1.5, 2.5]),
            SparseVector::new(vec![0, 1], vec![-2.0, -2.0]),
            SparseVector::new(vec![0, 1], vec![-2.5, -1.5]),
            SparseVector::new(vec![0, 1], vec![-1.5, -2.5]),
        ];
        let y = vec![0, 0, 0, 1, 1, 1];

        let mut explainer = SvmExplainer::new(SvmParams {
            kernel: KernelConfig::Rbf {
                gamma: Gamma::Scale,
            },
            ..SvmParams::default()
        });
        explainer.fit(&rows, &y).expect("Should fit");
        (explainer, rows)
    }

    #[test]
    fn test_round_trip_preserves_outputs() {
        let (explainer, rows) = fitted_explainer();
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");

        save(&explainer, &path).expect("Should save");
        let loaded = load(&path).expect("Should load");

        assert_eq!(loaded.classes(), explainer.classes());
        assert_eq!(
            loaded.predict(&rows).unwrap(),
            explainer.predict(&rows).unwrap()
        );
        assert_eq!(
            loaded.decision_function(&rows).unwrap(),
            explainer.decision_function(&rows).unwrap()
        );

        let x = SparseVector::new(vec![0, 1], vec![1.0, 1.2]);
        assert_eq!(
            loaded.explain(&x, None).unwrap(),
            explainer.explain(&x, None).unwrap()
        );
    }

    #[test]
    fn test_save_unfitted_fails() {
        let dir = tempdir().unwrap();
        let explainer = SvmExplainer::default();
        let err = save(&explainer, &dir.path().join("model.json")).unwrap_err();
        assert!(matches!(err, KernexError::NotFitted));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let (explainer, _) = fitted_explainer();
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        save(&explainer, &path).expect("Should save");

        let content = fs::read_to_string(&path)
            .unwrap()
            .replace("\"format_version\":1", "\"format_version\":99");
        fs::write(&path, content).unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, KernexError::Serialization(_)));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load(&path),
            Err(KernexError::Serialization(_))
        ));
    }

    #[test]
    fn test_load_rejects_out_of_range_support_index() {
        let (explainer, _) = fitted_explainer();
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        save(&explainer, &path).expect("Should save");

        let content = fs::read_to_string(&path)
            .unwrap()
            .replace("\"support_indices\":[", "\"support_indices\":[999,");
        fs::write(&path, content).unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, KernexError::Serialization(_)));
    }
}
