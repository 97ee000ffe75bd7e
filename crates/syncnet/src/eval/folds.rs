//! K-fold reduction of EER/AUC over contiguous, equal-sized chunks.

use features::PairLabel;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;
use crate::eval::roc::{eer_auc, FoldMetrics};

/// Read a float written by serde_json, where NaN was stored as `null`.
pub(crate) fn nan_from_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Mean and population standard deviation over folds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanStd {
    #[serde(deserialize_with = "nan_from_null")]
    pub mean: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub std: f64,
}

impl MeanStd {
    /// NaN mean and std for an empty input.
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                mean: f64::NAN,
                std: f64::NAN,
            };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Self {
            mean,
            std: var.sqrt(),
        }
    }
}

/// Result of a K-fold evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KFoldReport {
    /// Metrics of each fold that contained both classes, in fold order.
    pub folds: Vec<FoldMetrics>,
    pub eer: MeanStd,
    pub auc: MeanStd,
    /// Samples per fold: `floor(len / k)`.
    pub fold_size: usize,
    /// Trailing samples not assigned to any fold.
    pub dropped: usize,
    /// Folds excluded because they held only one class.
    pub skipped_folds: usize,
}

/// Split `(labels, scores)` into `k` contiguous folds of `floor(len / k)`
/// samples, compute EER/AUC per fold, and reduce to mean/std.
///
/// The `len % k` trailing samples are dropped. Folds missing a class are
/// skipped with a warning; if all are skipped, mean and std are NaN.
pub fn k_fold(labels: &[PairLabel], scores: &[f32], k: usize) -> Result<KFoldReport, ConfigError> {
    if k == 0 {
        return Err(ConfigError::Invalid("number of evaluation folds must be at least 1".into()));
    }
    if labels.len() != scores.len() {
        return Err(ConfigError::Invalid(format!(
            "{} labels but {} scores",
            labels.len(),
            scores.len()
        )));
    }

    let fold_size = labels.len() / k;
    let dropped = labels.len() - fold_size * k;
    let mut folds = Vec::with_capacity(k);
    let mut skipped_folds = 0;

    for fold in 0..k {
        let range = fold * fold_size..(fold + 1) * fold_size;
        match eer_auc(&labels[range.clone()], &scores[range]) {
            Some(metrics) => folds.push(metrics),
            None => {
                skipped_folds += 1;
                tracing::warn!(fold, fold_size, "Fold has a single class, ROC undefined; skipped");
            }
        }
    }

    let eers: Vec<f64> = folds.iter().map(|f| f.eer).collect();
    let aucs: Vec<f64> = folds.iter().map(|f| f.auc).collect();

    Ok(KFoldReport {
        eer: MeanStd::of(&eers),
        auc: MeanStd::of(&aucs),
        folds,
        fold_size,
        dropped,
        skipped_folds,
    })
}
