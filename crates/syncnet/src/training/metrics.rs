//! Training metrics: per-step records, running averages over a logging
//! interval, and the JSON history written after every epoch.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::eval::folds::{nan_from_null, KFoldReport};

/// Metrics of one trained (non-skipped) step.
///
/// `eer`/`auc` are the in-loop proxy computed on the mined subset only; they
/// are NaN when the subset holds a single class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub step: usize,
    pub epoch: usize,
    #[serde(deserialize_with = "nan_from_null")]
    pub loss: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub eer: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub auc: f64,
    /// Pairs kept by the miner.
    pub kept: usize,
    /// Pairs in the full batch.
    pub batch: usize,
    /// Pair accuracy of the weighted distance on the mined subset.
    #[serde(deserialize_with = "nan_from_null")]
    pub accuracy: f64,
    pub lr: f64,
}

/// End-of-epoch evaluation on the held-out set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub step: usize,
    pub eval: KFoldReport,
    /// Mean contrastive loss over all evaluated samples.
    #[serde(deserialize_with = "nan_from_null")]
    pub eval_loss: f64,
}

/// Running average over a logging interval. NaN inputs are left out of
/// the averages they would poison.
#[derive(Debug, Clone, Default)]
pub struct RunningAvg {
    loss: f64,
    eer: f64,
    eer_count: usize,
    auc: f64,
    auc_count: usize,
    accuracy: f64,
    kept: usize,
    batch: usize,
    count: usize,
}

impl RunningAvg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, m: &StepMetrics) {
        self.loss += m.loss;
        if m.eer.is_finite() {
            self.eer += m.eer;
            self.eer_count += 1;
        }
        if m.auc.is_finite() {
            self.auc += m.auc;
            self.auc_count += 1;
        }
        if m.accuracy.is_finite() {
            self.accuracy += m.accuracy;
        }
        self.kept += m.kept;
        self.batch += m.batch;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn mean(sum: f64, n: usize) -> f64 {
        if n == 0 {
            f64::NAN
        } else {
            sum / n as f64
        }
    }

    pub fn loss(&self) -> f64 {
        Self::mean(self.loss, self.count)
    }

    pub fn eer(&self) -> f64 {
        Self::mean(self.eer, self.eer_count)
    }

    pub fn auc(&self) -> f64 {
        Self::mean(self.auc, self.auc_count)
    }

    /// Fraction of batch pairs the miner kept over the interval.
    pub fn kept_fraction(&self) -> f64 {
        if self.batch == 0 {
            f64::NAN
        } else {
            self.kept as f64 / self.batch as f64
        }
    }

    pub fn display(&self) -> String {
        if self.count == 0 {
            return "no data".to_string();
        }
        format!(
            "loss={:.4} eer={:.4} auc={:.4} acc={:.3} kept={:.1}%",
            self.loss(),
            self.eer(),
            self.auc(),
            Self::mean(self.accuracy, self.count),
            self.kept_fraction() * 100.0,
        )
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// All logged steps and epoch reports of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsHistory {
    pub steps: Vec<StepMetrics>,
    pub epochs: Vec<EpochReport>,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_step(&mut self, metrics: StepMetrics) {
        self.steps.push(metrics);
    }

    pub fn push_epoch(&mut self, report: EpochReport) {
        self.epochs.push(report);
    }

    /// Epoch with the lowest mean held-out EER, ignoring NaN.
    pub fn best_epoch(&self) -> Option<&EpochReport> {
        self.epochs
            .iter()
            .filter(|r| r.eval.eer.mean.is_finite())
            .min_by(|a, b| a.eval.eer.mean.total_cmp(&b.eval.eer.mean))
    }

    /// Save as pretty JSON. NaN values are written as `null`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Load a history written by [`MetricsHistory::save`].
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
        serde_json::from_reader(file)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))
    }
}
