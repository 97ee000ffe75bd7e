//! Result types written by the `evaluate` subcommand.

use std::path::Path;

use serde::{Deserialize, Serialize};
use syncnet::{EvalOutcome, FoldMetrics, MeanStd};

/// K-fold verification results for one checkpoint on one feature set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Checkpoint directory that was evaluated.
    pub checkpoint: String,
    /// Feature files, in evaluation order.
    pub features: Vec<String>,
    /// Samples scored (full batches only).
    pub samples: usize,
    pub folds: usize,
    pub fold_size: usize,
    /// Trailing samples not assigned to any fold.
    pub dropped: usize,
    /// Folds left out of mean/std because they held a single class.
    pub skipped_folds: usize,
    pub eer: MeanStd,
    pub auc: MeanStd,
    /// Mean contrastive loss over the scored samples. `None` when nothing was scored.
    pub eval_loss: Option<f64>,
    pub per_fold: Vec<FoldMetrics>,
}

impl EvaluationResult {
    pub fn from_outcome(checkpoint: &Path, features: &[impl AsRef<Path>], folds: usize, outcome: EvalOutcome) -> Self {
        Self {
            checkpoint: checkpoint.display().to_string(),
            features: features.iter().map(|p| p.as_ref().display().to_string()).collect(),
            samples: outcome.samples,
            folds,
            fold_size: outcome.report.fold_size,
            dropped: outcome.report.dropped,
            skipped_folds: outcome.report.skipped_folds,
            eer: outcome.report.eer,
            auc: outcome.report.auc,
            eval_loss: outcome.loss.is_finite().then_some(outcome.loss),
            per_fold: outcome.report.folds,
        }
    }

    /// Human-readable summary lines.
    pub fn summary_lines(&self) -> Vec<String> {
        vec![
            format!("Checkpoint: {}", self.checkpoint),
            format!(
                "Samples: {} ({} folds of {}, {} dropped)",
                self.samples, self.folds, self.fold_size, self.dropped
            ),
            format!("EER: {:.4} ± {:.4}", self.eer.mean, self.eer.std),
            format!("AUC: {:.4} ± {:.4}", self.auc.mean, self.auc.std),
            match self.eval_loss {
                Some(loss) => format!("Loss: {loss:.4}"),
                None => "Loss: n/a".to_string(),
            },
        ]
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
        serde_json::from_reader(file)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))
    }
}
