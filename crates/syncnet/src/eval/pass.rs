//! Full evaluation pass over a held-out source.

use burn::prelude::*;
use features::{FeatureStats, PairLabel};
use indicatif::{ProgressBar, ProgressStyle};

use crate::eval::folds::{k_fold, KFoldReport};
use crate::model::bridge::{column_to_vec, tensor_to_f64};
use crate::model::pair::PairModel;
use crate::training::data::{num_batches, FeatureBatch, FeatureSource};
use crate::training::loss::contrastive_loss;

/// Settings for one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalSettings {
    pub batch_size: usize,
    /// Number of contiguous folds.
    pub folds: usize,
    pub loss_margin: f64,
    pub genuine_margin: f64,
}

/// Result of [`evaluate_source`].
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutcome {
    pub report: KFoldReport,
    /// Mean contrastive loss over every scored sample.
    pub loss: f64,
    /// Samples scored (full batches only).
    pub samples: usize,
}

/// L2 distances and mean contrastive loss of one normalized batch.
pub fn score_batch<B: Backend>(
    model: &PairModel<B>,
    batch: &FeatureBatch,
    margins: (f64, f64),
    device: &B::Device,
) -> anyhow::Result<(Vec<f32>, f64)> {
    let (audio, visual, labels) = batch.to_tensors::<B>(device)?;
    let out = model.forward(audio, visual);
    let loss = contrastive_loss(labels, out.l2_distance.clone(), margins.0, margins.1);
    Ok((column_to_vec(out.l2_distance)?, tensor_to_f64(loss)))
}

/// Score every full batch of `source` in order and reduce to K-fold EER/AUC.
///
/// `model` should be an inference-mode module (e.g. from
/// `AutodiffModule::valid()`). The score and label buffers live only for
/// the duration of this call.
pub fn evaluate_source<B: Backend>(
    model: &PairModel<B>,
    source: &dyn FeatureSource,
    stats: &FeatureStats,
    settings: &EvalSettings,
    device: &B::Device,
) -> anyhow::Result<EvalOutcome> {
    stats.check_dims(source.audio_dim(), source.visual_dim())?;
    let batches = num_batches(source.len(), settings.batch_size);
    if batches == 0 {
        anyhow::bail!(
            "Evaluation set has {} samples, fewer than one batch of {}; nothing would be scored",
            source.len(),
            settings.batch_size
        );
    }
    let mut labels: Vec<PairLabel> = Vec::with_capacity(batches * settings.batch_size);
    let mut scores: Vec<f32> = Vec::with_capacity(batches * settings.batch_size);
    let mut loss_sum = 0.0;

    let pb = ProgressBar::new(batches as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) Evaluating")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    for b in 0..batches {
        let start = b * settings.batch_size;
        let mut batch = source.read(start..start + settings.batch_size);
        batch.normalize(stats);

        let (distances, loss) =
            score_batch(model, &batch, (settings.loss_margin, settings.genuine_margin), device)?;
        loss_sum += loss * batch.len() as f64;
        labels.extend_from_slice(&batch.labels);
        scores.extend(distances);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let samples = labels.len();
    let report = k_fold(&labels, &scores, settings.folds)?;
    let loss = loss_sum / samples as f64;

    tracing::info!(
        samples,
        folds = settings.folds,
        fold_size = report.fold_size,
        eer = format!("{:.4} ± {:.4}", report.eer.mean, report.eer.std),
        auc = format!("{:.4} ± {:.4}", report.auc.mean, report.auc.std),
        loss = format!("{loss:.4}"),
        "Evaluation pass"
    );

    Ok(EvalOutcome {
        report,
        loss,
        samples,
    })
}
