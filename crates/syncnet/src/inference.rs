//! Scoring audio/visual pairs with a trained model.
//!
//! `PairScorer<B>` owns an inference-mode model and the normalization
//! statistics it was trained with, so callers pass raw features.
//!
//! Convention: **lower score = more likely genuine** (L2 dissimilarity).

use std::path::Path;

use burn::prelude::*;
use features::{FeatureRecord, FeatureStats};

use crate::eval::pass::{evaluate_source, EvalOutcome, EvalSettings};
use crate::model::bridge::column_to_vec;
use crate::model::pair::{PairModel, PairModelConfig};
use crate::training::checkpoint::{load_model, resolve_checkpoint};
use crate::training::data::{FeatureBatch, FeatureSource};

/// Scores feature pairs with a trained [`PairModel`].
pub struct PairScorer<B: Backend> {
    model: PairModel<B>,
    stats: FeatureStats,
    device: B::Device,
}

impl<B: Backend> PairScorer<B> {
    /// Wrap an existing model. Fails if `stats` does not fit the model config.
    pub fn new(
        model: PairModel<B>,
        config: &PairModelConfig,
        stats: FeatureStats,
        device: B::Device,
    ) -> anyhow::Result<Self> {
        stats.check_dims(config.audio_dim, config.visual_dim)?;
        Ok(Self {
            model,
            stats,
            device,
        })
    }

    /// Load from a checkpoint directory, or from a train dir whose latest
    /// checkpoint is used.
    pub fn load(
        path: &Path,
        config: &PairModelConfig,
        stats: FeatureStats,
        device: B::Device,
    ) -> anyhow::Result<Self> {
        let dir = resolve_checkpoint(path)?;
        let model = load_model::<B>(&dir, config, &device)?;
        tracing::info!(dir = %dir.display(), "Loaded pair scorer");
        Self::new(model, config, stats, device)
    }

    pub fn stats(&self) -> &FeatureStats {
        &self.stats
    }

    /// L2 dissimilarity of every pair in a raw (unnormalized) batch.
    pub fn score(&self, batch: &FeatureBatch) -> anyhow::Result<Vec<f32>> {
        if batch.is_empty() {
            return Ok(vec![]);
        }
        self.stats.check_dims(batch.audio_dim, batch.visual_dim)?;
        let mut batch = batch.clone();
        batch.normalize(&self.stats);

        let (audio, visual, _) = batch.to_tensors::<B>(&self.device)?;
        column_to_vec(self.model.forward(audio, visual).l2_distance)
    }

    /// Score a single record.
    pub fn score_record(&self, record: &FeatureRecord) -> anyhow::Result<f32> {
        let scores = self.score(&FeatureBatch::from_records(std::slice::from_ref(record)))?;
        scores
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Scorer returned no value for a single record"))
    }

    /// Run a full K-fold evaluation over `source`.
    pub fn evaluate(
        &self,
        source: &dyn FeatureSource,
        settings: &EvalSettings,
    ) -> anyhow::Result<EvalOutcome> {
        evaluate_source(&self.model, source, &self.stats, settings, &self.device)
    }
}
