use burn::prelude::*;

use crate::model::distance::{DistanceScorer, DistanceScorerConfig};
use crate::model::embedder::{EmbeddingNet, EmbeddingNetConfig};

/// Names of the trainable components, used for scope matching in
/// `trainable_scopes` and `checkpoint_exclude_scopes`.
pub const COMPONENTS: [&str; 3] = ["audio_net", "visual_net", "scorer"];

/// Configuration for the full two-stream model.
///
/// Both streams share hidden sizes and embedding dimension so their
/// embeddings live in the same space.
#[derive(Config, Debug)]
pub struct PairModelConfig {
    /// Flattened audio feature length.
    pub audio_dim: usize,
    /// Flattened visual feature length.
    pub visual_dim: usize,
    #[config(default = 256)]
    pub d_hidden1: usize,
    #[config(default = 128)]
    pub d_hidden2: usize,
    #[config(default = 64)]
    pub d_embed: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    #[config(default = false)]
    pub normalize_embeddings: bool,
}

/// Audio stream, visual stream and the distance scorer over their embeddings.
#[derive(Module, Debug)]
pub struct PairModel<B: Backend> {
    pub audio_net: EmbeddingNet<B>,
    pub visual_net: EmbeddingNet<B>,
    pub scorer: DistanceScorer<B>,
}

/// Result of scoring a batch of pairs.
#[derive(Debug, Clone)]
pub struct PairOutput<B: Backend> {
    /// `(batch, 1)` Euclidean distance between the two embeddings.
    pub l2_distance: Tensor<B, 2>,
    /// `(batch, 1)` learned dissimilarity in (0, 1).
    pub weighted_distance: Tensor<B, 2>,
    pub audio_end_points: Vec<(&'static str, Tensor<B, 2>)>,
    pub visual_end_points: Vec<(&'static str, Tensor<B, 2>)>,
}

impl PairModelConfig {
    fn stream(&self, d_input: usize) -> EmbeddingNetConfig {
        EmbeddingNetConfig::new(d_input)
            .with_d_hidden1(self.d_hidden1)
            .with_d_hidden2(self.d_hidden2)
            .with_d_embed(self.d_embed)
            .with_dropout(self.dropout)
            .with_normalize(self.normalize_embeddings)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> PairModel<B> {
        PairModel {
            audio_net: self.stream(self.audio_dim).init(device),
            visual_net: self.stream(self.visual_dim).init(device),
            scorer: DistanceScorerConfig::new(self.d_embed).init(device),
        }
    }
}

impl<B: Backend> PairModel<B> {
    /// Embed both modalities and score each pair.
    ///
    /// Input shapes: `(batch, audio_dim)` and `(batch, visual_dim)`.
    pub fn forward(&self, audio: Tensor<B, 2>, visual: Tensor<B, 2>) -> PairOutput<B> {
        let audio = self.audio_net.forward(audio);
        let visual = self.visual_net.forward(visual);
        let (l2_distance, weighted_distance) =
            self.scorer.forward(audio.embedding, visual.embedding);

        PairOutput {
            l2_distance,
            weighted_distance,
            audio_end_points: audio.end_points,
            visual_end_points: visual.end_points,
        }
    }
}
