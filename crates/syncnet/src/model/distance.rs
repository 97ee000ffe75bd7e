use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

/// Value substituted for a zero squared norm before the square root.
///
/// The result is masked back to exactly 0, so this only keeps the
/// gradient of `sqrt` finite.
pub const ZERO_NORM_EPS: f64 = 1e-12;

/// Configuration for the DistanceScorer.
#[derive(Config, Debug)]
pub struct DistanceScorerConfig {
    /// Embedding dimension shared by both streams.
    pub d_embed: usize,
}

/// Turns a pair of embeddings into an L2 distance and a learned weighted distance.
///
/// ```text
/// (batch, d_embed) × (batch, d_embed)
///   → l2       = ‖a − b‖₂                      : (batch, 1), ≥ 0
///   → weighted = sigmoid(fc_weighted(a − b))   : (batch, 1), in (0, 1)
/// ```
#[derive(Module, Debug)]
pub struct DistanceScorer<B: Backend> {
    /// Affine map from the difference vector to one logit.
    fc_weighted: Linear<B>,
}

impl DistanceScorerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DistanceScorer<B> {
        DistanceScorer {
            fc_weighted: LinearConfig::new(self.d_embed, 1).init(device),
        }
    }
}

impl<B: Backend> DistanceScorer<B> {
    /// Score a batch of embedding pairs.
    ///
    /// Returns `(l2_distance, weighted_distance)`, both of shape `(batch, 1)`.
    pub fn forward(&self, a: Tensor<B, 2>, b: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let diff = a - b;
        let weighted = sigmoid(self.fc_weighted.forward(diff.clone()));
        (l2_distance(diff), weighted)
    }

    #[cfg(test)]
    pub(crate) fn fc_weighted_weight(&self) -> Tensor<B, 2> {
        self.fc_weighted.weight.val()
    }
}

/// Row-wise Euclidean norm of `diff`, shape `(batch, 1)`.
///
/// Exactly 0 for a zero row, with a zero gradient there instead of NaN.
pub fn l2_distance<B: Backend>(diff: Tensor<B, 2>) -> Tensor<B, 2> {
    let squared = diff.powf_scalar(2.0).sum_dim(1);
    let is_zero = squared.clone().lower_equal_elem(0.0);
    squared
        .mask_fill(is_zero.clone(), ZERO_NORM_EPS)
        .sqrt()
        .mask_fill(is_zero, 0.0)
}
