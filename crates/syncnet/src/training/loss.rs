//! Margin contrastive loss on L2 distances, the auxiliary loss for the
//! weighted distance head, and the pair accuracy metric.
//!
//! Label convention: 1.0 genuine (should be close), 0.0 impostor (should be
//! at least `margin_imp` apart). Every reduction is a mean over the samples
//! supplied.

use burn::prelude::*;
use features::PairLabel;

/// Clamp applied to probabilities before taking logs.
const PROB_EPS: f64 = 1e-7;

/// Margin contrastive loss.
///
/// Per sample:
/// ```text
/// y · max(0, d − margin_gen)² + (1 − y) · max(0, margin_imp − d)²
/// ```
///
/// # Arguments
/// - `labels`: shape `(batch, 1)`, 1.0 genuine / 0.0 impostor
/// - `l2_distance`: shape `(batch, 1)`, non-negative
/// - `margin_imp`: impostors closer than this are penalized
/// - `margin_gen`: genuines farther than this are penalized (0 penalizes any distance)
///
/// # Returns
/// Scalar loss tensor of shape `(1,)`, always ≥ 0.
pub fn contrastive_loss<B: Backend>(
    labels: Tensor<B, 2>,
    l2_distance: Tensor<B, 2>,
    margin_imp: f64,
    margin_gen: f64,
) -> Tensor<B, 1> {
    let genuine_term = (l2_distance.clone() - margin_gen).clamp_min(0.0).powf_scalar(2.0);
    let impostor_term = (l2_distance.neg() + margin_imp).clamp_min(0.0).powf_scalar(2.0);

    let impostor_weight = labels.clone().neg() + 1.0;
    let per_sample = labels * genuine_term + impostor_weight * impostor_term;
    per_sample.mean()
}

/// Binary cross-entropy pushing `weighted_distance` towards 1 for impostors
/// and 0 for genuines.
///
/// # Arguments
/// - `labels`: shape `(batch, 1)`, 1.0 genuine / 0.0 impostor
/// - `weighted_distance`: shape `(batch, 1)`, in (0, 1)
pub fn weighted_distance_loss<B: Backend>(
    labels: Tensor<B, 2>,
    weighted_distance: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let target = labels.neg() + 1.0;
    let p = weighted_distance.clamp(PROB_EPS, 1.0 - PROB_EPS);
    let log_p = p.clone().log();
    let log_not_p = (p.neg() + 1.0).log();
    let per_sample = target.clone() * log_p + (target.neg() + 1.0) * log_not_p;
    per_sample.mean().neg()
}

/// Fraction of pairs whose weighted distance lands on the correct side of 0.5.
///
/// A pair counts as predicted impostor when `weighted ≥ 0.5`. Returns NaN
/// for an empty slice.
pub fn pair_accuracy(labels: &[PairLabel], weighted: &[f32]) -> f64 {
    if labels.is_empty() {
        return f64::NAN;
    }
    let correct = labels
        .iter()
        .zip(weighted)
        .filter(|(label, &w)| (w >= 0.5) != label.is_genuine())
        .count();
    correct as f64 / labels.len() as f64
}
