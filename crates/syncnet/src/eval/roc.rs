//! ROC curve, Equal Error Rate and Area Under Curve from dissimilarity scores.
//!
//! Scores are dissimilarities: a pair is accepted as genuine when its score
//! is at or below the threshold. Genuine is the positive class.

use features::PairLabel;
use serde::{Deserialize, Serialize};

/// ROC points in order of increasing threshold, starting at (0, 0).
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    /// Acceptance threshold for each point; `-inf` for the leading (0, 0).
    pub thresholds: Vec<f32>,
}

/// EER and AUC for one set of scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub eer: f64,
    pub auc: f64,
}

/// Build the ROC curve by sweeping every distinct score as a threshold.
///
/// Returns `None` when either class is absent (the rates are undefined).
pub fn roc_curve(labels: &[PairLabel], scores: &[f32]) -> Option<RocCurve> {
    debug_assert_eq!(labels.len(), scores.len());
    let positives = labels.iter().filter(|l| l.is_genuine()).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut curve = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f32::NEG_INFINITY],
    };
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        // Tied scores move together: one point per distinct threshold
        while i < order.len() && scores[order[i]].total_cmp(&threshold).is_eq() {
            if labels[order[i]].is_genuine() {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        curve.fpr.push(fp as f64 / negatives as f64);
        curve.tpr.push(tp as f64 / positives as f64);
        curve.thresholds.push(threshold);
    }
    Some(curve)
}

impl RocCurve {
    /// Trapezoidal area under the curve.
    pub fn auc(&self) -> f64 {
        self.fpr
            .windows(2)
            .zip(self.tpr.windows(2))
            .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
            .sum()
    }

    /// Error rate where the false negative rate meets the false positive rate.
    ///
    /// Linearly interpolates between the last point with `FNR > FPR` and
    /// the first with `FNR ≤ FPR`.
    pub fn eer(&self) -> f64 {
        let gap = |k: usize| (1.0 - self.tpr[k]) - self.fpr[k];
        for k in 1..self.fpr.len() {
            let g = gap(k);
            if g <= 0.0 {
                let g_prev = gap(k - 1);
                let t = if g_prev - g > 0.0 { g_prev / (g_prev - g) } else { 1.0 };
                return self.fpr[k - 1] + t * (self.fpr[k] - self.fpr[k - 1]);
            }
        }
        // The final point is always (1, 1), so the crossing exists
        1.0
    }
}

/// EER and AUC for one set of labelled scores, `None` if a class is missing.
pub fn eer_auc(labels: &[PairLabel], scores: &[f32]) -> Option<FoldMetrics> {
    roc_curve(labels, scores).map(|roc| FoldMetrics {
        eer: roc.eer(),
        auc: roc.auc(),
    })
}
