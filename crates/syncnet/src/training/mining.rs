//! Online hard-pair mining.
//!
//! Each step the full batch is scored without gradients, then only the
//! pairs near the genuine/impostor boundary are kept for the update:
//!
//! ```text
//! keep impostor i  iff  d[i] < max_gen + hard_margin
//! keep genuine  i  iff  d[i] > min_imp − hard_margin
//! ```

use std::fmt;
use std::str::FromStr;

use features::PairLabel;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Initial running maximum of genuine distances before any genuine is seen.
pub const SENTINEL_MAX_GEN: f32 = 0.0;
/// Initial running minimum of impostor distances before any impostor is seen.
pub const SENTINEL_MIN_IMP: f32 = 100.0;

/// What one side of the selection rule does when its reference class is
/// absent from the batch (no genuines for the impostor rule, no impostors
/// for the genuine rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyClassPolicy {
    /// Keep nothing from that side.
    #[default]
    KeepNone,
    /// Keep every sample from that side.
    KeepAll,
    /// Compare against the fixed initial values (`max_gen = 0`, `min_imp = 100`).
    Sentinel,
}

impl FromStr for EmptyClassPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep_none" => Ok(Self::KeepNone),
            "keep_all" => Ok(Self::KeepAll),
            "sentinel" => Ok(Self::Sentinel),
            _ => Err(ConfigError::UnknownEmptyClassPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for EmptyClassPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepNone => write!(f, "keep_none"),
            Self::KeepAll => write!(f, "keep_all"),
            Self::Sentinel => write!(f, "sentinel"),
        }
    }
}

/// Distance statistics of one mining pass. `None` marks an empty class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiningStats {
    pub max_gen: Option<f32>,
    pub min_gen: Option<f32>,
    pub min_imp: Option<f32>,
    pub max_imp: Option<f32>,
    pub kept_genuine: usize,
    pub kept_impostor: usize,
}

/// Indices kept for this step, in original batch order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MinedSubset {
    pub indices: Vec<usize>,
    pub stats: MiningStats,
}

impl MinedSubset {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Selects boundary-confusing pairs from a scored batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardPairMiner {
    pub hard_margin: f32,
    pub empty_class_policy: EmptyClassPolicy,
}

impl Default for HardPairMiner {
    fn default() -> Self {
        Self {
            hard_margin: 5.0,
            empty_class_policy: EmptyClassPolicy::KeepNone,
        }
    }
}

/// Per-side decision derived from the reference statistic and the policy.
enum Rule {
    Threshold(f32),
    All,
    None,
}

fn min_max(values: impl Iterator<Item = f32>) -> (Option<f32>, Option<f32>) {
    values.fold((None, None), |(lo, hi), v| {
        (
            Some(lo.map_or(v, |m: f32| m.min(v))),
            Some(hi.map_or(v, |m: f32| m.max(v))),
        )
    })
}

impl HardPairMiner {
    pub fn new(hard_margin: f32, empty_class_policy: EmptyClassPolicy) -> Self {
        Self {
            hard_margin,
            empty_class_policy,
        }
    }

    fn rule(&self, reference: Option<f32>, sentinel: f32) -> Rule {
        match (reference, self.empty_class_policy) {
            (Some(r), _) => Rule::Threshold(r),
            (None, EmptyClassPolicy::KeepNone) => Rule::None,
            (None, EmptyClassPolicy::KeepAll) => Rule::All,
            (None, EmptyClassPolicy::Sentinel) => Rule::Threshold(sentinel),
        }
    }

    /// Mine a batch given per-sample L2 distances and labels.
    ///
    /// The result may be empty; callers must then skip the update.
    pub fn mine(&self, distances: &[f32], labels: &[PairLabel]) -> MinedSubset {
        debug_assert_eq!(distances.len(), labels.len());
        let pairs = || distances.iter().copied().zip(labels.iter().copied());

        let (min_gen, max_gen) = min_max(pairs().filter(|(_, l)| l.is_genuine()).map(|(d, _)| d));
        let (min_imp, max_imp) = min_max(pairs().filter(|(_, l)| !l.is_genuine()).map(|(d, _)| d));

        let impostor_rule = self.rule(max_gen, SENTINEL_MAX_GEN);
        let genuine_rule = self.rule(min_imp, SENTINEL_MIN_IMP);

        let mut stats = MiningStats {
            max_gen,
            min_gen,
            min_imp,
            max_imp,
            ..Default::default()
        };
        let mut indices = Vec::new();

        for (i, (d, label)) in pairs().enumerate() {
            let keep = match (label, &impostor_rule, &genuine_rule) {
                (PairLabel::Impostor, Rule::Threshold(max_gen), _) => d < max_gen + self.hard_margin,
                (PairLabel::Impostor, Rule::All, _) => true,
                (PairLabel::Impostor, Rule::None, _) => false,
                (PairLabel::Genuine, _, Rule::Threshold(min_imp)) => d > min_imp - self.hard_margin,
                (PairLabel::Genuine, _, Rule::All) => true,
                (PairLabel::Genuine, _, Rule::None) => false,
            };
            if keep {
                indices.push(i);
                match label {
                    PairLabel::Genuine => stats.kept_genuine += 1,
                    PairLabel::Impostor => stats.kept_impostor += 1,
                }
            }
        }

        MinedSubset { indices, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn batch(genuine: &[f32], impostor: &[f32]) -> (Vec<f32>, Vec<PairLabel>) {
        let mut distances = Vec::new();
        let mut labels = Vec::new();
        // Interleave so order preservation is exercised
        let n = genuine.len().max(impostor.len());
        for i in 0..n {
            if let Some(&d) = genuine.get(i) {
                distances.push(d);
                labels.push(PairLabel::Genuine);
            }
            if let Some(&d) = impostor.get(i) {
                distances.push(d);
                labels.push(PairLabel::Impostor);
            }
        }
        (distances, labels)
    }

    #[test]
    fn test_well_separated_keeps_nothing() {
        let (d, l) = batch(&[0.1; 8], &[10.0; 8]);
        let mined = HardPairMiner::default().mine(&d, &l);
        assert!(mined.is_empty(), "kept {:?}", mined.indices);
        assert_eq!(mined.stats.max_gen, Some(0.1));
        assert_eq!(mined.stats.min_imp, Some(10.0));
    }

    #[test]
    fn test_within_band_keeps_everything() {
        let (d, l) = batch(&[9.0; 8], &[10.0; 8]);
        let mined = HardPairMiner::default().mine(&d, &l);
        assert_eq!(mined.indices, (0..16).collect::<Vec<_>>());
        assert_eq!(mined.stats.kept_genuine, 8);
        assert_eq!(mined.stats.kept_impostor, 8);
    }

    #[test]
    fn test_partial_selection_preserves_order() {
        // max_gen = 4, min_imp = 3, hm = 1
        // impostors kept iff d < 5; genuines kept iff d > 2
        let d = vec![1.0, 6.0, 4.0, 3.0, 2.5, 5.0];
        let l = vec![
            PairLabel::Genuine,
            PairLabel::Impostor,
            PairLabel::Genuine,
            PairLabel::Impostor,
            PairLabel::Genuine,
            PairLabel::Impostor,
        ];
        let mined = HardPairMiner::new(1.0, EmptyClassPolicy::KeepNone).mine(&d, &l);
        assert_eq!(mined.indices, vec![2, 3, 4]);
    }

    #[test]
    fn test_all_genuine_does_not_crash() {
        let d = vec![0.5, 1.0, 2.0];
        let l = vec![PairLabel::Genuine; 3];

        let none = HardPairMiner::new(5.0, EmptyClassPolicy::KeepNone).mine(&d, &l);
        assert!(none.is_empty());
        assert_eq!(none.stats.min_imp, None);

        let all = HardPairMiner::new(5.0, EmptyClassPolicy::KeepAll).mine(&d, &l);
        assert_eq!(all.indices, vec![0, 1, 2]);

        // Sentinel min_imp = 100 → keep iff d > 95
        let sentinel = HardPairMiner::new(5.0, EmptyClassPolicy::Sentinel).mine(&d, &l);
        assert!(sentinel.is_empty());
    }

    #[test]
    fn test_all_impostor_sentinel() {
        // Sentinel max_gen = 0 → keep impostor iff d < 5
        let d = vec![3.0, 7.0, 4.9];
        let l = vec![PairLabel::Impostor; 3];
        let mined = HardPairMiner::new(5.0, EmptyClassPolicy::Sentinel).mine(&d, &l);
        assert_eq!(mined.indices, vec![0, 2]);
        assert_eq!(mined.stats.max_gen, None);
    }

    #[test]
    fn test_empty_batch() {
        let mined = HardPairMiner::default().mine(&[], &[]);
        assert!(mined.is_empty());
        assert_eq!(mined.stats, MiningStats::default());
    }

    #[test]
    fn test_indices_valid_and_unique() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for policy in [
            EmptyClassPolicy::KeepNone,
            EmptyClassPolicy::KeepAll,
            EmptyClassPolicy::Sentinel,
        ] {
            for _ in 0..50 {
                let n = rng.gen_range(0..40);
                let d: Vec<f32> = (0..n).map(|_| rng.gen_range(0.0..20.0)).collect();
                let l: Vec<PairLabel> = (0..n)
                    .map(|_| if rng.gen_bool(0.5) { PairLabel::Genuine } else { PairLabel::Impostor })
                    .collect();

                let mined = HardPairMiner::new(rng.gen_range(0.0..6.0), policy).mine(&d, &l);
                assert!(mined.len() <= n);
                assert!(mined.indices.windows(2).all(|w| w[0] < w[1]), "not strictly increasing");
                assert!(mined.indices.iter().all(|&i| i < n));
                assert_eq!(mined.stats.kept_genuine + mined.stats.kept_impostor, mined.len());
            }
        }
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("keep_none".parse::<EmptyClassPolicy>().unwrap(), EmptyClassPolicy::KeepNone);
        assert_eq!("KEEP_ALL".parse::<EmptyClassPolicy>().unwrap(), EmptyClassPolicy::KeepAll);
        assert_eq!("sentinel".parse::<EmptyClassPolicy>().unwrap(), EmptyClassPolicy::Sentinel);
        assert!(matches!(
            "skip".parse::<EmptyClassPolicy>(),
            Err(ConfigError::UnknownEmptyClassPolicy(_))
        ));
        assert_eq!(EmptyClassPolicy::KeepAll.to_string(), "keep_all");
    }
}
