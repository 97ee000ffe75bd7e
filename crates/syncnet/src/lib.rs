//! Two-stream audio/visual pair verification.
//!
//! An audio embedding net and a visual embedding net map each modality
//! into a shared space; the L2 distance between the two embeddings scores
//! a pair (lower = genuine). Training uses a margin contrastive loss on
//! hard pairs mined online from every batch, and each epoch is evaluated
//! by K-fold EER/AUC on a held-out set.

pub mod error;
pub mod eval;
pub mod inference;
pub mod model;
pub mod training;

pub use error::ConfigError;
pub use eval::folds::{k_fold, KFoldReport, MeanStd};
pub use eval::pass::{evaluate_source, EvalOutcome, EvalSettings};
pub use eval::roc::{eer_auc, roc_curve, FoldMetrics, RocCurve};
pub use inference::PairScorer;
pub use model::pair::{PairModel, PairModelConfig};
pub use training::data::{FeatureBatch, FeatureSource, InMemorySource};
pub use training::metrics::MetricsHistory;
pub use training::mining::{EmptyClassPolicy, HardPairMiner, MinedSubset};
pub use training::optim::OptimizerConfig;
pub use training::schedule::ScheduleConfig;
pub use training::trainer::{train, TrainingConfig};
