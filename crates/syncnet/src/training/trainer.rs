//! Training loop: score the full batch, mine hard pairs, update on the
//! mined subset, checkpoint and evaluate every epoch.

use std::path::Path;
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::{GradientsAccumulator, GradientsParams};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use features::FeatureStats;
use rand::SeedableRng;

use crate::error::ConfigError;
use crate::eval::pass::{evaluate_source, EvalSettings};
use crate::eval::roc::eer_auc;
use crate::model::bridge::{column_to_vec, tensor_to_f64};
use crate::model::embedder::activation_sparsity;
use crate::model::pair::{PairModel, COMPONENTS};
use crate::training::checkpoint::{
    latest_checkpoint, load_components, prune_checkpoints, read_meta, resolve_checkpoint,
    save_checkpoint, scope_matches, CheckpointMeta, OPTIMIZER_FILE,
};
use crate::training::data::{batch_order, num_batches, FeatureBatch, FeatureSource};
use crate::training::loss::{contrastive_loss, pair_accuracy, weighted_distance_loss};
use crate::training::metrics::{EpochReport, MetricsHistory, RunningAvg, StepMetrics};
use crate::training::mining::{EmptyClassPolicy, HardPairMiner};
use crate::training::optim::{OptimizerConfig, PairOptimizer};
use crate::training::schedule::{LrSchedule, ScheduleConfig, ScheduleKind};

/// File in the train dir holding the [`MetricsHistory`] JSON.
pub const HISTORY_FILE: &str = "history.json";

/// Configuration for a training run.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Pairs per step before mining.
    #[config(default = 256)]
    pub batch_size: usize,
    #[config(default = 20)]
    pub num_epochs: usize,
    /// Impostors closer than this are penalized.
    #[config(default = 70.0)]
    pub loss_margin: f64,
    /// Genuines farther than this are penalized.
    #[config(default = 0.0)]
    pub genuine_margin: f64,
    /// Weight of the weighted-distance BCE term. 0 trains the L2 path only.
    #[config(default = 0.0)]
    pub weighted_loss_weight: f64,
    #[config(default = 5.0)]
    pub hard_margin: f64,
    /// "keep_none", "keep_all" or "sentinel".
    #[config(default = "String::from(\"keep_none\")")]
    pub empty_class_policy: String,
    /// Steps between metric logging. 0 disables step logging.
    #[config(default = 10)]
    pub log_every_n_steps: usize,
    /// Folds for the end-of-epoch evaluation.
    #[config(default = 10)]
    pub eval_folds: usize,
    /// Shards the mined subset is split into; gradients are summed before one update.
    #[config(default = 1)]
    pub num_clones: usize,
    /// Permute the order of batches each epoch.
    #[config(default = false)]
    pub shuffle: bool,
    #[config(default = 0)]
    pub seed: u64,
    #[config(default = "String::from(\"checkpoints/syncnet\")")]
    pub train_dir: String,
    /// Warm-start checkpoint. Ignored when `train_dir` already holds one.
    pub checkpoint_path: Option<String>,
    /// Components (by name prefix) not restored on warm start.
    #[config(default = "Vec::new()")]
    pub checkpoint_exclude_scopes: Vec<String>,
    /// Components (by name prefix) to train. Empty trains everything.
    #[config(default = "Vec::new()")]
    pub trainable_scopes: Vec<String>,
    #[config(default = false)]
    pub ignore_missing_vars: bool,
    /// Epoch checkpoints to keep. Defaults to `num_epochs`.
    pub max_to_keep: Option<usize>,
    #[config(default = "OptimizerConfig::new()")]
    pub optimizer: OptimizerConfig,
    #[config(default = "ScheduleConfig::new()")]
    pub schedule: ScheduleConfig,
}

impl TrainingConfig {
    /// Check every value that can be checked without data. Selector strings
    /// are parsed so an unknown name fails here, before any work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".into());
        }
        if self.num_epochs == 0 {
            return invalid("num_epochs must be at least 1".into());
        }
        if self.eval_folds == 0 {
            return invalid("eval_folds must be at least 1".into());
        }
        if self.num_clones == 0 {
            return invalid("num_clones must be at least 1".into());
        }
        for (name, value) in [
            ("loss_margin", self.loss_margin),
            ("genuine_margin", self.genuine_margin),
            ("weighted_loss_weight", self.weighted_loss_weight),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return invalid(format!("{name} must be finite and non-negative, got {value}"));
            }
        }
        if !self.hard_margin.is_finite() {
            return invalid(format!("hard_margin must be finite, got {}", self.hard_margin));
        }
        if let Some(scope) = self
            .trainable_scopes
            .iter()
            .find(|scope| !COMPONENTS.iter().any(|c| c.starts_with(scope.as_str())))
        {
            return invalid(format!(
                "trainable scope '{scope}' matches no component (expected a prefix of {COMPONENTS:?})"
            ));
        }
        let embeddings_frozen = !self.trainable_scopes.is_empty()
            && !scope_matches("audio_net", &self.trainable_scopes)
            && !scope_matches("visual_net", &self.trainable_scopes);
        if embeddings_frozen && self.weighted_loss_weight == 0.0 {
            return invalid(
                "only the scorer is trainable but weighted_loss_weight is 0, nothing would receive gradient".into(),
            );
        }

        self.policy()?;
        self.optimizer.kind()?;
        self.schedule.schedule.parse::<ScheduleKind>()?;
        Ok(())
    }

    pub fn policy(&self) -> Result<EmptyClassPolicy, ConfigError> {
        self.empty_class_policy.parse()
    }

    pub fn miner(&self) -> Result<HardPairMiner, ConfigError> {
        Ok(HardPairMiner::new(self.hard_margin as f32, self.policy()?))
    }

    pub fn eval_settings(&self) -> EvalSettings {
        EvalSettings {
            batch_size: self.batch_size,
            folds: self.eval_folds,
            loss_margin: self.loss_margin,
            genuine_margin: self.genuine_margin,
        }
    }
}

/// What a trained step reports. Skipped steps report nothing.
#[derive(Debug, Clone)]
pub(crate) struct StepSummary {
    pub loss: f64,
    pub eer: f64,
    pub auc: f64,
    pub kept: usize,
    pub accuracy: f64,
    pub sparsity: Vec<(&'static str, f64)>,
}

/// Freeze every component outside `trainable_scopes`. Empty scopes train all.
pub fn freeze_outside_scopes<B: AutodiffBackend>(
    model: PairModel<B>,
    trainable_scopes: &[String],
) -> PairModel<B> {
    if trainable_scopes.is_empty() {
        return model;
    }
    let frozen = |name: &str| {
        let freeze = !scope_matches(name, trainable_scopes);
        if freeze {
            tracing::info!(component = name, "Frozen (outside trainable scopes)");
        }
        freeze
    };

    let PairModel {
        mut audio_net,
        mut visual_net,
        mut scorer,
    } = model;
    if frozen("audio_net") {
        audio_net = audio_net.no_grad();
    }
    if frozen("visual_net") {
        visual_net = visual_net.no_grad();
    }
    if frozen("scorer") {
        scorer = scorer.no_grad();
    }
    PairModel {
        audio_net,
        visual_net,
        scorer,
    }
}

/// One ForwardScore → Mine → Backward+Update step on a normalized batch.
///
/// Returns the model unchanged and `None` when the miner keeps nothing.
pub(crate) fn train_step<B: AutodiffBackend>(
    model: PairModel<B>,
    optimizer: &mut dyn PairOptimizer<PairModel<B>, B>,
    batch: &FeatureBatch,
    miner: &HardPairMiner,
    config: &TrainingConfig,
    lr: f64,
    diagnostics: bool,
    device: &B::Device,
) -> anyhow::Result<(PairModel<B>, Option<StepSummary>)> {
    // Score-only pass: inner backend, dropout off, no graph
    let (distances, weighted, sparsity) = {
        let scoring = model.valid();
        let (audio, visual, _) = batch.to_tensors::<B::InnerBackend>(device)?;
        let out = scoring.forward(audio, visual);
        let sparsity = if diagnostics {
            let mut s = activation_sparsity(&out.audio_end_points);
            s.extend(activation_sparsity(&out.visual_end_points));
            s
        } else {
            Vec::new()
        };
        (
            column_to_vec(out.l2_distance)?,
            column_to_vec(out.weighted_distance)?,
            sparsity,
        )
    };

    let mined = miner.mine(&distances, &batch.labels);
    if mined.is_empty() {
        tracing::debug!(
            max_gen = ?mined.stats.max_gen,
            min_imp = ?mined.stats.min_imp,
            "Mined subset empty"
        );
        return Ok((model, None));
    }

    let kept = mined.len();
    let subset = batch.select(&mined.indices);
    let shard_len = kept.div_ceil(config.num_clones);
    let all: Vec<usize> = (0..kept).collect();

    let mut accumulator = GradientsAccumulator::<PairModel<B>>::new();
    let mut loss_value = 0.0;
    for shard in all.chunks(shard_len) {
        let shard_batch = subset.select(shard);
        let (audio, visual, labels) = shard_batch.to_tensors::<B>(device)?;
        let out = model.forward(audio, visual);

        let scale = shard.len() as f64 / kept as f64;
        let mut loss = contrastive_loss(
            labels.clone(),
            out.l2_distance,
            config.loss_margin,
            config.genuine_margin,
        );
        if config.weighted_loss_weight > 0.0 {
            loss = loss + weighted_distance_loss(labels, out.weighted_distance) * config.weighted_loss_weight;
        }
        let loss = loss * scale;
        loss_value += tensor_to_f64(loss.clone());

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        accumulator.accumulate(&model, grads);
    }
    let model = optimizer.step(lr, model, accumulator.grads());

    // In-loop proxy on pre-update scores of the mined subset
    let kept_distances: Vec<f32> = mined.indices.iter().map(|&i| distances[i]).collect();
    let kept_weighted: Vec<f32> = mined.indices.iter().map(|&i| weighted[i]).collect();
    let (eer, auc) = eer_auc(&subset.labels, &kept_distances)
        .map(|m| (m.eer, m.auc))
        .unwrap_or((f64::NAN, f64::NAN));

    Ok((
        model,
        Some(StepSummary {
            loss: loss_value,
            eer,
            auc,
            kept,
            accuracy: pair_accuracy(&subset.labels, &kept_weighted),
            sparsity,
        }),
    ))
}

fn format_eta(remaining: f64) -> String {
    if remaining < 60.0 {
        format!("{:.0}s", remaining)
    } else if remaining < 3600.0 {
        format!("{:.0}m", remaining / 60.0)
    } else {
        format!("{:.1}h", remaining / 3600.0)
    }
}

/// Run the training loop.
///
/// # Arguments
/// - `config`: training hyperparameters, validated before anything else
/// - `model`: freshly initialized model (consumed, returned trained)
/// - `train_source` / `eval_source`: labelled feature pairs; the held-out
///   set is evaluated at the end of every epoch when present
/// - `stats`: normalization statistics applied to every batch
///
/// If `config.train_dir` already holds a checkpoint, training resumes from
/// it (model, optimizer state and counters) and `checkpoint_path` is
/// ignored. Otherwise `checkpoint_path`, when set, warm-starts the
/// components not excluded by `checkpoint_exclude_scopes`.
///
/// # Returns
/// The trained model and the metrics history (also saved to
/// `{train_dir}/history.json`).
pub fn train<B: AutodiffBackend>(
    config: &TrainingConfig,
    mut model: PairModel<B>,
    train_source: &dyn FeatureSource,
    eval_source: Option<&dyn FeatureSource>,
    stats: &FeatureStats,
    device: &B::Device,
) -> anyhow::Result<(PairModel<B>, MetricsHistory)> {
    config.validate()?;
    stats.check_dims(train_source.audio_dim(), train_source.visual_dim())?;
    let miner = config.miner()?;

    let batches_per_epoch = num_batches(train_source.len(), config.batch_size);
    if batches_per_epoch == 0 {
        anyhow::bail!(
            "Training set has {} samples, fewer than one batch of {}",
            train_source.len(),
            config.batch_size
        );
    }
    if let Some(source) = eval_source {
        if num_batches(source.len(), config.batch_size) == 0 {
            anyhow::bail!(
                "Evaluation set has {} samples, fewer than one batch of {}",
                source.len(),
                config.batch_size
            );
        }
    }
    let schedule = LrSchedule::from_config(&config.schedule, train_source.len(), config.batch_size)?;
    let mut optimizer = config.optimizer.build::<B, PairModel<B>>()?;

    let train_dir = Path::new(&config.train_dir);
    std::fs::create_dir_all(train_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", train_dir.display()))?;
    let history_path = train_dir.join(HISTORY_FILE);

    let mut history = MetricsHistory::new();
    let mut start_epoch = 0;
    let mut step = 0;
    let mut trained_steps: u64 = 0;
    let mut skipped_steps: u64 = 0;

    if let Some(dir) = latest_checkpoint(train_dir) {
        if let Some(path) = &config.checkpoint_path {
            tracing::info!(
                ignored = %path,
                existing = %dir.display(),
                "Checkpoint already exists in train dir; ignoring checkpoint_path"
            );
        }
        let meta = read_meta(&dir)?;
        model = load_components(model, &dir, &[], false, device)?.0;
        optimizer = optimizer.load(&dir.join(OPTIMIZER_FILE), device)?;
        start_epoch = meta.epoch + 1;
        step = meta.step;
        trained_steps = meta.trained_steps;
        skipped_steps = meta.skipped_steps;
        if history_path.is_file() {
            match MetricsHistory::load(&history_path) {
                Ok(h) => history = h,
                Err(e) => tracing::warn!("Starting a new history: {e}"),
            }
        }
        tracing::info!(
            start_epoch,
            step,
            trained_steps,
            skipped_steps,
            "Resumed training from checkpoint"
        );
    } else if let Some(path) = &config.checkpoint_path {
        let dir = resolve_checkpoint(Path::new(path))?;
        let (loaded, restored) = load_components(
            model,
            &dir,
            &config.checkpoint_exclude_scopes,
            config.ignore_missing_vars,
            device,
        )?;
        model = loaded;
        tracing::info!(dir = %dir.display(), ?restored, "Warm start");
    }

    model = freeze_outside_scopes(model, &config.trainable_scopes);

    let total_steps = config.num_epochs * batches_per_epoch;
    let max_to_keep = config.max_to_keep.unwrap_or(config.num_epochs);
    let eval_settings = config.eval_settings();
    tracing::info!(
        samples = train_source.len(),
        batches_per_epoch,
        epochs = config.num_epochs,
        batch_size = config.batch_size,
        hard_margin = config.hard_margin,
        policy = %miner.empty_class_policy,
        "Starting training"
    );

    let mut running_avg = RunningAvg::new();
    let train_start = Instant::now();
    let run_start_step = step;

    for epoch in start_epoch..config.num_epochs {
        let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed.wrapping_add(epoch as u64));
        let order = batch_order(batches_per_epoch, config.shuffle, &mut rng);

        for b in order {
            let start = b * config.batch_size;
            let mut batch = train_source.read(start..start + config.batch_size);
            batch.normalize(stats);

            let lr = schedule.lr(step);
            let log_now = config.log_every_n_steps > 0 && step % config.log_every_n_steps == 0;
            let (updated, summary) = train_step(
                model,
                optimizer.as_mut(),
                &batch,
                &miner,
                config,
                lr,
                log_now,
                device,
            )?;
            model = updated;

            let Some(summary) = summary else {
                skipped_steps += 1;
                if log_now {
                    let skip_rate = skipped_steps as f64 / (step + 1) as f64 * 100.0;
                    tracing::warn!(
                        step,
                        skipped_steps,
                        skip_rate = format!("{skip_rate:.1}%"),
                        "Step skipped (empty mined subset)"
                    );
                }
                step += 1;
                continue;
            };
            trained_steps += 1;

            let metrics = StepMetrics {
                step,
                epoch,
                loss: summary.loss,
                eer: summary.eer,
                auc: summary.auc,
                kept: summary.kept,
                batch: batch.len(),
                accuracy: summary.accuracy,
                lr,
            };
            running_avg.update(&metrics);

            if log_now {
                for (end_point, sparsity) in &summary.sparsity {
                    tracing::debug!(step, end_point, sparsity = format!("{sparsity:.3}"), "Activation sparsity");
                }
                let done = (step - run_start_step + 1) as f64;
                let elapsed = train_start.elapsed().as_secs_f64();
                let remaining = elapsed / done * total_steps.saturating_sub(step + 1) as f64;
                let eta = format_eta(remaining);
                let lr_str = format!("{:.2e}", lr);
                tracing::info!(step, epoch, lr = %lr_str, eta, "avg({}) {}", running_avg.count(), running_avg.display());
                history.push_step(metrics);
                running_avg.reset();
            }
            step += 1;
        }

        let meta = CheckpointMeta {
            epoch,
            step,
            trained_steps,
            skipped_steps,
        };
        save_checkpoint(train_dir, &model, optimizer.as_ref(), &meta)?;
        prune_checkpoints(train_dir, max_to_keep)?;

        match eval_source {
            Some(source) => {
                let outcome = evaluate_source(&model.valid(), source, stats, &eval_settings, device)?;
                tracing::info!(
                    epoch,
                    step,
                    eer = format!("{:.4} ± {:.4}", outcome.report.eer.mean, outcome.report.eer.std),
                    auc = format!("{:.4} ± {:.4}", outcome.report.auc.mean, outcome.report.auc.std),
                    "Epoch evaluation"
                );
                history.push_epoch(EpochReport {
                    epoch,
                    step,
                    eval: outcome.report,
                    eval_loss: outcome.loss,
                });
            }
            None => tracing::info!(epoch, "No held-out set, skipping evaluation"),
        }
        history.save(&history_path)?;
    }

    let total_time = train_start.elapsed();
    let seen = trained_steps + skipped_steps;
    let skip_rate = if seen > 0 {
        skipped_steps as f64 / seen as f64 * 100.0
    } else {
        0.0
    };
    tracing::info!(
        trained_steps,
        skipped_steps,
        total_steps,
        skip_rate = format!("{skip_rate:.1}%"),
        elapsed_secs = format!("{:.1}", total_time.as_secs_f64()),
        "Training loop finished"
    );
    if skip_rate > 50.0 {
        tracing::warn!(
            skip_rate = format!("{skip_rate:.1}%"),
            "Over 50% of training steps mined no pairs; check hard_margin and the empty class policy"
        );
    }
    if let Some(best) = history.best_epoch() {
        tracing::info!(epoch = best.epoch, eer = format!("{:.4}", best.eval.eer.mean), "Best held-out epoch");
    }

    Ok((model, history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::pair::PairModelConfig;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use features::{FeatureRecord, PairLabel};

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;
    type Model = PairModel<TestAutodiffBackend>;

    fn tiny_model() -> Model {
        PairModelConfig::new(6, 4)
            .with_d_hidden1(8)
            .with_d_hidden2(8)
            .with_d_embed(4)
            .with_dropout(0.0)
            .init(&Default::default())
    }

    fn batch(labels: &[PairLabel]) -> FeatureBatch {
        let records: Vec<FeatureRecord> = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| FeatureRecord {
                audio: (0..6).map(|j| ((i * 7 + j) % 5) as f32 * 0.3 - 0.6).collect(),
                visual: (0..4).map(|j| ((i * 3 + j) % 4) as f32 * 0.25).collect(),
                label,
            })
            .collect();
        FeatureBatch::from_records(&records)
    }

    fn l2(model: &Model, batch: &FeatureBatch) -> Vec<f32> {
        let device = Default::default();
        let (a, v, _) = batch.to_tensors::<NdArray<f32>>(&device).unwrap();
        column_to_vec(model.valid().forward(a, v).l2_distance).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = TrainingConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 256);
        assert_eq!(config.loss_margin, 70.0);
        assert_eq!(config.max_to_keep, None);
        assert!(config.checkpoint_path.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            TrainingConfig::new().with_batch_size(0),
            TrainingConfig::new().with_eval_folds(0),
            TrainingConfig::new().with_num_clones(0),
            TrainingConfig::new().with_loss_margin(-1.0),
            TrainingConfig::new().with_trainable_scopes(vec!["decoder".into()]),
            TrainingConfig::new().with_trainable_scopes(vec!["scorer".into()]),
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn test_validate_rejects_unknown_names() {
        let config = TrainingConfig::new().with_optimizer(OptimizerConfig::new().with_optimizer("ftrl".into()));
        assert!(matches!(config.validate(), Err(ConfigError::UnknownOptimizer(_))));

        let config = TrainingConfig::new().with_schedule(ScheduleConfig::new().with_schedule("cosine".into()));
        assert!(matches!(config.validate(), Err(ConfigError::UnknownSchedule(_))));

        let config = TrainingConfig::new().with_empty_class_policy("drop".into());
        assert!(matches!(config.validate(), Err(ConfigError::UnknownEmptyClassPolicy(_))));
    }

    #[test]
    fn test_single_class_batch_is_skipped() {
        let device = Default::default();
        let config = TrainingConfig::new();
        let mut optimizer = config.optimizer.build::<TestAutodiffBackend, Model>().unwrap();
        let b = batch(&[PairLabel::Genuine; 6]);
        let model = tiny_model();
        let before = l2(&model, &b);

        let (model, summary) = train_step(
            model,
            optimizer.as_mut(),
            &b,
            &config.miner().unwrap(),
            &config,
            0.1,
            false,
            &device,
        )
        .unwrap();
        assert!(summary.is_none());
        assert_eq!(l2(&model, &b), before);
    }

    #[test]
    fn test_step_updates_and_reports() {
        let device = Default::default();
        // Large hard margin keeps every pair
        let config = TrainingConfig::new().with_hard_margin(1e6);
        let mut optimizer = config.optimizer.build::<TestAutodiffBackend, Model>().unwrap();
        let b = batch(&[PairLabel::Genuine, PairLabel::Impostor, PairLabel::Genuine, PairLabel::Impostor]);
        let model = tiny_model();
        let before = l2(&model, &b);

        let (model, summary) = train_step(
            model,
            optimizer.as_mut(),
            &b,
            &config.miner().unwrap(),
            &config,
            0.01,
            true,
            &device,
        )
        .unwrap();
        let summary = summary.unwrap();
        assert_eq!(summary.kept, 4);
        assert!(summary.loss.is_finite() && summary.loss >= 0.0);
        assert!((0.0..=1.0).contains(&summary.auc));
        assert_eq!(summary.sparsity.len(), 4);
        assert_ne!(l2(&model, &b), before);
    }

    #[test]
    fn test_sharded_step_matches_single() {
        let device = Default::default();
        let b = batch(&[
            PairLabel::Genuine,
            PairLabel::Impostor,
            PairLabel::Impostor,
            PairLabel::Genuine,
            PairLabel::Genuine,
        ]);
        let base = TrainingConfig::new()
            .with_hard_margin(1e6)
            .with_optimizer(OptimizerConfig::new().with_optimizer("sgd".into()).with_weight_decay(0.0));
        let model = tiny_model();

        let run = |clones: usize| {
            let config = base.clone().with_num_clones(clones);
            let mut optimizer = config.optimizer.build::<TestAutodiffBackend, Model>().unwrap();
            let (m, s) = train_step(
                model.clone(),
                optimizer.as_mut(),
                &b,
                &config.miner().unwrap(),
                &config,
                1e-3,
                false,
                &device,
            )
            .unwrap();
            (l2(&m, &b), s.unwrap().loss)
        };

        let (single, single_loss) = run(1);
        let (sharded, sharded_loss) = run(2);
        assert!((single_loss - sharded_loss).abs() < 1e-3 * single_loss.max(1.0));
        for (a, b) in single.iter().zip(&sharded) {
            assert!((a - b).abs() < 1e-3, "single {a} vs sharded {b}");
        }
    }

    #[test]
    fn test_freeze_outside_scopes() {
        let device = Default::default();
        let config = TrainingConfig::new()
            .with_hard_margin(1e6)
            .with_weighted_loss_weight(1.0)
            .with_trainable_scopes(vec!["scorer".into()])
            .with_optimizer(OptimizerConfig::new().with_optimizer("sgd".into()));
        assert!(config.validate().is_ok());
        let mut optimizer = config.optimizer.build::<TestAutodiffBackend, Model>().unwrap();
        let model = freeze_outside_scopes(tiny_model(), &["scorer".to_string()]);
        let b = batch(&[PairLabel::Genuine, PairLabel::Impostor, PairLabel::Genuine, PairLabel::Impostor]);
        let before = l2(&model, &b);

        let (model, summary) = train_step(
            model,
            optimizer.as_mut(),
            &b,
            &config.miner().unwrap(),
            &config,
            0.1,
            false,
            &device,
        )
        .unwrap();
        assert!(summary.is_some());
        // Embedding nets are frozen and L2 depends on nothing else; the scorer trains through the BCE term
        assert_eq!(l2(&model, &b), before);
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(42.0), "42s");
        assert_eq!(format_eta(600.0), "10m");
        assert_eq!(format_eta(5400.0), "1.5h");
    }
}
