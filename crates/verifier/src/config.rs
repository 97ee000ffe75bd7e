//! TOML config loading for the verifier CLI.
//!
//! Deserializes `configs/syncnet.toml`, whose sections mirror the library
//! configs with every key optional, then merges with CLI overrides.
//! Priority chain: library defaults < TOML values < CLI flags.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use syncnet::{OptimizerConfig, PairModelConfig, ScheduleConfig, TrainingConfig};

/// Default number of Parquet reader threads.
pub const DEFAULT_NUM_READERS: usize = 4;

/// Top-level structure matching `configs/syncnet.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierToml {
    #[serde(default)]
    pub model: ModelOverrides,
    #[serde(default)]
    pub training: TrainingOverrides,
    #[serde(default)]
    pub optimizer: OptimizerOverrides,
    #[serde(default)]
    pub schedule: ScheduleOverrides,
    #[serde(default)]
    pub mining: MiningOverrides,
    #[serde(default)]
    pub checkpoint: CheckpointOverrides,
    #[serde(default)]
    pub data: DataOverrides,
}

/// Optional overrides for `PairModelConfig`. Input dimensions always come
/// from the feature files.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelOverrides {
    pub d_hidden1: Option<usize>,
    pub d_hidden2: Option<usize>,
    pub d_embed: Option<usize>,
    pub dropout: Option<f64>,
    pub normalize_embeddings: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingOverrides {
    pub batch_size: Option<usize>,
    pub num_epochs: Option<usize>,
    pub loss_margin: Option<f64>,
    pub genuine_margin: Option<f64>,
    pub weighted_loss_weight: Option<f64>,
    pub log_every_n_steps: Option<usize>,
    pub eval_folds: Option<usize>,
    pub num_clones: Option<usize>,
    pub shuffle: Option<bool>,
    pub seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptimizerOverrides {
    pub optimizer: Option<String>,
    pub adam_beta1: Option<f64>,
    pub adam_beta2: Option<f64>,
    pub opt_epsilon: Option<f64>,
    pub momentum: Option<f64>,
    pub rmsprop_decay: Option<f64>,
    pub rmsprop_momentum: Option<f64>,
    pub weight_decay: Option<f64>,
    pub max_grad_norm: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleOverrides {
    pub schedule: Option<String>,
    pub learning_rate: Option<f64>,
    pub decay_factor: Option<f64>,
    pub num_epochs_per_decay: Option<f64>,
    pub end_learning_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MiningOverrides {
    pub hard_margin: Option<f64>,
    pub empty_class_policy: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointOverrides {
    pub train_dir: Option<String>,
    pub checkpoint_path: Option<String>,
    pub checkpoint_exclude_scopes: Option<Vec<String>>,
    pub trainable_scopes: Option<Vec<String>>,
    pub ignore_missing_vars: Option<bool>,
    pub max_to_keep: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataOverrides {
    pub num_readers: Option<usize>,
}

/// Flags of the `train` subcommand that override config values.
#[derive(Debug, Default, Clone)]
pub struct TrainCliOverrides {
    pub train_dir: Option<PathBuf>,
    pub num_epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub checkpoint_path: Option<PathBuf>,
}

/// Load and deserialize a `VerifierToml` from a TOML file.
pub fn load_verifier_toml(path: &Path) -> anyhow::Result<VerifierToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let config: VerifierToml = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Load the TOML file if given, otherwise start from all-default overrides.
pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<VerifierToml> {
    match path {
        Some(path) => load_verifier_toml(path),
        None => Ok(VerifierToml::default()),
    }
}

macro_rules! apply {
    ($target:expr, $source:expr, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(v) = $source.$field.clone() {
                $target.$field = v;
            }
        )*
    };
}

fn build_optimizer_config(overrides: &OptimizerOverrides) -> OptimizerConfig {
    let mut config = OptimizerConfig::new();
    apply!(
        config,
        overrides,
        [optimizer, adam_beta1, adam_beta2, opt_epsilon, momentum, rmsprop_decay, rmsprop_momentum, weight_decay]
    );
    if overrides.max_grad_norm.is_some() {
        config.max_grad_norm = overrides.max_grad_norm;
    }
    config
}

fn build_schedule_config(overrides: &ScheduleOverrides) -> ScheduleConfig {
    let mut config = ScheduleConfig::new();
    apply!(
        config,
        overrides,
        [schedule, learning_rate, decay_factor, num_epochs_per_decay, end_learning_rate]
    );
    config
}

/// Build a `TrainingConfig` from defaults, TOML overrides, and CLI flags.
pub fn build_training_config(toml: &VerifierToml, cli: &TrainCliOverrides) -> TrainingConfig {
    let mut config = TrainingConfig::new();

    let t = &toml.training;
    apply!(
        config,
        t,
        [
            batch_size,
            num_epochs,
            loss_margin,
            genuine_margin,
            weighted_loss_weight,
            log_every_n_steps,
            eval_folds,
            num_clones,
            shuffle,
            seed,
        ]
    );
    apply!(config, toml.mining, [hard_margin, empty_class_policy]);

    let c = &toml.checkpoint;
    apply!(
        config,
        c,
        [train_dir, checkpoint_exclude_scopes, trainable_scopes, ignore_missing_vars]
    );
    if c.checkpoint_path.is_some() {
        config.checkpoint_path = c.checkpoint_path.clone();
    }
    if c.max_to_keep.is_some() {
        config.max_to_keep = c.max_to_keep;
    }

    config.optimizer = build_optimizer_config(&toml.optimizer);
    config.schedule = build_schedule_config(&toml.schedule);

    // CLI overrides take highest priority
    if let Some(dir) = &cli.train_dir {
        config.train_dir = dir.display().to_string();
    }
    if let Some(n) = cli.num_epochs {
        config.num_epochs = n;
    }
    if let Some(n) = cli.batch_size {
        config.batch_size = n;
    }
    if let Some(path) = &cli.checkpoint_path {
        config.checkpoint_path = Some(path.display().to_string());
    }

    config
}

/// Build a `PairModelConfig` for the given feature dimensions.
pub fn build_model_config(overrides: &ModelOverrides, audio_dim: usize, visual_dim: usize) -> PairModelConfig {
    let mut config = PairModelConfig::new(audio_dim, visual_dim);
    apply!(
        config,
        overrides,
        [d_hidden1, d_hidden2, d_embed, dropout, normalize_embeddings]
    );
    config
}

/// Reader threads: TOML `[data] num_readers` < CLI `--num-readers`.
pub fn num_readers(overrides: &DataOverrides, cli: Option<usize>) -> usize {
    cli.or(overrides.num_readers).unwrap_or(DEFAULT_NUM_READERS).max(1)
}
