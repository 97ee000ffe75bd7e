//! Subcommand implementations: train, evaluate, stats, summary.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::config::Config;
use features::{FeatureReader, FeatureStats};
use syncnet::training::checkpoint::resolve_checkpoint;
use syncnet::{train, FeatureSource, InMemorySource, PairModelConfig, PairScorer};

use crate::config::{
    build_model_config, build_training_config, load_or_default, num_readers, DataOverrides,
    TrainCliOverrides,
};
use crate::results::EvaluationResult;

type TrainBackend = Autodiff<NdArray<f32>>;
type EvalBackend = NdArray<f32>;

/// Model architecture saved in the train dir so evaluation can rebuild it.
pub const MODEL_CONFIG_FILE: &str = "model.json";
/// Normalization statistics saved in the train dir when computed on the fly.
pub const STATS_FILE: &str = "stats.json";

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    pub config: Option<PathBuf>,
    /// Training feature files.
    pub train: Vec<PathBuf>,
    /// Held-out feature files evaluated after every epoch.
    pub eval: Vec<PathBuf>,
    /// Precomputed statistics. Defaults to `stats.json` in the train dir,
    /// computed from the training set when that is missing too.
    pub stats: Option<PathBuf>,
    pub train_dir: Option<PathBuf>,
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub checkpoint_path: Option<PathBuf>,
    pub num_readers: Option<usize>,
}

/// Arguments for the `evaluate` subcommand.
#[derive(Debug)]
pub struct EvaluateArgs {
    /// Checkpoint directory, or a train dir whose latest checkpoint is used.
    pub checkpoint: PathBuf,
    pub features: Vec<PathBuf>,
    /// Statistics file. Falls back to `stats.json` next to the checkpoint.
    pub stats: Option<PathBuf>,
    pub folds: Option<usize>,
    pub batch_size: Option<usize>,
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub num_readers: Option<usize>,
}

/// Arguments for the `stats` subcommand.
#[derive(Debug)]
pub struct StatsArgs {
    pub features: Vec<PathBuf>,
    pub output: PathBuf,
    pub num_readers: Option<usize>,
}

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    pub input: PathBuf,
    pub json: bool,
}

/// The first existing `name` in `dir` or its parent.
fn find_beside(dir: &Path, name: &str) -> Option<PathBuf> {
    std::iter::once(dir)
        .chain(dir.parent())
        .map(|d| d.join(name))
        .find(|p| p.is_file())
}

fn same_config(a: &PairModelConfig, b: &PairModelConfig) -> anyhow::Result<bool> {
    Ok(serde_json::to_value(a)? == serde_json::to_value(b)?)
}

/// Train on Parquet features, checkpointing into the train dir.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Config: defaults < TOML < CLI, validated before any data is read
    let toml = load_or_default(args.config.as_deref())?;
    let cli = TrainCliOverrides {
        train_dir: args.train_dir,
        num_epochs: args.epochs,
        batch_size: args.batch_size,
        checkpoint_path: args.checkpoint_path,
    };
    let config = build_training_config(&toml, &cli);
    config.validate()?;
    let readers = num_readers(&toml.data, args.num_readers);

    // 2. Features
    let train_source = InMemorySource::from_parquet(&args.train, readers)?;
    if train_source.is_empty() {
        anyhow::bail!("No training records found in {} file(s)", args.train.len());
    }
    let eval_source = if args.eval.is_empty() {
        tracing::warn!("No --eval files given; epochs will not be evaluated");
        None
    } else {
        Some(InMemorySource::from_parquet(&args.eval, readers)?)
    };

    let train_dir = PathBuf::from(&config.train_dir);
    std::fs::create_dir_all(&train_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", train_dir.display()))?;

    // 3. Normalization statistics
    let saved_stats = train_dir.join(STATS_FILE);
    let stats = match &args.stats {
        Some(path) => FeatureStats::load(path)?,
        // A resumed run keeps the statistics its checkpoints were trained with
        None if saved_stats.is_file() => {
            tracing::info!(path = %saved_stats.display(), "Using normalization statistics from train dir");
            FeatureStats::load(&saved_stats)?
        }
        None => {
            let stats = FeatureStats::compute(train_source.records())?;
            stats.save(&saved_stats)?;
            tracing::info!(path = %saved_stats.display(), "Computed normalization statistics from training set");
            stats
        }
    };

    // 4. Model architecture, pinned in the train dir for resume and evaluation
    let model_config = build_model_config(&toml.model, train_source.audio_dim(), train_source.visual_dim());
    let model_config_path = train_dir.join(MODEL_CONFIG_FILE);
    if model_config_path.is_file() {
        let existing = PairModelConfig::load(&model_config_path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", model_config_path.display()))?;
        if !same_config(&existing, &model_config)? {
            anyhow::bail!(
                "Model config in {} differs from the requested one; use a new train dir",
                model_config_path.display()
            );
        }
    } else {
        model_config
            .save(&model_config_path)
            .map_err(|e| anyhow::anyhow!("Failed to save {}: {e}", model_config_path.display()))?;
    }

    // 5. Train
    let device = Default::default();
    let model = model_config.init::<TrainBackend>(&device);
    let (_, history) = train::<TrainBackend>(
        &config,
        model,
        &train_source,
        eval_source.as_ref().map(|s| s as &dyn FeatureSource),
        &stats,
        &device,
    )?;

    // 6. Summary
    let elapsed = start.elapsed();
    println!("\n--- Training Summary ---");
    println!("Train dir: {}", train_dir.display());
    println!("Train samples: {}", train_source.len());
    if let Some(source) = &eval_source {
        println!("Eval samples: {}", source.len());
    }
    if let Some(last) = history.epochs.last() {
        println!(
            "Last epoch {}: EER {:.4} ± {:.4}, AUC {:.4} ± {:.4}",
            last.epoch, last.eval.eer.mean, last.eval.eer.std, last.eval.auc.mean, last.eval.auc.std
        );
    }
    if let Some(best) = history.best_epoch() {
        println!("Best epoch {}: EER {:.4}", best.epoch, best.eval.eer.mean);
    }
    println!("Elapsed: {:.1}s", elapsed.as_secs_f64());

    Ok(())
}

/// K-fold EER/AUC of a checkpoint on held-out features.
pub fn run_evaluate(args: EvaluateArgs) -> anyhow::Result<EvaluationResult> {
    let toml = load_or_default(args.config.as_deref())?;
    let mut config = build_training_config(
        &toml,
        &TrainCliOverrides {
            batch_size: args.batch_size,
            ..Default::default()
        },
    );
    if let Some(k) = args.folds {
        config.eval_folds = k;
    }
    config.validate()?;

    let dir = resolve_checkpoint(&args.checkpoint)?;
    let source = InMemorySource::from_parquet(&args.features, num_readers(&toml.data, args.num_readers))?;

    let model_config = match find_beside(&dir, MODEL_CONFIG_FILE) {
        Some(path) => PairModelConfig::load(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", path.display()))?,
        None => {
            tracing::warn!(
                dir = %dir.display(),
                "No {MODEL_CONFIG_FILE} beside checkpoint; building the model from config and feature dims"
            );
            build_model_config(&toml.model, source.audio_dim(), source.visual_dim())
        }
    };
    let stats_path = args
        .stats
        .clone()
        .or_else(|| find_beside(&dir, STATS_FILE))
        .ok_or_else(|| anyhow::anyhow!("No normalization statistics: pass --stats"))?;
    let stats = FeatureStats::load(&stats_path)?;

    let scorer = PairScorer::<EvalBackend>::load(&dir, &model_config, stats, Default::default())?;
    let outcome = scorer.evaluate(&source, &config.eval_settings())?;
    let result = EvaluationResult::from_outcome(&dir, &args.features, config.eval_folds, outcome);

    println!("--- Verification Results ---");
    for line in result.summary_lines() {
        println!("{line}");
    }
    if let Some(path) = &args.output {
        result.save(path)?;
        println!("Results written to {}", path.display());
    }

    Ok(result)
}

/// Compute per-element normalization statistics over feature files.
pub fn run_stats(args: StatsArgs) -> anyhow::Result<FeatureStats> {
    let readers = num_readers(&DataOverrides::default(), args.num_readers);
    let records = FeatureReader::read_multiple(&args.features, readers)?;
    let stats = FeatureStats::compute(&records)?;
    stats.save(&args.output)?;

    println!("--- Normalization Statistics ---");
    println!("Records: {}", records.len());
    println!("Audio dim: {}", stats.audio_dim());
    println!("Visual dim: {}", stats.visual_dim());
    println!("Output: {}", args.output.display());
    Ok(stats)
}

/// Print counts and dimensions of a feature Parquet file.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let summary = FeatureReader::read_summary(&args.input)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("--- Feature Summary ---");
    println!("File: {}", args.input.display());
    println!("Total records: {}", summary.total_records);
    println!("Genuine: {}", summary.genuine_count);
    println!("Impostor: {}", summary.impostor_count);
    println!("Audio dim: {}", summary.audio_dim);
    println!("Visual dim: {}", summary.visual_dim);
    if summary.total_records > 0 {
        let rate = summary.genuine_count as f64 / summary.total_records as f64 * 100.0;
        println!("Genuine fraction: {rate:.1}%");
    }

    Ok(())
}
