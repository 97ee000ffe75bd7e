mod config;
mod pipeline;
pub mod results;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipeline::{EvaluateArgs, StatsArgs, SummaryArgs, TrainArgs};

/// av-verify: audio/visual pair verification with hard-pair mining.
#[derive(Parser)]
#[command(name = "av-verify", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for training, evaluation, and feature inspection.
#[derive(Subcommand)]
enum Command {
    /// Train the two-stream pair model on Parquet features.
    Train {
        /// Path to TOML config. Built-in defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Training feature Parquet files.
        #[arg(long, required = true, num_args = 1..)]
        train: Vec<PathBuf>,
        /// Held-out feature Parquet files, evaluated after every epoch.
        #[arg(long, num_args = 1..)]
        eval: Vec<PathBuf>,
        /// Normalization statistics JSON. Defaults to `stats.json` in the train dir, computed if missing.
        #[arg(long)]
        stats: Option<PathBuf>,
        /// Directory for checkpoints and history. Resumes from its latest checkpoint.
        #[arg(long)]
        train_dir: Option<PathBuf>,
        /// Override the number of epochs.
        #[arg(long)]
        epochs: Option<usize>,
        /// Override the batch size.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Warm-start checkpoint, ignored when the train dir already has one.
        #[arg(long)]
        checkpoint_path: Option<PathBuf>,
        /// Number of Parquet reader threads.
        #[arg(long)]
        num_readers: Option<usize>,
    },
    /// K-fold EER/AUC of a checkpoint on held-out features.
    Evaluate {
        /// Checkpoint directory, or a train dir (its latest checkpoint is used).
        #[arg(long)]
        checkpoint: PathBuf,
        /// Feature Parquet files to score.
        #[arg(long, required = true, num_args = 1..)]
        features: Vec<PathBuf>,
        /// Normalization statistics JSON. Defaults to `stats.json` beside the checkpoint.
        #[arg(long)]
        stats: Option<PathBuf>,
        /// Number of folds.
        #[arg(long)]
        folds: Option<usize>,
        /// Scoring batch size. Only full batches are scored.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Path to TOML config for margins and model shape.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write an `EvaluationResult` JSON here.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Number of Parquet reader threads.
        #[arg(long)]
        num_readers: Option<usize>,
    },
    /// Compute per-element normalization statistics.
    Stats {
        /// Feature Parquet files.
        #[arg(long, required = true, num_args = 1..)]
        features: Vec<PathBuf>,
        /// Output JSON path.
        #[arg(long)]
        output: PathBuf,
        /// Number of Parquet reader threads.
        #[arg(long)]
        num_readers: Option<usize>,
    },
    /// Print counts and dimensions of a feature Parquet file.
    Summary {
        /// Path to the Parquet file.
        #[arg(long)]
        input: PathBuf,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            train,
            eval,
            stats,
            train_dir,
            epochs,
            batch_size,
            checkpoint_path,
            num_readers,
        } => pipeline::run_train(TrainArgs {
            config,
            train,
            eval,
            stats,
            train_dir,
            epochs,
            batch_size,
            checkpoint_path,
            num_readers,
        }),
        Command::Evaluate {
            checkpoint,
            features,
            stats,
            folds,
            batch_size,
            config,
            output,
            num_readers,
        } => pipeline::run_evaluate(EvaluateArgs {
            checkpoint,
            features,
            stats,
            folds,
            batch_size,
            config,
            output,
            num_readers,
        })
        .map(|_| ()),
        Command::Stats {
            features,
            output,
            num_readers,
        } => pipeline::run_stats(StatsArgs {
            features,
            output,
            num_readers,
        })
        .map(|_| ()),
        Command::Summary { input, json } => pipeline::run_summary(SummaryArgs { input, json }),
    }
}
