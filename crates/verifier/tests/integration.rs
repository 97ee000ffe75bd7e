//! Integration tests for the av-verify pipeline.
//!
//! The shipped TOML is checked against the library defaults, and the
//! feature → statistics → scorer path is exercised end-to-end on the
//! NdArray backend with synthetic Parquet files.

use std::path::PathBuf;

use burn::backend::ndarray::NdArray;
use features::{FeatureReader, FeatureRecord, FeatureStats, FeatureWriter, PairLabel};
use syncnet::{
    EvalSettings, InMemorySource, OptimizerConfig, PairModelConfig, PairScorer, ScheduleConfig,
    TrainingConfig,
};

type TestBackend = NdArray<f32>;

fn shipped_config() -> toml::Value {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../configs/syncnet.toml");
    let contents = std::fs::read_to_string(&path).unwrap();
    toml::from_str(&contents).unwrap()
}

fn float(section: &toml::Value, key: &str) -> f64 {
    section[key].as_float().unwrap_or_else(|| panic!("{key} is not a float"))
}

fn int(section: &toml::Value, key: &str) -> usize {
    section[key].as_integer().unwrap_or_else(|| panic!("{key} is not an integer")) as usize
}

#[test]
fn test_shipped_config_sections() {
    let config = shipped_config();
    let table = config.as_table().unwrap();
    let mut sections: Vec<&str> = table.keys().map(String::as_str).collect();
    sections.sort_unstable();
    assert_eq!(
        sections,
        vec!["checkpoint", "data", "mining", "model", "optimizer", "schedule", "training"]
    );
}

#[test]
fn test_shipped_config_matches_defaults() {
    let config = shipped_config();

    let training = TrainingConfig::new();
    let t = &config["training"];
    assert_eq!(int(t, "batch_size"), training.batch_size);
    assert_eq!(int(t, "num_epochs"), training.num_epochs);
    assert_eq!(float(t, "loss_margin"), training.loss_margin);
    assert_eq!(float(t, "genuine_margin"), training.genuine_margin);
    assert_eq!(int(t, "eval_folds"), training.eval_folds);
    assert_eq!(float(&config["mining"], "hard_margin"), training.hard_margin);
    assert_eq!(
        config["mining"]["empty_class_policy"].as_str(),
        Some(training.empty_class_policy.as_str())
    );
    assert_eq!(
        config["checkpoint"]["train_dir"].as_str(),
        Some(training.train_dir.as_str())
    );

    let optimizer = OptimizerConfig::new();
    let o = &config["optimizer"];
    assert_eq!(o["optimizer"].as_str(), Some(optimizer.optimizer.as_str()));
    assert_eq!(float(o, "opt_epsilon"), optimizer.opt_epsilon);
    assert_eq!(float(o, "weight_decay"), optimizer.weight_decay);

    let schedule = ScheduleConfig::new();
    let s = &config["schedule"];
    assert_eq!(s["schedule"].as_str(), Some(schedule.schedule.as_str()));
    assert_eq!(float(s, "learning_rate"), schedule.learning_rate);
    assert_eq!(float(s, "decay_factor"), schedule.decay_factor);

    let model = PairModelConfig::new(1, 1);
    let m = &config["model"];
    assert_eq!(int(m, "d_hidden1"), model.d_hidden1);
    assert_eq!(int(m, "d_hidden2"), model.d_hidden2);
    assert_eq!(int(m, "d_embed"), model.d_embed);
    assert_eq!(float(m, "dropout"), model.dropout);
}

fn records(n: usize) -> Vec<FeatureRecord> {
    (0..n)
        .map(|i| {
            let x = i as f32 * 0.1;
            let label = if i % 3 == 0 { PairLabel::Genuine } else { PairLabel::Impostor };
            FeatureRecord {
                audio: vec![x, x.sin(), 2.0 * x, 1.0],
                visual: vec![x.cos(), -x, 0.5],
                label,
            }
        })
        .collect()
}

#[test]
fn test_features_to_scorer() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut writer = FeatureWriter::new(tmp.path().join("eval.parquet"));
    writer.record_all(records(30));
    let path = writer.finish().unwrap();

    let summary = FeatureReader::read_summary(&path).unwrap();
    assert_eq!(summary.total_records, 30);
    assert_eq!(summary.genuine_count, 10);
    assert_eq!(summary.impostor_count, 20);
    assert_eq!((summary.audio_dim, summary.visual_dim), (4, 3));

    let source = InMemorySource::from_parquet(&[path], 1).unwrap();
    let stats = FeatureStats::compute(source.records()).unwrap();
    let stats_path = tmp.path().join("stats.json");
    stats.save(&stats_path).unwrap();
    let stats = FeatureStats::load(&stats_path).unwrap();

    let config = PairModelConfig::new(4, 3).with_d_hidden1(8).with_d_hidden2(8).with_d_embed(4);
    let device = Default::default();
    let model = config.init::<TestBackend>(&device);
    let scorer = PairScorer::new(model, &config, stats, device).unwrap();

    let settings = EvalSettings {
        batch_size: 8,
        folds: 3,
        loss_margin: 1.0,
        genuine_margin: 0.0,
    };
    let outcome = scorer.evaluate(&source, &settings).unwrap();
    // 30 samples → 3 full batches of 8 → folds of 8
    assert_eq!(outcome.samples, 24);
    assert_eq!(outcome.report.fold_size, 8);
    assert_eq!(outcome.report.folds.len() + outcome.report.skipped_folds, 3);
    assert!(outcome.loss.is_finite());

    let score = scorer.score_record(&source.records()[0]).unwrap();
    assert!(score >= 0.0);
}

#[test]
fn test_scorer_rejects_mismatched_stats() {
    let config = PairModelConfig::new(4, 3);
    let device = Default::default();
    let model = config.init::<TestBackend>(&device);
    let result = PairScorer::new(model, &config, FeatureStats::identity(5, 3), device);
    assert!(result.is_err());
}
