//! Checkpoint store.
//!
//! ```text
//! {train_dir}/
//!   latest                  name of the newest checkpoint directory
//!   epoch_{n}/
//!     audio_net.mpk
//!     visual_net.mpk
//!     scorer.mpk
//!     optimizer.mpk
//!     meta.json
//! ```
//!
//! Components are stored separately so a warm start can exclude some of
//! them by name prefix.

use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::model::pair::{PairModel, PairModelConfig, COMPONENTS};
use crate::training::optim::PairOptimizer;

/// File in the train dir naming the newest checkpoint.
pub const LATEST_FILE: &str = "latest";
pub const META_FILE: &str = "meta.json";
pub const OPTIMIZER_FILE: &str = "optimizer";
/// Extension the MessagePack recorder appends to every file.
const RECORD_EXT: &str = "mpk";

/// Metadata saved alongside each checkpoint for resuming training.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CheckpointMeta {
    /// Last completed epoch.
    pub epoch: usize,
    /// Global step after that epoch.
    pub step: usize,
    pub trained_steps: u64,
    pub skipped_steps: u64,
}

/// Directory for the checkpoint written at the end of `epoch`.
pub fn epoch_dir(train_dir: &Path, epoch: usize) -> PathBuf {
    train_dir.join(format!("epoch_{epoch}"))
}

fn epoch_of(dir_name: &str) -> Option<usize> {
    dir_name.strip_prefix("epoch_")?.parse().ok()
}

/// Whether `name` starts with any non-empty scope.
pub fn scope_matches(name: &str, scopes: &[String]) -> bool {
    scopes
        .iter()
        .any(|scope| !scope.is_empty() && name.starts_with(scope.as_str()))
}

fn component_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(name).with_extension(RECORD_EXT)
}

/// The newest checkpoint in `train_dir`, if it has one with readable metadata.
pub fn latest_checkpoint(train_dir: &Path) -> Option<PathBuf> {
    let name = std::fs::read_to_string(train_dir.join(LATEST_FILE)).ok()?;
    let dir = train_dir.join(name.trim());
    dir.join(META_FILE).is_file().then_some(dir)
}

/// Resolve a warm-start path: either a checkpoint directory itself or a
/// train dir whose latest checkpoint is used.
pub fn resolve_checkpoint(path: &Path) -> anyhow::Result<PathBuf> {
    if COMPONENTS
        .iter()
        .any(|name| component_file(path, name).is_file())
    {
        return Ok(path.to_path_buf());
    }
    latest_checkpoint(path).ok_or_else(|| {
        anyhow::anyhow!(
            "No checkpoint found at {}: expected component files or a '{LATEST_FILE}' file",
            path.display()
        )
    })
}

pub fn read_meta(dir: &Path) -> anyhow::Result<CheckpointMeta> {
    let meta_path = dir.join(META_FILE);
    let file = std::fs::File::open(&meta_path)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", meta_path.display()))?;
    serde_json::from_reader(file)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", meta_path.display()))
}

/// Save model components, optimizer state and metadata, then point
/// `latest` at the new directory.
pub fn save_checkpoint<B: AutodiffBackend>(
    train_dir: &Path,
    model: &PairModel<B>,
    optimizer: &dyn PairOptimizer<PairModel<B>, B>,
    meta: &CheckpointMeta,
) -> anyhow::Result<PathBuf> {
    let dir = epoch_dir(train_dir, meta.epoch);
    std::fs::create_dir_all(&dir)
        .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", dir.display()))?;
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let epoch = meta.epoch;

    model
        .audio_net
        .clone()
        .save_file(dir.join("audio_net"), &recorder)
        .map_err(|e| anyhow::anyhow!("Failed to save audio_net at epoch {epoch}: {e}"))?;
    model
        .visual_net
        .clone()
        .save_file(dir.join("visual_net"), &recorder)
        .map_err(|e| anyhow::anyhow!("Failed to save visual_net at epoch {epoch}: {e}"))?;
    model
        .scorer
        .clone()
        .save_file(dir.join("scorer"), &recorder)
        .map_err(|e| anyhow::anyhow!("Failed to save scorer at epoch {epoch}: {e}"))?;

    optimizer.save(&dir.join(OPTIMIZER_FILE))?;

    let meta_path = dir.join(META_FILE);
    serde_json::to_writer_pretty(
        std::fs::File::create(&meta_path)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", meta_path.display()))?,
        meta,
    )?;

    // Written last so `latest` never names a partial checkpoint
    let tmp = train_dir.join(format!("{LATEST_FILE}.tmp"));
    std::fs::write(&tmp, format!("epoch_{epoch}\n"))?;
    std::fs::rename(&tmp, train_dir.join(LATEST_FILE))?;

    tracing::info!(epoch, step = meta.step, dir = %dir.display(), "Checkpoint saved (model + optimizer + meta)");
    Ok(dir)
}

/// Restore model components from a checkpoint directory.
///
/// Components whose name starts with one of `exclude_scopes` keep their
/// current parameters. A missing component file is an error unless
/// `ignore_missing` is set, in which case it is skipped with a warning.
///
/// Returns the model and the names of the restored components.
pub fn load_components<B: Backend>(
    model: PairModel<B>,
    dir: &Path,
    exclude_scopes: &[String],
    ignore_missing: bool,
    device: &B::Device,
) -> anyhow::Result<(PairModel<B>, Vec<&'static str>)> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let mut restored = Vec::new();

    // Returns Ok(None) when the component should keep its current weights
    let should_load = |name: &'static str| -> anyhow::Result<Option<PathBuf>> {
        if scope_matches(name, exclude_scopes) {
            tracing::info!(component = name, "Excluded from warm start");
            return Ok(None);
        }
        let file = component_file(dir, name);
        if file.is_file() {
            Ok(Some(dir.join(name)))
        } else if ignore_missing {
            tracing::warn!(component = name, path = %file.display(), "Component missing from checkpoint, keeping initial weights");
            Ok(None)
        } else {
            anyhow::bail!("Checkpoint component missing: {}", file.display())
        }
    };

    let PairModel {
        mut audio_net,
        mut visual_net,
        mut scorer,
    } = model;

    if let Some(path) = should_load("audio_net")? {
        audio_net = audio_net
            .load_file(path, &recorder, device)
            .map_err(|e| anyhow::anyhow!("Failed to load audio_net from {}: {e}", dir.display()))?;
        restored.push("audio_net");
    }
    if let Some(path) = should_load("visual_net")? {
        visual_net = visual_net
            .load_file(path, &recorder, device)
            .map_err(|e| anyhow::anyhow!("Failed to load visual_net from {}: {e}", dir.display()))?;
        restored.push("visual_net");
    }
    if let Some(path) = should_load("scorer")? {
        scorer = scorer
            .load_file(path, &recorder, device)
            .map_err(|e| anyhow::anyhow!("Failed to load scorer from {}: {e}", dir.display()))?;
        restored.push("scorer");
    }

    Ok((
        PairModel {
            audio_net,
            visual_net,
            scorer,
        },
        restored,
    ))
}

/// Build a fresh model from config and load every component from `dir`.
pub fn load_model<B: Backend>(
    dir: &Path,
    config: &PairModelConfig,
    device: &B::Device,
) -> anyhow::Result<PairModel<B>> {
    let (model, _) = load_components(config.init::<B>(device), dir, &[], false, device)?;
    Ok(model)
}

/// Delete all but the newest `max_to_keep` epoch directories.
///
/// Returns the removed directories. `max_to_keep == 0` keeps everything.
pub fn prune_checkpoints(train_dir: &Path, max_to_keep: usize) -> anyhow::Result<Vec<PathBuf>> {
    if max_to_keep == 0 {
        return Ok(Vec::new());
    }
    let mut epochs: Vec<(usize, PathBuf)> = std::fs::read_dir(train_dir)
        .map_err(|e| anyhow::anyhow!("Failed to list {}: {e}", train_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let epoch = epoch_of(entry.file_name().to_str()?)?;
            Some((epoch, entry.path()))
        })
        .collect();
    epochs.sort_by_key(|(epoch, _)| *epoch);

    let excess = epochs.len().saturating_sub(max_to_keep);
    let mut removed = Vec::with_capacity(excess);
    for (epoch, dir) in epochs.into_iter().take(excess) {
        std::fs::remove_dir_all(&dir)
            .map_err(|e| anyhow::anyhow!("Failed to remove {}: {e}", dir.display()))?;
        tracing::debug!(epoch, "Pruned old checkpoint");
        removed.push(dir);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::optim::OptimizerConfig;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::module::AutodiffModule;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn config() -> PairModelConfig {
        PairModelConfig::new(6, 4)
            .with_d_hidden1(8)
            .with_d_hidden2(8)
            .with_d_embed(4)
            .with_dropout(0.0)
    }

    fn meta(epoch: usize) -> CheckpointMeta {
        CheckpointMeta {
            epoch,
            step: (epoch + 1) * 10,
            trained_steps: 9,
            skipped_steps: 1,
        }
    }

    fn save(train_dir: &Path, model: &PairModel<TestAutodiffBackend>, epoch: usize) -> PathBuf {
        let optimizer = OptimizerConfig::new()
            .build::<TestAutodiffBackend, PairModel<TestAutodiffBackend>>()
            .unwrap();
        save_checkpoint(train_dir, model, optimizer.as_ref(), &meta(epoch)).unwrap()
    }

    fn distances(model: &PairModel<TestBackend>) -> Vec<f32> {
        let device = Default::default();
        let audio = Tensor::<TestBackend, 2>::ones([3, 6], &device);
        let visual = Tensor::<TestBackend, 2>::ones([3, 4], &device).neg();
        model.forward(audio, visual).l2_distance.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_save_then_latest_and_meta() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        assert!(latest_checkpoint(tmp.path()).is_none());

        let model = config().init::<TestAutodiffBackend>(&device);
        let dir = save(tmp.path(), &model, 0);
        assert_eq!(dir, tmp.path().join("epoch_0"));
        for name in ["audio_net.mpk", "visual_net.mpk", "scorer.mpk", "optimizer.mpk", "meta.json"] {
            assert!(dir.join(name).is_file(), "{name} missing");
        }

        save(tmp.path(), &model, 1);
        assert_eq!(latest_checkpoint(tmp.path()), Some(tmp.path().join("epoch_1")));
        assert_eq!(read_meta(&tmp.path().join("epoch_1")).unwrap(), meta(1));
    }

    #[test]
    fn test_load_model_restores_weights() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let model = config().init::<TestAutodiffBackend>(&device);
        let dir = save(tmp.path(), &model, 0);

        let loaded = load_model::<TestBackend>(&dir, &config(), &device).unwrap();
        assert_eq!(distances(&loaded), distances(&model.valid()));
    }

    #[test]
    fn test_exclude_scopes_keep_fresh_weights() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let trained = config().init::<TestBackend>(&device);
        trained.audio_net.save_file(tmp.path().join("audio_net"), &recorder).unwrap();
        trained.visual_net.save_file(tmp.path().join("visual_net"), &recorder).unwrap();
        trained.scorer.save_file(tmp.path().join("scorer"), &recorder).unwrap();

        let fresh = config().init::<TestBackend>(&device);
        let (_, restored) = load_components(
            fresh,
            tmp.path(),
            &["visual".to_string(), "sc".to_string()],
            false,
            &device,
        )
        .unwrap();
        assert_eq!(restored, vec!["audio_net"]);
    }

    #[test]
    fn test_missing_component() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let model = config().init::<TestBackend>(&device);
        model
            .audio_net
            .clone()
            .save_file(tmp.path().join("audio_net"), &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
            .unwrap();

        let err = load_components(config().init::<TestBackend>(&device), tmp.path(), &[], false, &device)
            .err()
            .unwrap();
        assert!(err.to_string().contains("visual_net"));

        let (_, restored) =
            load_components(config().init::<TestBackend>(&device), tmp.path(), &[], true, &device).unwrap();
        assert_eq!(restored, vec!["audio_net"]);
    }

    #[test]
    fn test_resolve_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        assert!(resolve_checkpoint(tmp.path()).is_err());

        let model = config().init::<TestAutodiffBackend>(&device);
        let dir = save(tmp.path(), &model, 3);
        // A train dir resolves to its latest checkpoint, a checkpoint dir to itself
        assert_eq!(resolve_checkpoint(tmp.path()).unwrap(), dir);
        assert_eq!(resolve_checkpoint(&dir).unwrap(), dir);
    }

    #[test]
    fn test_prune_keeps_newest() {
        let tmp = TempDir::new().unwrap();
        for epoch in [0, 1, 2, 10] {
            std::fs::create_dir_all(epoch_dir(tmp.path(), epoch)).unwrap();
        }
        std::fs::create_dir_all(tmp.path().join("not_a_checkpoint")).unwrap();

        let removed = prune_checkpoints(tmp.path(), 2).unwrap();
        assert_eq!(removed, vec![epoch_dir(tmp.path(), 0), epoch_dir(tmp.path(), 1)]);
        assert!(epoch_dir(tmp.path(), 2).is_dir());
        assert!(epoch_dir(tmp.path(), 10).is_dir());
        assert!(tmp.path().join("not_a_checkpoint").is_dir());

        assert!(prune_checkpoints(tmp.path(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_scope_matches() {
        let scopes = vec!["audio".to_string(), String::new()];
        assert!(scope_matches("audio_net", &scopes));
        assert!(!scope_matches("visual_net", &scopes));
        assert!(!scope_matches("scorer", &[]));
    }
}
