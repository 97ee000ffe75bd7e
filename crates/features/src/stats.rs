//! Per-element normalization statistics for audio and visual features.
//!
//! Stored as JSON next to the feature files. The trainer subtracts the mean
//! and divides by the standard deviation before anything reaches the
//! embedding networks.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{validate_dimensions, FeatureRecord};

/// Floor applied to standard deviations so constant features do not divide by zero.
pub const STD_FLOOR: f32 = 1e-6;

/// Mean and standard deviation per feature element, for both modalities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub audio_mean: Vec<f32>,
    pub audio_std: Vec<f32>,
    pub visual_mean: Vec<f32>,
    pub visual_std: Vec<f32>,
}

fn mean_std(rows: &[&[f32]], dim: usize) -> (Vec<f32>, Vec<f32>) {
    let n = rows.len().max(1) as f64;
    let mut sum = vec![0.0f64; dim];
    for row in rows {
        for (acc, &v) in sum.iter_mut().zip(row.iter()) {
            *acc += v as f64;
        }
    }
    let mean: Vec<f64> = sum.into_iter().map(|s| s / n).collect();

    let mut sq = vec![0.0f64; dim];
    for row in rows {
        for ((acc, &v), &m) in sq.iter_mut().zip(row.iter()).zip(mean.iter()) {
            let d = v as f64 - m;
            *acc += d * d;
        }
    }
    let std = sq.into_iter().map(|s| (s / n).sqrt() as f32).collect();
    (mean.into_iter().map(|m| m as f32).collect(), std)
}

fn normalize_in_place(values: &mut [f32], mean: &[f32], std: &[f32]) {
    for ((v, &m), &s) in values.iter_mut().zip(mean).zip(std) {
        *v = (*v - m) / s.max(STD_FLOOR);
    }
}

impl FeatureStats {
    /// Compute population mean/std per element over a set of records.
    pub fn compute(records: &[FeatureRecord]) -> anyhow::Result<Self> {
        if records.is_empty() {
            anyhow::bail!("Cannot compute feature statistics from an empty record set");
        }
        validate_dimensions(records)?;

        let audio: Vec<&[f32]> = records.iter().map(|r| r.audio.as_slice()).collect();
        let visual: Vec<&[f32]> = records.iter().map(|r| r.visual.as_slice()).collect();
        let (audio_mean, audio_std) = mean_std(&audio, records[0].audio.len());
        let (visual_mean, visual_std) = mean_std(&visual, records[0].visual.len());

        Ok(Self {
            audio_mean,
            audio_std,
            visual_mean,
            visual_std,
        })
    }

    /// Statistics that leave features unchanged (mean 0, std 1).
    pub fn identity(audio_dim: usize, visual_dim: usize) -> Self {
        Self {
            audio_mean: vec![0.0; audio_dim],
            audio_std: vec![1.0; audio_dim],
            visual_mean: vec![0.0; visual_dim],
            visual_std: vec![1.0; visual_dim],
        }
    }

    pub fn audio_dim(&self) -> usize {
        self.audio_mean.len()
    }

    pub fn visual_dim(&self) -> usize {
        self.visual_mean.len()
    }

    /// Normalize a flat row-major block of audio features in place.
    pub fn normalize_audio(&self, flat: &mut [f32]) {
        for row in flat.chunks_mut(self.audio_dim().max(1)) {
            normalize_in_place(row, &self.audio_mean, &self.audio_std);
        }
    }

    /// Normalize a flat row-major block of visual features in place.
    pub fn normalize_visual(&self, flat: &mut [f32]) {
        for row in flat.chunks_mut(self.visual_dim().max(1)) {
            normalize_in_place(row, &self.visual_mean, &self.visual_std);
        }
    }

    /// Check that these statistics match the given feature dimensions.
    pub fn check_dims(&self, audio_dim: usize, visual_dim: usize) -> anyhow::Result<()> {
        if self.audio_dim() != audio_dim || self.visual_dim() != visual_dim {
            anyhow::bail!(
                "Normalization stats are for audio={} visual={}, features are audio={audio_dim} visual={visual_dim}",
                self.audio_dim(),
                self.visual_dim()
            );
        }
        if self.audio_std.len() != self.audio_dim() || self.visual_std.len() != self.visual_dim() {
            anyhow::bail!("Normalization stats have mismatched mean/std lengths");
        }
        Ok(())
    }

    /// Save as pretty JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        tracing::info!(path = %path.display(), "Saved feature statistics");
        Ok(())
    }

    /// Load from JSON.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
        let stats: Self = serde_json::from_reader(file)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))?;
        stats.check_dims(stats.audio_dim(), stats.visual_dim())?;
        Ok(stats)
    }
}
