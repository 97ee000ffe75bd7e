//! Feature/label source for training and evaluation.
//!
//! Samples are read in fixed-size contiguous slices. Normalization with
//! externally supplied mean/std happens on the batch, after slicing and
//! before anything reaches the networks.

use std::ops::Range;
use std::path::PathBuf;

use burn::prelude::*;
use features::{FeatureReader, FeatureRecord, FeatureStats, PairLabel};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::bridge::{labels_to_tensor, rows_to_tensor};

/// A contiguous, read-only collection of labelled feature pairs.
pub trait FeatureSource {
    /// Total number of samples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattened audio feature length.
    fn audio_dim(&self) -> usize;

    /// Flattened visual feature length.
    fn visual_dim(&self) -> usize;

    /// Read the samples in `range` (clamped to `len()`).
    fn read(&self, range: Range<usize>) -> FeatureBatch;
}

/// A batch of samples as flat row-major buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    pub audio: Vec<f32>,
    pub visual: Vec<f32>,
    pub labels: Vec<PairLabel>,
    pub audio_dim: usize,
    pub visual_dim: usize,
}

impl FeatureBatch {
    /// Build a batch from records. All records must share dimensions.
    pub fn from_records(records: &[FeatureRecord]) -> Self {
        let audio_dim = records.first().map(|r| r.audio.len()).unwrap_or(0);
        let visual_dim = records.first().map(|r| r.visual.len()).unwrap_or(0);
        let mut batch = Self {
            audio: Vec::with_capacity(records.len() * audio_dim),
            visual: Vec::with_capacity(records.len() * visual_dim),
            labels: Vec::with_capacity(records.len()),
            audio_dim,
            visual_dim,
        };
        for record in records {
            batch.audio.extend_from_slice(&record.audio);
            batch.visual.extend_from_slice(&record.visual);
            batch.labels.push(record.label);
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Re-slice to the given sample indices, in the order given.
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut out = Self {
            audio: Vec::with_capacity(indices.len() * self.audio_dim),
            visual: Vec::with_capacity(indices.len() * self.visual_dim),
            labels: Vec::with_capacity(indices.len()),
            audio_dim: self.audio_dim,
            visual_dim: self.visual_dim,
        };
        for &i in indices {
            out.audio
                .extend_from_slice(&self.audio[i * self.audio_dim..(i + 1) * self.audio_dim]);
            out.visual
                .extend_from_slice(&self.visual[i * self.visual_dim..(i + 1) * self.visual_dim]);
            out.labels.push(self.labels[i]);
        }
        out
    }

    /// Subtract mean and divide by std, per feature element.
    pub fn normalize(&mut self, stats: &FeatureStats) {
        stats.normalize_audio(&mut self.audio);
        stats.normalize_visual(&mut self.visual);
    }

    /// Labels as floats: 1.0 genuine, 0.0 impostor.
    pub fn label_values(&self) -> Vec<f32> {
        self.labels.iter().map(|l| l.as_f32()).collect()
    }

    /// Convert to `(audio, visual, labels)` tensors of shapes
    /// `(n, audio_dim)`, `(n, visual_dim)`, `(n, 1)`.
    pub fn to_tensors<B: Backend>(
        &self,
        device: &B::Device,
    ) -> anyhow::Result<(Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>)> {
        let n = self.len();
        Ok((
            rows_to_tensor(&self.audio, n, self.audio_dim, device)?,
            rows_to_tensor(&self.visual, n, self.visual_dim, device)?,
            labels_to_tensor(&self.label_values(), device),
        ))
    }
}

/// A source backed by records held in memory.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    records: Vec<FeatureRecord>,
}

impl InMemorySource {
    pub fn new(records: Vec<FeatureRecord>) -> anyhow::Result<Self> {
        features::types::validate_dimensions(&records)?;
        Ok(Self { records })
    }

    /// Load and concatenate Parquet feature files using up to `workers` reader threads.
    pub fn from_parquet(paths: &[PathBuf], workers: usize) -> anyhow::Result<Self> {
        let records = FeatureReader::read_multiple(paths, workers)?;
        Ok(Self { records })
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }
}

impl FeatureSource for InMemorySource {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn audio_dim(&self) -> usize {
        self.records.first().map(|r| r.audio.len()).unwrap_or(0)
    }

    fn visual_dim(&self) -> usize {
        self.records.first().map(|r| r.visual.len()).unwrap_or(0)
    }

    fn read(&self, range: Range<usize>) -> FeatureBatch {
        let end = range.end.min(self.records.len());
        let start = range.start.min(end);
        FeatureBatch::from_records(&self.records[start..end])
    }
}

/// Number of full batches; the remainder after the last full batch is not visited.
pub fn num_batches(len: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        0
    } else {
        len / batch_size
    }
}

/// Order in which the full batches of an epoch are visited.
///
/// Batches stay contiguous slices; shuffling only permutes their order.
pub fn batch_order(num_batches: usize, shuffle: bool, rng: &mut impl Rng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..num_batches).collect();
    if shuffle {
        order.shuffle(rng);
    }
    order
}
