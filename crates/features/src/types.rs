//! Data types for paired audio/visual feature records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors raised while validating or decoding feature data.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// A stored label was neither 0 (impostor) nor 1 (genuine).
    #[error("Invalid pair label {0}, expected 0 (impostor) or 1 (genuine)")]
    InvalidLabel(u8),

    /// A record's feature vector length differs from the rest of the file.
    #[error("{modality} dimension mismatch at row {row}: expected {expected}, got {actual}")]
    DimensionMismatch {
        modality: &'static str,
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// A Parquet column has an unexpected Arrow type.
    #[error("Schema mismatch: {0}")]
    Schema(String),
}

/// Ground truth for a pair: matching (genuine) or non-matching (impostor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairLabel {
    Impostor,
    Genuine,
}

impl PairLabel {
    /// Numeric value used by the loss and the ROC: 0 impostor, 1 genuine.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Impostor => 0,
            Self::Genuine => 1,
        }
    }

    pub fn as_f32(self) -> f32 {
        self.as_u8() as f32
    }

    pub fn is_genuine(self) -> bool {
        self == Self::Genuine
    }
}

impl TryFrom<u8> for PairLabel {
    type Error = FeatureError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Impostor),
            1 => Ok(Self::Genuine),
            other => Err(FeatureError::InvalidLabel(other)),
        }
    }
}

impl fmt::Display for PairLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Impostor => write!(f, "impostor"),
            Self::Genuine => write!(f, "genuine"),
        }
    }
}

/// One sample: flattened audio feature, flattened visual feature, and label.
///
/// The exact tensor shape behind each flattened vector belongs to the
/// feature extraction pipeline; only the lengths are checked here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub audio: Vec<f32>,
    pub visual: Vec<f32>,
    pub label: PairLabel,
}

/// Counts and dimensions of a feature file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub total_records: usize,
    pub genuine_count: usize,
    pub impostor_count: usize,
    /// Audio feature length (0 for an empty file).
    pub audio_dim: usize,
    /// Visual feature length (0 for an empty file).
    pub visual_dim: usize,
}

impl FeatureSummary {
    /// Summarize a slice of records.
    pub fn from_records(records: &[FeatureRecord]) -> Self {
        let genuine_count = records.iter().filter(|r| r.label.is_genuine()).count();
        Self {
            total_records: records.len(),
            genuine_count,
            impostor_count: records.len() - genuine_count,
            audio_dim: records.first().map(|r| r.audio.len()).unwrap_or(0),
            visual_dim: records.first().map(|r| r.visual.len()).unwrap_or(0),
        }
    }
}

/// Check that every record shares the first record's audio and visual lengths.
pub fn validate_dimensions(records: &[FeatureRecord]) -> Result<(), FeatureError> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let (audio_dim, visual_dim) = (first.audio.len(), first.visual.len());
    for (row, record) in records.iter().enumerate() {
        if record.audio.len() != audio_dim {
            return Err(FeatureError::DimensionMismatch {
                modality: "audio",
                row,
                expected: audio_dim,
                actual: record.audio.len(),
            });
        }
        if record.visual.len() != visual_dim {
            return Err(FeatureError::DimensionMismatch {
                modality: "visual",
                row,
                expected: visual_dim,
                actual: record.visual.len(),
            });
        }
    }
    Ok(())
}
