//! Parquet I/O for paired audio/visual feature data.
//!
//! Provides the record type for one (audio, visual, label) sample, reading
//! and writing them as Parquet files, and the per-element normalization
//! statistics applied before training.

pub mod reader;
pub mod stats;
pub mod types;
pub mod writer;

pub use reader::FeatureReader;
pub use stats::FeatureStats;
pub use types::{FeatureError, FeatureRecord, FeatureSummary, PairLabel};
pub use writer::FeatureWriter;
