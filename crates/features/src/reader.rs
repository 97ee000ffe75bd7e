//! Reads FeatureRecords from Parquet files.

use crate::types::{validate_dimensions, FeatureError, FeatureRecord, FeatureSummary, PairLabel};
use arrow::array::*;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::path::{Path, PathBuf};

/// Static methods for reading feature data from Parquet files.
pub struct FeatureReader;

impl FeatureReader {
    /// Read all feature records from a Parquet file.
    pub fn read_all(path: &Path) -> anyhow::Result<Vec<FeatureRecord>> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut records = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;
            let mut batch_records = extract_records_from_batch(&batch)?;
            records.append(&mut batch_records);
        }
        validate_dimensions(&records)?;

        tracing::debug!(
            count = records.len(),
            path = %path.display(),
            "Read feature records"
        );

        Ok(records)
    }

    /// Read feature records from multiple Parquet files on up to `workers` threads.
    ///
    /// Records are concatenated in the order of `paths` regardless of which
    /// thread finished first.
    pub fn read_multiple(paths: &[PathBuf], workers: usize) -> anyhow::Result<Vec<FeatureRecord>> {
        let workers = workers.max(1);
        let mut all_records = Vec::new();

        for chunk in paths.chunks(workers) {
            let results: Vec<anyhow::Result<Vec<FeatureRecord>>> = std::thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|path| scope.spawn(move || Self::read_all(path)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join()
                            .unwrap_or_else(|_| Err(anyhow::anyhow!("Feature reader thread panicked")))
                    })
                    .collect()
            });
            for result in results {
                let mut records = result?;
                all_records.append(&mut records);
            }
        }

        validate_dimensions(&all_records)?;
        tracing::info!(
            files = paths.len(),
            records = all_records.len(),
            workers,
            "Loaded feature files"
        );
        Ok(all_records)
    }

    /// Compute summary statistics from a feature Parquet file.
    pub fn read_summary(path: &Path) -> anyhow::Result<FeatureSummary> {
        let records = Self::read_all(path)?;
        Ok(FeatureSummary::from_records(&records))
    }
}

fn float_rows(column: &ArrayRef, name: &str) -> anyhow::Result<Vec<Vec<f32>>> {
    let lists = column
        .as_any()
        .downcast_ref::<ListArray>()
        .ok_or_else(|| FeatureError::Schema(format!("Column {name} is not ListArray")))?;

    let mut rows = Vec::with_capacity(lists.len());
    for i in 0..lists.len() {
        let values = lists.value(i);
        let floats = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| FeatureError::Schema(format!("Column {name} values are not Float32Array")))?;
        rows.push(floats.values().to_vec());
    }
    Ok(rows)
}

/// Extract feature records from a single Arrow RecordBatch.
fn extract_records_from_batch(batch: &RecordBatch) -> anyhow::Result<Vec<FeatureRecord>> {
    if batch.num_columns() != 3 {
        return Err(FeatureError::Schema(format!(
            "expected 3 columns (audio, visual, label), found {}",
            batch.num_columns()
        ))
        .into());
    }

    let audio = float_rows(batch.column(0), "0 (audio)")?;
    let visual = float_rows(batch.column(1), "1 (visual)")?;
    let labels = batch
        .column(2)
        .as_any()
        .downcast_ref::<UInt8Array>()
        .ok_or_else(|| FeatureError::Schema("Column 2 (label) is not UInt8Array".into()))?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for ((audio, visual), i) in audio.into_iter().zip(visual).zip(0..batch.num_rows()) {
        records.push(FeatureRecord {
            audio,
            visual,
            label: PairLabel::try_from(labels.value(i))?,
        });
    }

    Ok(records)
}
