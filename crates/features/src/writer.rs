//! Writes FeatureRecords to Parquet files using Arrow.

use crate::types::{validate_dimensions, FeatureRecord};
use arrow::array::*;
use arrow::buffer::OffsetBuffer;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use std::path::PathBuf;
use std::sync::Arc;

/// Arrow schema for feature Parquet files (3 columns).
pub fn feature_schema() -> Schema {
    Schema::new(vec![
        Field::new("audio", float_list_type(), false),
        Field::new("visual", float_list_type(), false),
        Field::new("label", DataType::UInt8, false),
    ])
}

fn float_list_type() -> DataType {
    DataType::List(Arc::new(Field::new("item", DataType::Float32, false)))
}

/// Buffers feature records and writes them to a Parquet file.
pub struct FeatureWriter {
    records: Vec<FeatureRecord>,
    output_path: PathBuf,
}

impl FeatureWriter {
    /// Create a new writer that will write to the given path.
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            records: Vec::new(),
            output_path,
        }
    }

    /// Buffer a single record.
    pub fn record(&mut self, record: FeatureRecord) {
        self.records.push(record);
    }

    /// Buffer multiple records.
    pub fn record_all(&mut self, records: Vec<FeatureRecord>) {
        self.records.extend(records);
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write all buffered records to the Parquet file and return the output path.
    ///
    /// Fails if the buffered records do not share audio/visual dimensions.
    pub fn finish(self) -> anyhow::Result<PathBuf> {
        validate_dimensions(&self.records)?;
        let schema = Arc::new(feature_schema());

        let batch = if self.records.is_empty() {
            RecordBatch::new_empty(schema.clone())
        } else {
            build_record_batch(schema.clone(), &self.records)?
        };

        let file = std::fs::File::create(&self.output_path)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;

        tracing::info!(
            records = self.records.len(),
            path = %self.output_path.display(),
            "Wrote feature Parquet file"
        );

        Ok(self.output_path)
    }
}

fn float_list(rows: impl Iterator<Item = Vec<f32>>) -> ListArray {
    let mut values = Vec::new();
    let mut offsets = vec![0i32];
    for row in rows {
        values.extend_from_slice(&row);
        offsets.push(values.len() as i32);
    }
    ListArray::new(
        Arc::new(Field::new("item", DataType::Float32, false)),
        OffsetBuffer::new(offsets.into()),
        Arc::new(Float32Array::from(values)),
        None,
    )
}

fn build_record_batch(
    schema: Arc<Schema>,
    records: &[FeatureRecord],
) -> anyhow::Result<RecordBatch> {
    let audio = float_list(records.iter().map(|r| r.audio.clone()));
    let visual = float_list(records.iter().map(|r| r.visual.clone()));
    let labels: UInt8Array = records.iter().map(|r| Some(r.label.as_u8())).collect();

    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(audio), Arc::new(visual), Arc::new(labels)],
    )?;
    Ok(batch)
}
