//! Tensor bridge: conversions between flat `Vec<f32>` feature buffers
//! and burn tensors.
//!
//! Features arrive from Parquet as row-major `Vec<f32>` blocks; the
//! networks need `Tensor<B, 2>` inputs, and the miner and evaluator work
//! on plain `Vec<f32>` scores again.

use burn::prelude::*;
use burn::tensor::TensorData;

/// Build a `(rows, dim)` tensor from a row-major flat buffer.
pub fn rows_to_tensor<B: Backend>(
    flat: &[f32],
    rows: usize,
    dim: usize,
    device: &B::Device,
) -> anyhow::Result<Tensor<B, 2>> {
    if flat.len() != rows * dim {
        anyhow::bail!(
            "Flat buffer has {} values, expected {rows} rows × {dim} = {}",
            flat.len(),
            rows * dim
        );
    }
    Ok(Tensor::from_data(TensorData::new(flat.to_vec(), [rows, dim]), device))
}

/// Labels as a `(batch, 1)` float column (1.0 genuine, 0.0 impostor).
pub fn labels_to_tensor<B: Backend>(labels: &[f32], device: &B::Device) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(labels.to_vec(), [labels.len(), 1]), device)
}

/// Flatten a `(batch, 1)` score column into a `Vec<f32>`.
pub fn column_to_vec<B: Backend>(column: Tensor<B, 2>) -> anyhow::Result<Vec<f32>> {
    let [rows, _] = column.dims();
    column
        .reshape([rows])
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read score tensor: {e:?}"))
}

/// Extract a single f64 scalar from a one-element tensor.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_rows_round_trip() {
        let device = Default::default();
        let flat = vec![1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0];

        let tensor = rows_to_tensor::<TestBackend>(&flat, 2, 3, &device).unwrap();
        assert_eq!(tensor.dims(), [2, 3]);

        let row1: Vec<f32> = tensor
            .slice([1..2, 0..3])
            .reshape([3])
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(row1, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_rows_length_mismatch() {
        let device = Default::default();
        assert!(rows_to_tensor::<TestBackend>(&[1.0, 2.0, 3.0], 2, 2, &device).is_err());
    }

    #[test]
    fn test_column_to_vec() {
        let device = Default::default();
        let labels = labels_to_tensor::<TestBackend>(&[1.0, 0.0, 1.0], &device);
        assert_eq!(labels.dims(), [3, 1]);
        assert_eq!(column_to_vec(labels).unwrap(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_tensor_to_f64() {
        let device = Default::default();
        let t = Tensor::<TestBackend, 1>::from_data(TensorData::from([42.0_f32]), &device);
        assert!((tensor_to_f64(t) - 42.0).abs() < 1e-6);
    }
}
