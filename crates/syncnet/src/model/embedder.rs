use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Smallest norm an embedding is divided by when normalizing.
const NORM_EPS: f32 = 1e-12;

/// Configuration for one embedding stream.
///
/// Maps a flattened feature vector (d_input) to a fixed-length embedding
/// via a 3-layer ReLU MLP with dropout.
///
/// ```text
/// (batch, d_input)
///   → Linear(d_input→d_hidden1) → ReLU → Dropout   [end point "hidden1"]
///   → Linear(d_hidden1→d_hidden2) → ReLU → Dropout [end point "hidden2"]
///   → Linear(d_hidden2→d_embed)
///   → optional row-wise L2 normalization
///   → embedding: (batch, d_embed)
/// ```
#[derive(Config, Debug)]
pub struct EmbeddingNetConfig {
    /// Flattened feature length of this modality.
    pub d_input: usize,
    #[config(default = 256)]
    pub d_hidden1: usize,
    #[config(default = 128)]
    pub d_hidden2: usize,
    /// Output embedding dimension.
    #[config(default = 64)]
    pub d_embed: usize,
    /// Dropout probability applied after each ReLU.
    #[config(default = 0.1)]
    pub dropout: f64,
    /// Scale each embedding to unit L2 norm.
    #[config(default = false)]
    pub normalize: bool,
}

/// One stream of the two-stream model.
#[derive(Module, Debug)]
pub struct EmbeddingNet<B: Backend> {
    linear1: Linear<B>,
    linear2: Linear<B>,
    linear3: Linear<B>,
    dropout1: Dropout,
    dropout2: Dropout,
    normalize: bool,
}

/// Output of an embedding stream: the embedding plus named hidden activations.
#[derive(Debug, Clone)]
pub struct Embedded<B: Backend> {
    pub embedding: Tensor<B, 2>,
    pub end_points: Vec<(&'static str, Tensor<B, 2>)>,
}

impl EmbeddingNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> EmbeddingNet<B> {
        EmbeddingNet {
            linear1: LinearConfig::new(self.d_input, self.d_hidden1).init(device),
            linear2: LinearConfig::new(self.d_hidden1, self.d_hidden2).init(device),
            linear3: LinearConfig::new(self.d_hidden2, self.d_embed).init(device),
            dropout1: DropoutConfig::new(self.dropout).init(),
            dropout2: DropoutConfig::new(self.dropout).init(),
            normalize: self.normalize,
        }
    }
}

impl<B: Backend> EmbeddingNet<B> {
    /// Embed a batch of flattened features.
    ///
    /// Dropout is active only on an autodiff backend; call through
    /// `AutodiffModule::valid()` for inference-mode embeddings.
    pub fn forward(&self, x: Tensor<B, 2>) -> Embedded<B> {
        let h1 = relu(self.linear1.forward(x));
        let x = self.dropout1.forward(h1.clone());

        let h2 = relu(self.linear2.forward(x));
        let x = self.dropout2.forward(h2.clone());

        let mut embedding = self.linear3.forward(x);
        if self.normalize {
            // Clamp before the sqrt so a zero row has a finite gradient
            let norm = embedding
                .clone()
                .powf_scalar(2.0)
                .sum_dim(1)
                .clamp_min(NORM_EPS * NORM_EPS)
                .sqrt();
            embedding = embedding / norm;
        }

        Embedded {
            embedding,
            end_points: vec![("hidden1", h1), ("hidden2", h2)],
        }
    }
}

/// Fraction of exactly-zero activations per end point.
///
/// A value near 1.0 means most ReLU units in that layer are dead.
pub fn activation_sparsity<B: Backend>(end_points: &[(&'static str, Tensor<B, 2>)]) -> Vec<(&'static str, f64)> {
    end_points
        .iter()
        .map(|(name, t)| {
            let total = t.shape().num_elements().max(1) as f64;
            let zeros: f64 = t
                .clone()
                .equal_elem(0.0)
                .int()
                .sum()
                .into_scalar()
                .elem();
            (*name, zeros / total)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::module::Param;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn small(d_input: usize) -> EmbeddingNetConfig {
        EmbeddingNetConfig::new(d_input)
            .with_d_hidden1(16)
            .with_d_hidden2(8)
            .with_d_embed(4)
            .with_dropout(0.0)
    }

    #[test]
    fn test_forward_shape_and_end_points() {
        let device = Default::default();
        let net = small(12).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 2>::random([3, 12], Distribution::Normal(0.0, 1.0), &device);

        let out = net.forward(x);
        assert_eq!(out.embedding.dims(), [3, 4]);
        let names: Vec<&str> = out.end_points.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["hidden1", "hidden2"]);
        assert_eq!(out.end_points[0].1.dims(), [3, 16]);
        assert_eq!(out.end_points[1].1.dims(), [3, 8]);
    }

    #[test]
    fn test_normalized_embeddings_have_unit_norm() {
        let device = Default::default();
        let net = small(12).with_normalize(true).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 2>::random([5, 12], Distribution::Normal(0.0, 1.0), &device);

        let norms: Vec<f32> = net
            .forward(x)
            .embedding
            .powf_scalar(2.0)
            .sum_dim(1)
            .sqrt()
            .into_data()
            .to_vec()
            .unwrap();
        for n in norms {
            assert!((n - 1.0).abs() < 1e-4, "expected unit norm, got {n}");
        }
    }

    #[test]
    fn test_zero_embedding_gradient_is_finite() {
        let device = Default::default();
        let mut net = EmbeddingNetConfig::new(3)
            .with_d_hidden1(4)
            .with_d_hidden2(4)
            .with_d_embed(2)
            .with_dropout(0.0)
            .with_normalize(true)
            .init::<TestAutodiffBackend>(&device);
        // Every row embeds to exactly zero
        net.linear3.weight = Param::from_tensor(Tensor::zeros([4, 2], &device));
        net.linear3.bias = Some(Param::from_tensor(Tensor::zeros([2], &device)));

        let x = Tensor::<TestAutodiffBackend, 2>::ones([1, 3], &device).require_grad();
        let out = net.forward(x.clone());
        let embedding: Vec<f32> = out.embedding.clone().into_data().to_vec().unwrap();
        assert!(embedding.iter().all(|v| *v == 0.0));

        let grads = out.embedding.sum().backward();
        let grad: Vec<f32> = x.grad(&grads).unwrap().into_data().to_vec().unwrap();
        assert!(grad.iter().all(|g| g.is_finite()), "gradient has NaN/Inf: {grad:?}");
    }

    #[test]
    fn test_activation_sparsity() {
        let device = Default::default();
        let t = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[0.0_f32, 1.0], [0.0, 0.0]]),
            &device,
        );
        let sparsity = activation_sparsity(&[("hidden1", t)]);
        assert_eq!(sparsity.len(), 1);
        assert_eq!(sparsity[0].0, "hidden1");
        assert!((sparsity[0].1 - 0.75).abs() < 1e-9);
    }
}
