//! Optimizer selection by name.
//!
//! Each burn optimizer is a distinct type; the trainer only needs to step,
//! save and restore, so the chosen one is boxed behind [`PairOptimizer`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{
    AdaGradConfig, AdamConfig, AdamWConfig, GradientsParams, Optimizer, RmsPropConfig, SgdConfig,
};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;

use crate::error::ConfigError;

/// Optimizer algorithms available by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adam,
    AdamW,
    Sgd,
    /// SGD with (non-Nesterov, undampened) momentum.
    Momentum,
    RmsProp,
    AdaGrad,
}

impl FromStr for OptimizerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(Self::Adam),
            "adamw" => Ok(Self::AdamW),
            "sgd" => Ok(Self::Sgd),
            "momentum" => Ok(Self::Momentum),
            "rmsprop" => Ok(Self::RmsProp),
            "adagrad" => Ok(Self::AdaGrad),
            _ => Err(ConfigError::UnknownOptimizer(s.to_string())),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Adam => "adam",
            Self::AdamW => "adamw",
            Self::Sgd => "sgd",
            Self::Momentum => "momentum",
            Self::RmsProp => "rmsprop",
            Self::AdaGrad => "adagrad",
        };
        write!(f, "{name}")
    }
}

/// Configuration for the optimizer. Fields not used by the selected
/// algorithm are ignored.
#[derive(Config, Debug)]
pub struct OptimizerConfig {
    /// One of "adam", "adamw", "sgd", "momentum", "rmsprop", "adagrad".
    #[config(default = "String::from(\"adam\")")]
    pub optimizer: String,
    #[config(default = 0.9)]
    pub adam_beta1: f64,
    #[config(default = 0.999)]
    pub adam_beta2: f64,
    /// Epsilon for adam, adamw, rmsprop and adagrad.
    #[config(default = 1.0)]
    pub opt_epsilon: f64,
    #[config(default = 0.9)]
    pub momentum: f64,
    /// Moving-average decay of squared gradients for rmsprop.
    #[config(default = 0.9)]
    pub rmsprop_decay: f64,
    #[config(default = 0.9)]
    pub rmsprop_momentum: f64,
    /// L2 penalty. 0 disables weight decay.
    #[config(default = 4e-5)]
    pub weight_decay: f64,
    /// Clip the gradient norm to this value when set.
    pub max_grad_norm: Option<f64>,
}

/// The operations the trainer needs from any optimizer.
pub trait PairOptimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    /// Apply one update and return the updated module.
    fn step(&mut self, lr: f64, module: M, grads: GradientsParams) -> M;

    /// Persist optimizer state (moments, accumulators) to `path`.
    fn save(&self, path: &Path) -> anyhow::Result<()>;

    /// Restore optimizer state previously written by [`PairOptimizer::save`].
    fn load(
        self: Box<Self>,
        path: &Path,
        device: &B::Device,
    ) -> anyhow::Result<Box<dyn PairOptimizer<M, B>>>;
}

impl<M, B, O> PairOptimizer<M, B> for O
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + 'static,
    O: Optimizer<M, B> + 'static,
{
    fn step(&mut self, lr: f64, module: M, grads: GradientsParams) -> M {
        Optimizer::step(self, lr, module, grads)
    }

    fn save(&self, path: &Path) -> anyhow::Result<()> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        Recorder::<B>::record(&recorder, self.to_record(), path.to_path_buf())
            .map_err(|e| anyhow::anyhow!("Failed to save optimizer to {}: {e}", path.display()))?;
        Ok(())
    }

    fn load(
        self: Box<Self>,
        path: &Path,
        device: &B::Device,
    ) -> anyhow::Result<Box<dyn PairOptimizer<M, B>>> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let record = Recorder::<B>::load(&recorder, path.to_path_buf(), device)
            .map_err(|e| anyhow::anyhow!("Failed to load optimizer from {}: {e}", path.display()))?;
        Ok(Box::new((*self).load_record(record)))
    }
}

impl OptimizerConfig {
    /// Parse the optimizer name without building anything.
    pub fn kind(&self) -> Result<OptimizerKind, ConfigError> {
        self.optimizer.parse()
    }

    /// Build the selected optimizer for module type `M`.
    pub fn build<B, M>(&self) -> Result<Box<dyn PairOptimizer<M, B>>, ConfigError>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + 'static,
    {
        let kind = self.kind()?;
        let clip = self
            .max_grad_norm
            .map(|norm| GradientClippingConfig::Norm(norm as f32));
        let decay = (self.weight_decay > 0.0)
            .then(|| WeightDecayConfig::new(self.weight_decay as f32));
        let epsilon = self.opt_epsilon as f32;

        let optimizer: Box<dyn PairOptimizer<M, B>> = match kind {
            OptimizerKind::Adam => Box::new(
                AdamConfig::new()
                    .with_beta_1(self.adam_beta1 as f32)
                    .with_beta_2(self.adam_beta2 as f32)
                    .with_epsilon(epsilon)
                    .with_weight_decay(decay)
                    .with_grad_clipping(clip)
                    .init::<B, M>(),
            ),
            OptimizerKind::AdamW => Box::new(
                AdamWConfig::new()
                    .with_beta_1(self.adam_beta1 as f32)
                    .with_beta_2(self.adam_beta2 as f32)
                    .with_epsilon(epsilon)
                    .with_weight_decay(self.weight_decay as f32)
                    .with_grad_clipping(clip)
                    .init::<B, M>(),
            ),
            OptimizerKind::Sgd => Box::new(
                SgdConfig::new()
                    .with_weight_decay(decay)
                    .with_gradient_clipping(clip)
                    .init::<B, M>(),
            ),
            OptimizerKind::Momentum => Box::new(
                SgdConfig::new()
                    .with_weight_decay(decay)
                    .with_momentum(Some(
                        MomentumConfig::new()
                            .with_momentum(self.momentum)
                            .with_dampening(0.0),
                    ))
                    .with_gradient_clipping(clip)
                    .init::<B, M>(),
            ),
            OptimizerKind::RmsProp => Box::new(
                RmsPropConfig::new()
                    .with_alpha(self.rmsprop_decay as f32)
                    .with_momentum(self.rmsprop_momentum as f32)
                    .with_epsilon(epsilon)
                    .with_weight_decay(decay)
                    .with_grad_clipping(clip)
                    .init::<B, M>(),
            ),
            OptimizerKind::AdaGrad => Box::new(
                AdaGradConfig::new()
                    .with_epsilon(epsilon)
                    .with_weight_decay(decay)
                    .with_grad_clipping(clip)
                    .init::<B, M>(),
            ),
        };

        tracing::info!(optimizer = %kind, weight_decay = self.weight_decay, "Built optimizer");
        Ok(optimizer)
    }
}
