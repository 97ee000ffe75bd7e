//! Training pipeline: feature source, hard-pair mining, losses, optimizer
//! and schedule selection, checkpoints, metrics, and the epoch loop.

pub mod checkpoint;
pub mod data;
pub mod loss;
pub mod metrics;
pub mod mining;
pub mod optim;
pub mod schedule;
pub mod trainer;
