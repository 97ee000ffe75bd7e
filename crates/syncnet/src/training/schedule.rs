//! Learning-rate schedules.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;

use crate::error::ConfigError;

/// Which schedule to use, parsed from its configured name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    Fixed,
    Exponential,
    Polynomial,
}

impl FromStr for ScheduleKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            "polynomial" => Ok(Self::Polynomial),
            _ => Err(ConfigError::UnknownSchedule(s.to_string())),
        }
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Exponential => write!(f, "exponential"),
            Self::Polynomial => write!(f, "polynomial"),
        }
    }
}

/// Configuration for the learning-rate schedule.
#[derive(Config, Debug)]
pub struct ScheduleConfig {
    /// One of "fixed", "exponential", "polynomial".
    #[config(default = "String::from(\"exponential\")")]
    pub schedule: String,
    /// Initial learning rate.
    #[config(default = 0.01)]
    pub learning_rate: f64,
    /// Multiplicative decay per `decay_steps` (exponential only).
    #[config(default = 0.94)]
    pub decay_factor: f64,
    /// Epochs between decays; converted to steps using the epoch size.
    #[config(default = 5.0)]
    pub num_epochs_per_decay: f64,
    /// Final learning rate (polynomial only).
    #[config(default = 1e-4)]
    pub end_learning_rate: f64,
}

/// A resolved schedule mapping a global step to a learning rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LrSchedule {
    Fixed {
        lr: f64,
    },
    /// Staircase: `lr · factor^floor(step / decay_steps)`.
    Exponential {
        lr: f64,
        factor: f64,
        decay_steps: usize,
    },
    /// Linear decay to `end_lr` over `decay_steps`, then constant.
    Polynomial {
        lr: f64,
        end_lr: f64,
        decay_steps: usize,
    },
}

/// Steps between decays: `floor(samples_per_epoch / batch_size · epochs_per_decay)`, at least 1.
pub fn decay_steps(samples_per_epoch: usize, batch_size: usize, epochs_per_decay: f64) -> usize {
    let per_epoch = samples_per_epoch as f64 / batch_size.max(1) as f64;
    ((per_epoch * epochs_per_decay).floor() as usize).max(1)
}

impl LrSchedule {
    /// Resolve a schedule for a training set of `samples_per_epoch` samples.
    pub fn from_config(
        config: &ScheduleConfig,
        samples_per_epoch: usize,
        batch_size: usize,
    ) -> Result<Self, ConfigError> {
        if config.learning_rate.is_nan() || config.learning_rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "learning_rate must be positive, got {}",
                config.learning_rate
            )));
        }
        let kind: ScheduleKind = config.schedule.parse()?;
        let decay_steps = decay_steps(samples_per_epoch, batch_size, config.num_epochs_per_decay);

        Ok(match kind {
            ScheduleKind::Fixed => Self::Fixed {
                lr: config.learning_rate,
            },
            ScheduleKind::Exponential => Self::Exponential {
                lr: config.learning_rate,
                factor: config.decay_factor,
                decay_steps,
            },
            ScheduleKind::Polynomial => Self::Polynomial {
                lr: config.learning_rate,
                end_lr: config.end_learning_rate,
                decay_steps,
            },
        })
    }

    /// Learning rate at a global step.
    pub fn lr(&self, step: usize) -> f64 {
        match *self {
            Self::Fixed { lr } => lr,
            Self::Exponential {
                lr,
                factor,
                decay_steps,
            } => lr * factor.powi((step / decay_steps.max(1)) as i32),
            Self::Polynomial {
                lr,
                end_lr,
                decay_steps,
            } => {
                let decay_steps = decay_steps.max(1);
                let progress = step.min(decay_steps) as f64 / decay_steps as f64;
                (lr - end_lr) * (1.0 - progress) + end_lr
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_steps() {
        // 1000 samples / 256 per batch = 3.90625 per epoch × 5 = 19.53 → 19
        assert_eq!(decay_steps(1000, 256, 5.0), 19);
        assert_eq!(decay_steps(10, 256, 5.0), 1);
    }

    #[test]
    fn test_fixed() {
        let s = LrSchedule::from_config(&ScheduleConfig::new().with_schedule("fixed".into()), 100, 10)
            .unwrap();
        assert_eq!(s.lr(0), 0.01);
        assert_eq!(s.lr(10_000), 0.01);
    }

    #[test]
    fn test_exponential_staircase() {
        let config = ScheduleConfig::new()
            .with_learning_rate(1.0)
            .with_decay_factor(0.5)
            .with_num_epochs_per_decay(1.0);
        let s = LrSchedule::from_config(&config, 100, 10).unwrap();
        assert_eq!(s, LrSchedule::Exponential { lr: 1.0, factor: 0.5, decay_steps: 10 });

        assert_eq!(s.lr(0), 1.0);
        assert_eq!(s.lr(9), 1.0);
        assert_eq!(s.lr(10), 0.5);
        assert_eq!(s.lr(25), 0.25);
    }

    #[test]
    fn test_polynomial_linear_then_flat() {
        let config = ScheduleConfig::new()
            .with_schedule("polynomial".into())
            .with_learning_rate(1.0)
            .with_end_learning_rate(0.0)
            .with_num_epochs_per_decay(1.0);
        let s = LrSchedule::from_config(&config, 100, 10).unwrap();

        assert!((s.lr(0) - 1.0).abs() < 1e-12);
        assert!((s.lr(5) - 0.5).abs() < 1e-12);
        assert!(s.lr(10).abs() < 1e-12);
        assert!(s.lr(1_000).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_schedule_fails_fast() {
        let config = ScheduleConfig::new().with_schedule("cosine".into());
        assert_eq!(
            LrSchedule::from_config(&config, 100, 10),
            Err(ConfigError::UnknownSchedule("cosine".into()))
        );
    }

    #[test]
    fn test_non_positive_lr_rejected() {
        let config = ScheduleConfig::new().with_learning_rate(0.0);
        assert!(matches!(
            LrSchedule::from_config(&config, 100, 10),
            Err(ConfigError::Invalid(_))
        ));
    }
}
