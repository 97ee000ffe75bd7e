//! Configuration errors raised at startup.

/// A configuration value that cannot be honored.
///
/// Selectors are parsed once before training starts; an unknown name is
/// always an error, never a silent fallback to a default.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown optimizer '{0}' (expected one of: adam, adamw, sgd, momentum, rmsprop, adagrad)")]
    UnknownOptimizer(String),

    #[error("Unknown learning rate schedule '{0}' (expected one of: fixed, exponential, polynomial)")]
    UnknownSchedule(String),

    #[error("Unknown empty class policy '{0}' (expected one of: keep_none, keep_all, sentinel)")]
    UnknownEmptyClassPolicy(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_value() {
        let err = ConfigError::UnknownOptimizer("adadelta".into());
        assert!(err.to_string().contains("'adadelta'"));
        let err = ConfigError::UnknownSchedule("cosine".into());
        assert!(err.to_string().contains("'cosine'"));
    }
}
