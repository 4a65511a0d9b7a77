//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading options or configuring a loader.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    Validation(String),

    #[error("loader is already configured")]
    AlreadyConfigured,

    #[error("loader is not configured")]
    NotConfigured,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ConfigError::Validation("`script_extensions` must not be empty".into());
        assert_eq!(
            err.to_string(),
            "Config validation error: `script_extensions` must not be empty"
        );

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = ConfigError::Io(PathBuf::from("relive.toml"), io);
        assert_eq!(err.to_string(), "IO error when reading `relive.toml`");
        assert!(std::error::Error::source(&err).is_some());
    }
}
