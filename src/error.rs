//! Error types for sqlscribe.

use thiserror::Error;

/// The main error type for sqlscribe operations.
#[derive(Debug, Error)]
pub enum ScribeError {
    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// SSH tunnel could not be established or torn down.
    #[error("Tunnel error: {0}")]
    Tunnel(String),

    /// Database connection failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema introspection failure.
    #[error("Introspection error: {0}")]
    Introspection(String),

    /// Model API failure.
    #[error("Model error: {0}")]
    Model(String),

    /// Query execution error.
    #[error("Execution error: {0}")]
    Execution(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScribeError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a tunnel error.
    pub fn tunnel(message: impl Into<String>) -> Self {
        Self::Tunnel(message.into())
    }
}

/// Result type alias for sqlscribe operations.
pub type ScribeResult<T> = Result<T, ScribeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScribeError::config("OPENAI_API_KEY is not set");
        assert_eq!(
            err.to_string(),
            "Configuration error: OPENAI_API_KEY is not set"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such key file");
        let err: ScribeError = io.into();
        assert!(matches!(err, ScribeError::Io(_)));
    }
}
