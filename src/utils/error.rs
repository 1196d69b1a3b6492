//! Error types for the experiment library.
//!
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Main error type for experiment operations
#[derive(Error, Debug)]
pub enum ExperimentError {
    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model operations
    #[error("Model error: {0}")]
    Model(String),

    /// The oracle could not answer a query
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience Result type for experiment operations
pub type Result<T> = std::result::Result<T, ExperimentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExperimentError::Dataset("pool is empty".to_string());
        assert_eq!(format!("{}", err), "Dataset error: pool is empty");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ExperimentError = io.into();
        assert!(matches!(err, ExperimentError::Io(_)));
    }
}
