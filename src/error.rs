//! Error types for limebag

use thiserror::Error;

/// Result type alias for limebag operations
pub type Result<T> = std::result::Result<T, LimebagError>;

/// Main error type
#[derive(Error, Debug)]
pub enum LimebagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Integrity error: {0}")]
    IntegrityError(String),

    #[error("Oracle error on instance {instance}: {reason}")]
    OracleError { instance: usize, reason: String },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Computation error: {0}")]
    ComputationError(String),
}

impl From<polars::error::PolarsError> for LimebagError {
    fn from(err: polars::error::PolarsError) -> Self {
        LimebagError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for LimebagError {
    fn from(err: serde_json::Error) -> Self {
        LimebagError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for LimebagError {
    fn from(err: ndarray::ShapeError) -> Self {
        LimebagError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
