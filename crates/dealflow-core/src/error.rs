use thiserror::Error;

/// Top-level error type for the Dealflow system.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates define
/// their own error types and implement `From<DealflowError>` so that the `?`
/// operator works seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DealflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for DealflowError {
    fn from(err: toml::de::Error) -> Self {
        DealflowError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DealflowError {
    fn from(err: toml::ser::Error) -> Self {
        DealflowError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for DealflowError {
    fn from(err: serde_json::Error) -> Self {
        DealflowError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Dealflow operations.
pub type Result<T> = std::result::Result<T, DealflowError>;
