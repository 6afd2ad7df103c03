//! Error types for Faixa

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaixaError {
    // Dataset location errors
    #[error("Dataset directory {path}: {reason}")]
    Path { path: PathBuf, reason: String },

    // Parser errors
    #[error("Failed to parse {file}: {reason}")]
    Parse { file: String, reason: String },

    // Normalization errors
    #[error("Normalization failed at {context}: {reason}")]
    Normalization { context: String, reason: String },

    // Storage errors
    #[error("Persistence error during {operation}: {reason}")]
    Persistence { operation: String, reason: String },

    // Request validation errors
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FaixaError {
    /// Build a parse error for a file path
    pub fn parse(file: impl Into<String>, reason: impl Into<String>) -> Self {
        FaixaError::Parse { file: file.into(), reason: reason.into() }
    }

    /// Build a persistence error for a named storage operation
    pub fn persistence(operation: impl Into<String>, reason: impl ToString) -> Self {
        FaixaError::Persistence { operation: operation.into(), reason: reason.to_string() }
    }

    /// Build an invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        FaixaError::InvalidParameter { name: name.into(), reason: reason.into() }
    }

    /// Whether the error was caused by the caller's input rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(self, FaixaError::InvalidParameter { .. } | FaixaError::Parse { .. })
    }
}

impl From<serde_json::Error> for FaixaError {
    fn from(err: serde_json::Error) -> Self {
        FaixaError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FaixaError>;
