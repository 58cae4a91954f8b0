//! Error types for storage operations

use std::error::Error;
use std::fmt;

/// Error type for graph storage operations
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Data not found
    NotFound(String),

    /// Item already exists
    AlreadyExists(String),

    /// A write would break referential integrity
    Integrity(String),

    /// Validation error
    Validation(String),

    /// Serialization/deserialization error
    Serialization(String),

    /// Backend-specific error
    Backend(String),

    /// Temporary/transient error
    Temporary(String),

    /// Other error
    Other(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StorageError::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            StorageError::Integrity(msg) => write!(f, "Integrity error: {}", msg),
            StorageError::Validation(msg) => write!(f, "Validation error: {}", msg),
            StorageError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            StorageError::Backend(msg) => write!(f, "Backend error: {}", msg),
            StorageError::Temporary(msg) => write!(f, "Temporary error: {}", msg),
            StorageError::Other(msg) => write!(f, "Other error: {}", msg),
        }
    }
}

impl Error for StorageError {}

/// Convert a JSON error to a storage error
impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
