//! Error types for the herald-store crate.

use std::io;

use thiserror::Error;

use crate::RecordId;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed (file read/write/rename).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Record not found.
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    /// A record with this id is already stored.
    #[error("Record already exists: {0}")]
    AlreadyExists(RecordId),

    /// Store directory validation failed.
    #[error("Store validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The store refused the write because it is full.
    #[error("Store capacity exceeded: {len}/{capacity} records")]
    CapacityExceeded { len: usize, capacity: usize },

    /// The store cannot currently be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Internal error (lock poisoning, task failure, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The stored record does not carry the id its filename claims.
    #[error("Corrupted record: {0}")]
    Corrupted(String),
}

/// Store directory validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Store path is not a directory: {0}")]
    NotDirectory(String),

    #[error("Store path cannot contain '..' components: {0}")]
    ParentDirectory(String),

    #[error("Store path must be absolute: {0}")]
    NotAbsolute(String),

    #[error("Store path cannot be in system directory {prefix}: {path}")]
    SystemDirectory { prefix: String, path: String },

    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<bincode::error::EncodeError> for StoreError {
    fn from(e: bincode::error::EncodeError) -> Self {
        Self::Serialization(SerializationError::Encode(e))
    }
}

impl From<bincode::error::DecodeError> for StoreError {
    fn from(e: bincode::error::DecodeError) -> Self {
        Self::Serialization(SerializationError::Decode(e))
    }
}

impl StoreError {
    /// Whether the error means the backing medium could not be reached at all,
    /// as opposed to a problem with one particular record.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }
}
