//! Error types for the WAL, snapshots and journal

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// A failed durable write or recovery step
///
/// Callers treat every variant the same way: the operation did not happen
/// and in-memory state must stay untouched.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid persistence configuration: {0}")]
    Config(String),

    /// A WAL entry whose checksum does not match its operation
    #[error("Journal corrupted: {0}")]
    Corruption(String),

    /// Backend used before `initialize`, or after shutdown
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Storage refused the write; nothing was recorded
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
