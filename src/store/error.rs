//! Store error types.

use crate::core::Interrupted;
use thiserror::Error;

/// Errors reported by a [`Store`](super::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No durable record exists for the machine id
    #[error("machine '{0}' not found")]
    NotFound(String),

    /// A durable record already exists for the machine id
    #[error("machine '{0}' already exists")]
    AlreadyExists(String),

    /// The caller's context was cancelled or timed out
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    /// The transaction was already committed or rolled back
    #[error("transaction already finished")]
    TransactionFinished,

    /// Any other backend failure
    #[error("storage backend error: {0}")]
    Backend(String),

    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Whether the machine record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether a record with this machine id already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Whether the context was cancelled or timed out.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}
