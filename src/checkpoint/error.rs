//! Checkpoint error types.

use thiserror::Error;

/// Errors raised while writing or restoring a [`StoreCheckpoint`](super::StoreCheckpoint).
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Encoding to JSON or bincode failed
    #[error("checkpoint serialization failed: {0}")]
    SerializationFailed(String),

    /// Decoding from JSON or bincode failed
    #[error("checkpoint deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("unsupported checkpoint version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The snapshot is internally inconsistent (e.g. orphaned history)
    #[error("checkpoint validation failed: {0}")]
    ValidationFailed(String),
}
