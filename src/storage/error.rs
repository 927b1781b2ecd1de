use thiserror::Error;

use crate::domain::{ScopeId, StreamProcessorId};

/// Storage-level errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage operation was cancelled")]
    Cancelled,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Stream processor {id} does not belong to scope {scope}")]
    ScopeMismatch { id: StreamProcessorId, scope: ScopeId },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
