use thiserror::Error;

use crate::domain::DomainError;
use crate::storage::StorageError;

/// Error raised by an event processor while handling an event.
///
/// Never escapes the processing boundary; it becomes a failed result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ProcessorError(pub String);

impl ProcessorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Engine-level errors for processing passes
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Processing was cancelled")]
    Cancelled,

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Storage(StorageError::Cancelled)
        )
    }
}
