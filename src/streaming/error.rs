use thiserror::Error;
use tracing::{error, warn};

use crate::domain::{DomainError, StreamProcessorId, TenantId};
use crate::engine::EngineError;
use crate::storage::StorageError;

/// Errors surfaced by scoped stream processors and their registry
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Stream processor {id} is already registered for tenant {tenant}")]
    AlreadyRegistered { tenant: TenantId, id: StreamProcessorId },

    #[error("Stream processor {id} is not registered for tenant {tenant}")]
    NotRegistered { tenant: TenantId, id: StreamProcessorId },

    #[error("Stream processor has stopped")]
    Stopped,

    #[error("Stream processor task failed: {0}")]
    TaskFailed(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl ProcessingError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Engine(error) => error.is_cancelled(),
            Self::Storage(error) => matches!(error, StorageError::Cancelled),
            _ => false,
        }
    }

    /// Failures of the event log or state repository, as opposed to
    /// inconsistent state or misuse
    pub fn is_infrastructure(&self) -> bool {
        match self {
            Self::Storage(error) => !matches!(error, StorageError::Cancelled),
            Self::Engine(EngineError::Storage(error)) => !matches!(error, StorageError::Cancelled),
            _ => false,
        }
    }
}

/// Policy for infrastructure errors hit while a stream processor is running
pub trait ErrorPolicy: Send + Sync {
    /// Return true to keep the processor running and retry after the idle
    /// interval, false to fault it
    fn handle_infrastructure_error(&self, error: &ProcessingError) -> bool;
}

/// Fault the processor on the first infrastructure error
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnError;

impl ErrorPolicy for AbortOnError {
    fn handle_infrastructure_error(&self, error: &ProcessingError) -> bool {
        error!(error = %error, "Infrastructure error, stopping stream processor");
        false
    }
}

/// Keep polling through outages; the persisted state is left as it was
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryOnError;

impl ErrorPolicy for RetryOnError {
    fn handle_infrastructure_error(&self, error: &ProcessingError) -> bool {
        warn!(error = %error, "Infrastructure error, retrying");
        true
    }
}
