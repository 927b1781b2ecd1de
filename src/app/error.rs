use std::io;
use thiserror::Error;

use crate::domain::DomainError;
use crate::engine::EngineError;
use crate::remote::RemoteError;
use crate::storage::StorageError;
use crate::streaming::ProcessingError;

/// Top-level application errors unifying all layer errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StreamProcessorId, TenantId};

    #[test]
    fn error_display_formats_correctly() {
        assert_eq!(
            AppError::InvalidArguments("too many arguments".to_string()).to_string(),
            "Invalid arguments: too many arguments"
        );
        assert_eq!(
            AppError::from(RemoteError::Closed).to_string(),
            "Remote error: Connection is closed"
        );
    }

    #[test]
    fn io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let app_err = AppError::from(io_err);

        match app_err {
            AppError::Io(_) => {}
            _ => panic!("Expected Io error variant"),
        }
    }

    #[test]
    fn config_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();

        match AppError::from(parse_err) {
            AppError::Config(_) => {}
            _ => panic!("Expected Config error variant"),
        }
    }

    #[test]
    fn processing_error_conversion() {
        let processing_err = ProcessingError::NotRegistered {
            tenant: TenantId::new("tenant"),
            id: StreamProcessorId::new("s", "p", "t"),
        };

        match AppError::from(processing_err) {
            AppError::Processing(ProcessingError::NotRegistered { .. }) => {}
            _ => panic!("Expected Processing error variant"),
        }
    }

    #[test]
    fn storage_error_conversion() {
        match AppError::from(StorageError::Cancelled) {
            AppError::Storage(StorageError::Cancelled) => {}
            _ => panic!("Expected Storage error variant"),
        }
    }
}
