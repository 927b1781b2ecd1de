use std::time::Duration;

use thiserror::Error;

use super::connection::ConnectionState;
use crate::engine::ProcessorError;

/// Errors of a reverse-call connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Cannot {action} while {from}")]
    InvalidTransition {
        from: ConnectionState,
        action: &'static str,
    },

    #[error("Expected {expected} but received {received}")]
    UnexpectedMessage {
        expected: &'static str,
        received: String,
    },

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Connection is closed")]
    Closed,

    #[error("Remote processor failed: {0}")]
    Remote(String),
}

impl From<RemoteError> for ProcessorError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Remote(reason) => ProcessorError::new(reason),
            other => ProcessorError::new(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats_correctly() {
        let err = RemoteError::InvalidTransition {
            from: ConnectionState::Closed,
            action: "register",
        };
        assert_eq!(err.to_string(), "Cannot register while closed");
        assert_eq!(
            RemoteError::Timeout(Duration::from_millis(50)).to_string(),
            "No response within 50ms"
        );
    }

    #[test]
    fn remote_failure_keeps_reason_as_processor_error() {
        let err = ProcessorError::from(RemoteError::Remote("handler threw".to_string()));
        assert_eq!(err, ProcessorError::new("handler threw"));
        assert_eq!(
            ProcessorError::from(RemoteError::Closed),
            ProcessorError::new("Connection is closed")
        );
    }
}
