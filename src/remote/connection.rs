use std::fmt;

use super::error::RemoteError;

/// Lifecycle of a reverse-call connection.
///
/// `Connecting → Registered → Streaming → Closed`; closing is allowed from
/// any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Registered,
    Streaming,
    Closed,
}

impl ConnectionState {
    /// Client identified itself
    pub fn register(self) -> Result<Self, RemoteError> {
        match self {
            Self::Connecting => Ok(Self::Registered),
            from => Err(RemoteError::InvalidTransition {
                from,
                action: "register",
            }),
        }
    }

    /// Registration was accepted and requests may flow
    pub fn start_streaming(self) -> Result<Self, RemoteError> {
        match self {
            Self::Registered => Ok(Self::Streaming),
            from => Err(RemoteError::InvalidTransition {
                from,
                action: "start streaming",
            }),
        }
    }

    pub fn close(self) -> Self {
        Self::Closed
    }

    pub fn is_streaming(self) -> bool {
        self == Self::Streaming
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Registered => "registered",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
