use std::fmt;

use crate::domain::{
    EventProcessorId, PartitionId, ProcessingPosition, ProcessingResult, StreamEvent, TenantId,
};
use crate::engine::ProcessingRequest;

/// Correlates a request with its response on one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owned copy of a [`ProcessingRequest`] sent to a remote processor
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub event: StreamEvent,
    pub partition: PartitionId,
    pub position: ProcessingPosition,
    pub failure_reason: Option<String>,
    pub attempt: u32,
    pub tenant: TenantId,
}

impl From<&ProcessingRequest<'_>> for RemoteRequest {
    fn from(request: &ProcessingRequest<'_>) -> Self {
        Self {
            event: request.event.clone(),
            partition: request.partition.clone(),
            position: request.position,
            failure_reason: request.failure_reason.map(str::to_string),
            attempt: request.attempt,
            tenant: request.execution_context.tenant.clone(),
        }
    }
}

/// Sent by the remote processor
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Register {
        processor: EventProcessorId,
        partitioned: bool,
    },
    Pong {
        sequence: u64,
    },
    Response {
        call_id: CallId,
        result: Result<ProcessingResult, String>,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Pong { .. } => "pong",
            Self::Response { .. } => "response",
        }
    }
}

/// Sent to the remote processor
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    RegistrationAccepted,
    Ping { sequence: u64 },
    Request { call_id: CallId, request: RemoteRequest },
}
