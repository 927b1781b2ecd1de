//! Prelude module for convenient imports
//!
//! Import everything you need with: `use streamkeeper::prelude::*;`

// Domain types
pub use crate::domain::{
    CommittedEvent, DomainError, EventLogSequenceNumber, EventProcessorId, ExecutionContext,
    FailingPartitionState, PartitionId, ProcessingPosition, ProcessingResult, ScopeId, StreamEvent,
    StreamId, StreamPosition, StreamProcessorId, TenantId, is_retry_disabled, retry_disabled,
};

// State types
pub use crate::state::{
    FailingPartitions, PartitionedState, SKIPPED_OLDER_EVENTS_REASON, StreamProcessorState,
    UnpartitionedState,
};

// Configuration
pub use crate::config::{CatchupConfig, ProcessorConfig, RemoteConfig};

// Storage types
pub use crate::storage::{
    EventSource, InMemoryEventLog, InMemoryStateRepository, InMemoryStream, StorageError,
    StoredStreamProcessorState, StreamFilter, StreamProcessorStateRepository,
};

// Engine types
pub use crate::engine::{
    CatchupEngine, EngineError, EventProcessor, FnProcessor, ProcessingRequest, ProcessorError,
    invoke,
};

// Streaming types
pub use crate::streaming::{
    AbortOnError, ErrorPolicy, ProcessingError, ProcessorStatus, RetryOnError,
    ScopedStreamProcessor, StreamProcessorControl, StreamProcessorHandle, StreamProcessors,
};

// Remote types
pub use crate::remote::{
    CallId, ClientMessage, ConnectionState, RemoteError, RemoteProcessor, RemoteRequest,
    ServerMessage,
};

// App types
pub use crate::app::{AppError, CliApp};
