pub mod error;
pub mod event;
pub mod ids;
pub mod partition;
pub mod position;
pub mod result;

// Re-export commonly used types
pub use error::DomainError;
pub use event::{CommittedEvent, ExecutionContext, StreamEvent};
pub use ids::{EventProcessorId, PartitionId, ScopeId, StreamId, StreamProcessorId, TenantId};
pub use partition::FailingPartitionState;
pub use position::{EventLogSequenceNumber, ProcessingPosition, StreamPosition};
pub use result::{ProcessingResult, is_retry_disabled, retry_disabled};
