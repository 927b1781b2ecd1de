use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PartitionId, TenantId};
use super::position::{EventLogSequenceNumber, ProcessingPosition};

/// An event as committed to the event log of a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedEvent {
    pub event_log_sequence_number: EventLogSequenceNumber,
    pub event_source: String,
    pub event_type: String,
    pub content: String,
    pub occurred: DateTime<Utc>,
}

/// An event as seen through a processor's stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub event: CommittedEvent,
    pub position: ProcessingPosition,
    pub partition: PartitionId,
    pub partitioned: bool,
}

impl StreamEvent {
    pub fn new(
        event: CommittedEvent,
        position: ProcessingPosition,
        partition: PartitionId,
        partitioned: bool,
    ) -> Self {
        Self {
            event,
            position,
            partition,
            partitioned,
        }
    }
}

/// Context a processor runs an event under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub tenant: TenantId,
}

impl ExecutionContext {
    pub fn for_tenant(tenant: TenantId) -> Self {
        Self { tenant }
    }
}
