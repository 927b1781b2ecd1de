use thiserror::Error;

use super::ids::StreamProcessorId;

/// Domain-level errors representing inconsistent processing state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Persisted state of {0} is unpartitioned but the processor is partitioned")]
    ExpectedPartitionedState(StreamProcessorId),

    #[error("Persisted state of {0} is partitioned but the processor is unpartitioned")]
    ExpectedUnpartitionedState(StreamProcessorId),
}
