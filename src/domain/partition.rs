use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::PartitionId;
use super::position::ProcessingPosition;
use super::result::is_retry_disabled;

/// Record of stuck work in one partition.
///
/// Immutable: every change produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailingPartitionState {
    pub partition: PartitionId,
    pub position: ProcessingPosition,
    pub reason: String,
    pub retry_time: DateTime<Utc>,
    pub processing_attempts: u32,
    pub last_failed: DateTime<Utc>,
}

impl FailingPartitionState {
    pub fn new(
        partition: PartitionId,
        position: ProcessingPosition,
        reason: impl Into<String>,
        retry_time: DateTime<Utc>,
        processing_attempts: u32,
        last_failed: DateTime<Utc>,
    ) -> Self {
        Self {
            partition,
            position,
            reason: reason.into(),
            retry_time,
            processing_attempts,
            last_failed,
        }
    }

    pub fn with_position(&self, position: ProcessingPosition) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    /// Records another failed attempt
    pub fn with_failure(
        &self,
        reason: impl Into<String>,
        retry_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            reason: reason.into(),
            retry_time,
            processing_attempts: self.processing_attempts.saturating_add(1),
            last_failed: now,
            ..self.clone()
        }
    }

    pub fn can_retry_at(&self, now: DateTime<Utc>) -> bool {
        !is_retry_disabled(self.retry_time) && self.retry_time <= now
    }
}
