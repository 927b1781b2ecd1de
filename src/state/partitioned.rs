use std::borrow::Cow;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::failing_partitions::FailingPartitions;
use crate::domain::{
    EventLogSequenceNumber, FailingPartitionState, PartitionId, ProcessingPosition,
    ProcessingResult, StreamEvent,
};

/// Reason recorded on partitions whose backlog was partially skipped
pub const SKIPPED_OLDER_EVENTS_REASON: &str = "Skipped older events in the partition";

/// Progress of a partitioned stream processor.
///
/// `position` is the scan watermark: how far the raw stream has been read and
/// routed. Partitions that fail lag behind it independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionedState {
    pub position: ProcessingPosition,
    pub failing_partitions: FailingPartitions,
    pub last_successfully_processed: DateTime<Utc>,
}

impl Default for PartitionedState {
    fn default() -> Self {
        Self::initial()
    }
}

impl PartitionedState {
    pub fn initial() -> Self {
        Self::at(ProcessingPosition::initial())
    }

    pub fn at(position: ProcessingPosition) -> Self {
        Self {
            position,
            failing_partitions: FailingPartitions::new(),
            last_successfully_processed: DateTime::<Utc>::default(),
        }
    }

    pub fn with_failing_partitions(self, failing_partitions: FailingPartitions) -> Self {
        Self {
            failing_partitions,
            ..self
        }
    }

    pub fn failing_partition_count(&self) -> usize {
        self.failing_partitions.len()
    }

    pub fn is_failing(&self, partition: &PartitionId) -> bool {
        self.failing_partitions.contains(partition)
    }

    /// Crash-safe resume point: the earliest failing position, or the watermark
    pub fn earliest_processing_position(&self) -> ProcessingPosition {
        self.failing_partitions
            .earliest_position()
            .map_or(self.position, |earliest| earliest.min(self.position))
    }

    /// Applies the outcome of processing one event of one partition.
    ///
    /// The watermark always moves past the event so other partitions are not
    /// blocked by this one.
    pub fn with_result(
        &self,
        result: &ProcessingResult,
        event: &StreamEvent,
        now: DateTime<Utc>,
    ) -> Self {
        let position = self.watermark_after(event);
        match result {
            ProcessingResult::Succeeded => Self {
                position,
                failing_partitions: self.resolved(event),
                last_successfully_processed: now,
            },
            ProcessingResult::Skipped => Self {
                position,
                failing_partitions: self.failing_partitions.clone(),
                last_successfully_processed: self.last_successfully_processed,
            },
            ProcessingResult::Failed { reason, .. } => {
                let retry_time = result.retry_time(now);
                let failing = match self.failing_partitions.get(&event.partition) {
                    Some(existing) => FailingPartitionState {
                        position: existing.position.min(event.position),
                        ..existing.with_failure(reason.clone(), retry_time, now)
                    },
                    None => FailingPartitionState::new(
                        event.partition.clone(),
                        event.position,
                        reason.clone(),
                        retry_time,
                        1,
                        now,
                    ),
                };
                Self {
                    position,
                    failing_partitions: self.failing_partitions.with(failing),
                    last_successfully_processed: self.last_successfully_processed,
                }
            }
        }
    }

    // Each axis only moves forward; a skipped-to log position survives later events
    fn watermark_after(&self, event: &StreamEvent) -> ProcessingPosition {
        let after = ProcessingPosition::after(event);
        ProcessingPosition {
            stream_position: after.stream_position.max(self.position.stream_position),
            event_log_position: after.event_log_position.max(self.position.event_log_position),
        }
    }

    // A failing partition is resolved only when nothing of it lies before this event
    fn resolved(&self, event: &StreamEvent) -> FailingPartitions {
        match self.failing_partitions.get(&event.partition) {
            Some(failing) if failing.position >= event.position => {
                self.failing_partitions.without(&event.partition)
            }
            _ => self.failing_partitions.clone(),
        }
    }

    /// Advances the safe resume point past `target` on the event log axis.
    ///
    /// - at or before the earliest failing position: no-op, same instance
    /// - at or past the watermark: all failing partitions are superseded
    /// - inside the failing window: only older partitions are moved forward
    pub fn skip_events_before(&self, target: EventLogSequenceNumber) -> Cow<'_, Self> {
        let earliest = self
            .failing_partitions
            .earliest_event_log_position()
            .unwrap_or(self.position.event_log_position);
        if target <= earliest {
            return Cow::Borrowed(self);
        }

        if target >= self.position.event_log_position {
            return Cow::Owned(Self {
                position: self.position.with_event_log_position(target),
                failing_partitions: FailingPartitions::new(),
                last_successfully_processed: self.last_successfully_processed,
            });
        }

        let failing_partitions: FailingPartitions = self
            .failing_partitions
            .iter()
            .map(|failing| {
                if failing.position.event_log_position < target {
                    Arc::new(FailingPartitionState {
                        position: failing.position.with_event_log_position(target),
                        reason: SKIPPED_OLDER_EVENTS_REASON.to_string(),
                        processing_attempts: 0,
                        ..FailingPartitionState::clone(failing)
                    })
                } else {
                    Arc::clone(failing)
                }
            })
            .collect();

        Cow::Owned(Self {
            position: self.position,
            failing_partitions,
            last_successfully_processed: self.last_successfully_processed,
        })
    }
}
