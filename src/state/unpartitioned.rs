use std::borrow::Cow;

use chrono::{DateTime, Utc};

use crate::domain::{
    EventLogSequenceNumber, ProcessingPosition, ProcessingResult, StreamEvent, is_retry_disabled,
};

/// Progress of a strictly ordered, single-cursor stream processor.
///
/// The position never moves past an unresolved failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpartitionedState {
    pub position: ProcessingPosition,
    pub is_failing: bool,
    pub failure_reason: String,
    pub retry_time: DateTime<Utc>,
    pub processing_attempts: u32,
    pub last_successfully_processed: DateTime<Utc>,
}

impl Default for UnpartitionedState {
    fn default() -> Self {
        Self::initial()
    }
}

impl UnpartitionedState {
    pub fn initial() -> Self {
        Self::at(ProcessingPosition::initial())
    }

    pub fn at(position: ProcessingPosition) -> Self {
        Self {
            position,
            is_failing: false,
            failure_reason: String::new(),
            retry_time: DateTime::<Utc>::default(),
            processing_attempts: 0,
            last_successfully_processed: DateTime::<Utc>::default(),
        }
    }

    /// Applies the outcome of processing the event at `position`
    pub fn with_result(
        &self,
        result: &ProcessingResult,
        event: &StreamEvent,
        now: DateTime<Utc>,
    ) -> Self {
        match result {
            ProcessingResult::Succeeded => Self {
                last_successfully_processed: now,
                ..self.advanced_past(event)
            },
            ProcessingResult::Skipped => self.advanced_past(event),
            ProcessingResult::Failed { reason, .. } => Self {
                position: self.position,
                is_failing: true,
                failure_reason: reason.clone(),
                retry_time: result.retry_time(now),
                processing_attempts: self.processing_attempts.saturating_add(1),
                last_successfully_processed: self.last_successfully_processed,
            },
        }
    }

    fn advanced_past(&self, event: &StreamEvent) -> Self {
        let event_log_position = event.position.event_log_position.increment();
        Self {
            position: self
                .position
                .increment_with_stream()
                .with_event_log_position(event_log_position.max(self.position.event_log_position)),
            is_failing: false,
            failure_reason: String::new(),
            retry_time: self.retry_time,
            processing_attempts: 0,
            last_successfully_processed: self.last_successfully_processed,
        }
    }

    /// Moves the safe resume point forward along the event log axis.
    ///
    /// Returns the same instance when `target` is not ahead of the position.
    pub fn skip_events_before(&self, target: EventLogSequenceNumber) -> Cow<'_, Self> {
        if target <= self.position.event_log_position {
            return Cow::Borrowed(self);
        }
        Cow::Owned(Self {
            position: self.position.with_event_log_position(target),
            is_failing: false,
            failure_reason: String::new(),
            processing_attempts: 0,
            ..self.clone()
        })
    }

    /// The failing event may be processed again
    pub fn can_retry_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_failing || (!is_retry_disabled(self.retry_time) && self.retry_time <= now)
    }
}
