use std::fmt;

use serde::{Deserialize, Serialize};

use super::event::StreamEvent;

/// Position of an event within a (possibly filtered) stream
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StreamPosition(pub u64);

impl StreamPosition {
    pub fn value(self) -> u64 {
        self.0
    }

    pub fn increment(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequence number of an event in the unfiltered, globally ordered log of a scope
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventLogSequenceNumber(pub u64);

impl EventLogSequenceNumber {
    pub fn value(self) -> u64 {
        self.0
    }

    pub fn increment(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for EventLogSequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Two-coordinate processing cursor.
///
/// The stream axis counts events consumed from the filtered stream; the event
/// log axis tracks the matching place in the unfiltered log and may jump by
/// more than one per stream event.
///
/// Ordering compares the stream axis first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProcessingPosition {
    pub stream_position: StreamPosition,
    pub event_log_position: EventLogSequenceNumber,
}

impl ProcessingPosition {
    pub fn new(stream_position: u64, event_log_position: u64) -> Self {
        Self {
            stream_position: StreamPosition(stream_position),
            event_log_position: EventLogSequenceNumber(event_log_position),
        }
    }

    /// Start of every stream
    pub fn initial() -> Self {
        Self::default()
    }

    /// Next stream position; the event log axis is resolved separately
    pub fn increment_with_stream(self) -> Self {
        Self {
            stream_position: self.stream_position.increment(),
            event_log_position: self.event_log_position,
        }
    }

    pub fn with_event_log_position(self, event_log_position: EventLogSequenceNumber) -> Self {
        Self {
            stream_position: self.stream_position,
            event_log_position,
        }
    }

    /// Position right after a processed event
    pub fn after(event: &StreamEvent) -> Self {
        event
            .position
            .increment_with_stream()
            .with_event_log_position(event.position.event_log_position.increment())
    }
}

impl fmt::Display for ProcessingPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stream {} / log {}",
            self.stream_position, self.event_log_position
        )
    }
}
