//! Persisted progress of stream processors and the pure transitions over it.
//!
//! All transitions take a snapshot by reference and return a new snapshot;
//! nothing here performs I/O.

pub mod failing_partitions;
pub mod partitioned;
pub mod unpartitioned;

use std::borrow::Cow;

pub use failing_partitions::FailingPartitions;
pub use partitioned::{PartitionedState, SKIPPED_OLDER_EVENTS_REASON};
pub use unpartitioned::UnpartitionedState;

use crate::domain::{EventLogSequenceNumber, ProcessingPosition};

/// Persisted state of one stream processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamProcessorState {
    Unpartitioned(UnpartitionedState),
    Partitioned(PartitionedState),
}

impl StreamProcessorState {
    /// State of a freshly registered processor
    pub fn initial(partitioned: bool) -> Self {
        if partitioned {
            Self::Partitioned(PartitionedState::initial())
        } else {
            Self::Unpartitioned(UnpartitionedState::initial())
        }
    }

    pub fn is_partitioned(&self) -> bool {
        matches!(self, Self::Partitioned(_))
    }

    pub fn position(&self) -> ProcessingPosition {
        match self {
            Self::Unpartitioned(state) => state.position,
            Self::Partitioned(state) => state.position,
        }
    }

    pub fn earliest_processing_position(&self) -> ProcessingPosition {
        match self {
            Self::Unpartitioned(state) => state.position,
            Self::Partitioned(state) => state.earliest_processing_position(),
        }
    }

    pub fn skip_events_before(&self, target: EventLogSequenceNumber) -> Cow<'_, Self> {
        match self {
            Self::Unpartitioned(state) => match state.skip_events_before(target) {
                Cow::Borrowed(_) => Cow::Borrowed(self),
                Cow::Owned(skipped) => Cow::Owned(Self::Unpartitioned(skipped)),
            },
            Self::Partitioned(state) => match state.skip_events_before(target) {
                Cow::Borrowed(_) => Cow::Borrowed(self),
                Cow::Owned(skipped) => Cow::Owned(Self::Partitioned(skipped)),
            },
        }
    }
}

impl From<UnpartitionedState> for StreamProcessorState {
    fn from(state: UnpartitionedState) -> Self {
        Self::Unpartitioned(state)
    }
}

impl From<PartitionedState> for StreamProcessorState {
    fn from(state: PartitionedState) -> Self {
        Self::Partitioned(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_matches_partitioning() {
        assert!(StreamProcessorState::initial(true).is_partitioned());
        assert!(!StreamProcessorState::initial(false).is_partitioned());
        assert_eq!(
            StreamProcessorState::initial(true).position(),
            ProcessingPosition::initial()
        );
    }

    #[test]
    fn noop_skip_returns_same_enum_instance() {
        let state =
            StreamProcessorState::from(UnpartitionedState::at(ProcessingPosition::new(2, 9)));
        let skipped = state.skip_events_before(EventLogSequenceNumber(4));
        assert!(std::ptr::eq(skipped.as_ref(), &state));
    }

    #[test]
    fn skip_wraps_new_state() {
        let state = StreamProcessorState::from(PartitionedState::at(ProcessingPosition::new(2, 9)));
        let skipped = state.skip_events_before(EventLogSequenceNumber(12)).into_owned();
        assert_eq!(skipped.position(), ProcessingPosition::new(2, 12));
        assert!(skipped.is_partitioned());
    }
}
