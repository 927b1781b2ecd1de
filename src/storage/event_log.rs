use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::error::StorageError;
use super::traits::EventSource;
use crate::domain::{
    CommittedEvent, EventLogSequenceNumber, PartitionId, ProcessingPosition, ScopeId, StreamEvent,
    StreamPosition,
};

/// Predicate selecting the events of a filtered stream
#[derive(Clone)]
pub struct StreamFilter(Arc<dyn Fn(&CommittedEvent) -> bool + Send + Sync>);

impl StreamFilter {
    /// Every event of the log
    pub fn all() -> Self {
        Self(Arc::new(|_| true))
    }

    pub fn by_event_type(event_types: &[&str]) -> Self {
        let event_types: Vec<String> = event_types.iter().map(|t| t.to_string()).collect();
        Self(Arc::new(move |event| {
            event_types.iter().any(|t| *t == event.event_type)
        }))
    }

    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&CommittedEvent) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    fn matches(&self, event: &CommittedEvent) -> bool {
        (self.0)(event)
    }
}

impl fmt::Debug for StreamFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamFilter")
    }
}

/// Concurrent in-memory event log, one ordered log per scope
#[derive(Default)]
pub struct InMemoryEventLog {
    scopes: DashMap<ScopeId, Vec<CommittedEvent>>,
    unavailable: AtomicBool,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its sequence number in the scope's log
    pub fn append(
        &self,
        scope: &ScopeId,
        event_source: impl Into<String>,
        event_type: impl Into<String>,
        content: impl Into<String>,
    ) -> EventLogSequenceNumber {
        let mut log = self.scopes.entry(scope.clone()).or_default();
        let sequence_number = EventLogSequenceNumber(log.len() as u64);
        log.push(CommittedEvent {
            event_log_sequence_number: sequence_number,
            event_source: event_source.into(),
            event_type: event_type.into(),
            content: content.into(),
            occurred: Utc::now(),
        });
        sequence_number
    }

    /// Next sequence number to be assigned in the scope
    pub fn next_sequence_number(&self, scope: &ScopeId) -> EventLogSequenceNumber {
        let len = self.scopes.get(scope).map_or(0, |log| log.len());
        EventLogSequenceNumber(len as u64)
    }

    /// Simulates an outage: every fetch fails while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Filtered view of a scope's log
    pub fn stream(
        self: &Arc<Self>,
        scope: ScopeId,
        filter: StreamFilter,
        partitioned: bool,
    ) -> InMemoryStream {
        InMemoryStream {
            log: Arc::clone(self),
            scope,
            filter,
            partitioned,
        }
    }

    fn check_available(&self, cancel: &CancellationToken) -> Result<(), StorageError> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("event log is unavailable".to_string()));
        }
        Ok(())
    }
}

/// A filtered stream over an [`InMemoryEventLog`].
///
/// Partitioned streams partition by event source.
#[derive(Clone)]
pub struct InMemoryStream {
    log: Arc<InMemoryEventLog>,
    scope: ScopeId,
    filter: StreamFilter,
    partitioned: bool,
}

impl InMemoryStream {
    /// Events of the stream with their stream positions, borrowed from the scope's log
    fn positioned<'a>(
        &'a self,
        log: &'a [CommittedEvent],
    ) -> impl Iterator<Item = (StreamPosition, &'a CommittedEvent)> + 'a {
        log.iter()
            .filter(move |event| self.filter.matches(event))
            .enumerate()
            .map(|(index, event)| (StreamPosition(index as u64), event))
    }

    fn in_partition(&self, event: &CommittedEvent, partition: &PartitionId) -> bool {
        if self.partitioned {
            partition.as_str() == event.event_source
        } else {
            *partition == PartitionId::none()
        }
    }

    fn stream_event(&self, stream_position: StreamPosition, event: &CommittedEvent) -> StreamEvent {
        let partition = if self.partitioned {
            PartitionId::new(event.event_source.clone())
        } else {
            PartitionId::none()
        };
        StreamEvent::new(
            event.clone(),
            ProcessingPosition {
                stream_position,
                event_log_position: event.event_log_sequence_number,
            },
            partition,
            self.partitioned,
        )
    }
}

#[async_trait]
impl EventSource for InMemoryStream {
    async fn fetch(
        &self,
        from: StreamPosition,
        max: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<StreamEvent>, StorageError> {
        self.log.check_available(cancel)?;
        let Some(log) = self.log.scopes.get(&self.scope) else {
            return Ok(Vec::new());
        };
        Ok(self
            .positioned(&log)
            .skip_while(|(position, _)| *position < from)
            .take(max)
            .map(|(position, event)| self.stream_event(position, event))
            .collect())
    }

    async fn fetch_in_partition(
        &self,
        partition: &PartitionId,
        from: StreamPosition,
        until: StreamPosition,
        cancel: &CancellationToken,
    ) -> Result<Option<StreamEvent>, StorageError> {
        self.log.check_available(cancel)?;
        let Some(log) = self.log.scopes.get(&self.scope) else {
            return Ok(None);
        };
        Ok(self
            .positioned(&log)
            .skip_while(|(position, _)| *position < from)
            .take_while(|(position, _)| *position < until)
            .find(|(_, event)| self.in_partition(event, partition))
            .map(|(position, event)| self.stream_event(position, event)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Arc<InMemoryEventLog> {
        let log = Arc::new(InMemoryEventLog::new());
        let scope = ScopeId::default_scope();
        log.append(&scope, "a", "created", "{}");
        log.append(&scope, "b", "ignored", "{}");
        log.append(&scope, "b", "created", "{}");
        log.append(&scope, "a", "updated", "{}");
        log
    }

    #[tokio::test]
    async fn filtered_stream_has_dense_stream_positions() {
        let log = seeded();
        let stream = log.stream(
            ScopeId::default_scope(),
            StreamFilter::by_event_type(&["created", "updated"]),
            true,
        );

        let events = stream
            .fetch(StreamPosition(0), 10, &CancellationToken::new())
            .await
            .unwrap();

        let positions: Vec<_> = events.iter().map(|e| e.position).collect();
        assert_eq!(
            positions,
            vec![
                ProcessingPosition::new(0, 0),
                ProcessingPosition::new(1, 2),
                ProcessingPosition::new(2, 3),
            ]
        );
        assert_eq!(events[1].partition, PartitionId::new("b"));
    }

    #[tokio::test]
    async fn fetch_respects_start_and_batch_size() {
        let log = seeded();
        let stream = log.stream(ScopeId::default_scope(), StreamFilter::all(), false);

        let events = stream
            .fetch(StreamPosition(1), 2, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].position, ProcessingPosition::new(1, 1));
        assert_eq!(events[0].partition, PartitionId::none());
    }

    #[tokio::test]
    async fn fetch_in_partition_stays_below_until() {
        let log = seeded();
        let stream = log.stream(ScopeId::default_scope(), StreamFilter::all(), true);
        let cancel = CancellationToken::new();
        let a = PartitionId::new("a");

        let found = stream
            .fetch_in_partition(&a, StreamPosition(1), StreamPosition(4), &cancel)
            .await
            .unwrap();
        assert_eq!(found.map(|e| e.position), Some(ProcessingPosition::new(3, 3)));

        let none = stream
            .fetch_in_partition(&a, StreamPosition(1), StreamPosition(3), &cancel)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn fetch_past_the_end_is_empty() {
        let log = seeded();
        let stream = log.stream(ScopeId::default_scope(), StreamFilter::all(), true);
        let cancel = CancellationToken::new();

        let events = stream.fetch(StreamPosition(u64::MAX), 10, &cancel).await.unwrap();
        assert!(events.is_empty());

        let found = stream
            .fetch_in_partition(
                &PartitionId::new("a"),
                StreamPosition(u64::MAX),
                StreamPosition(u64::MAX),
                &cancel,
            )
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn unknown_scope_and_partition_have_no_events() {
        let log = seeded();
        let cancel = CancellationToken::new();
        let empty = log.stream(ScopeId::new("other"), StreamFilter::all(), true);
        assert!(empty.fetch(StreamPosition(0), 10, &cancel).await.unwrap().is_empty());

        let unpartitioned = log.stream(ScopeId::default_scope(), StreamFilter::all(), false);
        let found = unpartitioned
            .fetch_in_partition(
                &PartitionId::new("a"),
                StreamPosition(0),
                StreamPosition(4),
                &cancel,
            )
            .await
            .unwrap();
        assert!(found.is_none());

        let first = unpartitioned
            .fetch_in_partition(&PartitionId::none(), StreamPosition(2), StreamPosition(4), &cancel)
            .await
            .unwrap();
        assert_eq!(first.map(|e| e.position), Some(ProcessingPosition::new(2, 2)));
    }

    #[tokio::test]
    async fn unavailable_log_fails_fetches() {
        let log = seeded();
        let stream = log.stream(ScopeId::default_scope(), StreamFilter::all(), false);
        log.set_unavailable(true);

        let result = stream
            .fetch(StreamPosition(0), 1, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }

    #[test]
    fn append_assigns_sequence_numbers_per_scope() {
        let log = InMemoryEventLog::new();
        let other = ScopeId::new("other");

        assert_eq!(log.append(&ScopeId::default_scope(), "a", "t", ""), EventLogSequenceNumber(0));
        assert_eq!(log.append(&other, "a", "t", ""), EventLogSequenceNumber(0));
        assert_eq!(log.append(&ScopeId::default_scope(), "a", "t", ""), EventLogSequenceNumber(1));
        assert_eq!(log.next_sequence_number(&ScopeId::default_scope()), EventLogSequenceNumber(2));
    }
}
