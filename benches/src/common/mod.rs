use chrono::{DateTime, TimeZone, Utc};
use streamkeeper::prelude::*;

pub fn now() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
}

/// Partitioned state with `num_failing` failing partitions "p0".."pn" spread
/// evenly below a watermark at `watermark`
pub fn partitioned_state(num_failing: usize, watermark: u64) -> PartitionedState {
    let step = (watermark / (num_failing as u64 + 1)).max(1);
    let failing: FailingPartitions = (0..num_failing)
        .map(|i| {
            let position = i as u64 * step;
            FailingPartitionState::new(
                PartitionId::new(format!("p{i}")),
                ProcessingPosition::new(position, position),
                "Something failed",
                now(),
                1,
                now(),
            )
        })
        .collect();
    PartitionedState::at(ProcessingPosition::new(watermark, watermark))
        .with_failing_partitions(failing)
}

pub fn event(partition: &str, position: u64) -> StreamEvent {
    StreamEvent::new(
        CommittedEvent {
            event_log_sequence_number: EventLogSequenceNumber(position),
            event_source: partition.to_string(),
            event_type: "created".to_string(),
            content: "{}".to_string(),
            occurred: now(),
        },
        ProcessingPosition::new(position, position),
        PartitionId::new(partition),
        true,
    )
}

/// Log where every `num_partitions`-th event belongs to the same partition
pub fn seeded_log(num_events: usize, num_partitions: usize) -> std::sync::Arc<InMemoryEventLog> {
    let log = std::sync::Arc::new(InMemoryEventLog::new());
    for i in 0..num_events {
        log.append(&ScopeId::default_scope(), format!("p{}", i % num_partitions), "created", "{}");
    }
    log
}
