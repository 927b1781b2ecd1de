use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::TryStreamExt;
use streamkeeper::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

fn scope() -> ScopeId {
    ScopeId::default_scope()
}

fn tenant() -> TenantId {
    TenantId::new("tenant")
}

fn config() -> ProcessorConfig {
    ProcessorConfig::default()
        .with_batch_size(2)
        .with_idle_poll_interval(Duration::from_millis(5))
}

fn seeded_log(sources: &[&str]) -> Arc<InMemoryEventLog> {
    let log = Arc::new(InMemoryEventLog::new());
    for source in sources {
        log.append(&scope(), *source, "created", "{}");
    }
    log
}

async fn wait_for_state<F>(
    repository: &InMemoryStateRepository,
    id: &StreamProcessorId,
    predicate: F,
) -> StreamProcessorState
where
    F: Fn(&StreamProcessorState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(state) = repository.get(id, &CancellationToken::new()).await.unwrap()
                && predicate(&state)
            {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("state was not reached in time")
}

#[tokio::test]
async fn mixed_states_round_trip_through_repository() {
    let repository = InMemoryStateRepository::new();
    let cancel = CancellationToken::new();

    let partitioned_clean = StreamProcessorState::from(PartitionedState {
        last_successfully_processed: millis(1_700_000_000_000),
        ..PartitionedState::at(ProcessingPosition::new(10, 12))
    });
    let failing_partition = FailingPartitionState::new(
        PartitionId::new("order-1"),
        ProcessingPosition::new(3, 4),
        "Something failed",
        millis(1_700_000_050_000),
        2,
        millis(1_700_000_040_000),
    );
    let partitioned_failing = StreamProcessorState::from(
        PartitionedState {
            last_successfully_processed: millis(1_700_000_010_000),
            ..PartitionedState::at(ProcessingPosition::new(20, 25))
        }
        .with_failing_partitions([failing_partition].into_iter().collect()),
    );
    let unpartitioned_clean = StreamProcessorState::from(UnpartitionedState {
        last_successfully_processed: millis(1_700_000_020_000),
        ..UnpartitionedState::at(ProcessingPosition::new(7, 7))
    });
    let unpartitioned_failing = StreamProcessorState::from(UnpartitionedState {
        position: ProcessingPosition::new(5, 9),
        is_failing: true,
        failure_reason: "Something failed".to_string(),
        retry_time: retry_disabled(),
        processing_attempts: 2,
        last_successfully_processed: millis(1_700_000_030_000),
    });

    let states = HashMap::from([
        (StreamProcessorId::new(scope(), "partitioned_clean", "stream"), partitioned_clean),
        (StreamProcessorId::new(scope(), "partitioned_failing", "stream"), partitioned_failing),
        (StreamProcessorId::new(scope(), "unpartitioned_clean", "stream"), unpartitioned_clean),
        (StreamProcessorId::new(scope(), "unpartitioned_failing", "stream"), unpartitioned_failing),
    ]);
    repository
        .persist_for_scope(&scope(), states.clone(), &cancel)
        .await
        .unwrap();

    let loaded: HashMap<StreamProcessorId, StreamProcessorState> = repository
        .get_for_scope(&scope(), &cancel)
        .try_collect::<Vec<_>>()
        .await
        .unwrap()
        .into_iter()
        .collect();

    assert_eq!(loaded, states);
}

#[tokio::test]
async fn stopped_processor_resumes_without_reprocessing() {
    let log = seeded_log(&["a", "b", "c"]);
    let repository = Arc::new(InMemoryStateRepository::new());
    let id = StreamProcessorId::new(scope(), "counter", "stream");
    let seen = Arc::new(Mutex::new(Vec::new()));

    let start = |seen: Arc<Mutex<Vec<u64>>>| {
        let processor = FnProcessor::new("counter", false, move |request: &ProcessingRequest<'_>| {
            seen.lock().unwrap().push(request.position.event_log_position.value());
            Ok(ProcessingResult::Succeeded)
        });
        ScopedStreamProcessor::new(
            tenant(),
            id.clone(),
            Arc::new(log.stream(scope(), StreamFilter::all(), false)),
            Arc::new(processor),
            Arc::clone(&repository),
        )
        .with_config(config())
        .start(CancellationToken::new())
    };

    let first = start(Arc::clone(&seen));
    wait_for_state(&repository, &id, |s| s.position() == ProcessingPosition::new(3, 3)).await;
    first.stop().await.unwrap();

    log.append(&scope(), "d", "created", "{}");
    let second = start(Arc::clone(&seen));
    wait_for_state(&repository, &id, |s| s.position() == ProcessingPosition::new(4, 4)).await;
    second.stop().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn filtered_stream_tracks_both_position_axes() {
    let log = Arc::new(InMemoryEventLog::new());
    for event_type in ["created", "noise", "noise", "created", "noise"] {
        log.append(&scope(), "a", event_type, "{}");
    }
    let repository = Arc::new(InMemoryStateRepository::new());
    let id = StreamProcessorId::new(scope(), "filtered", "created");
    let processor = FnProcessor::new("filtered", false, |_: &ProcessingRequest<'_>| {
        Ok(ProcessingResult::Succeeded)
    });

    let handle = ScopedStreamProcessor::new(
        tenant(),
        id.clone(),
        Arc::new(log.stream(scope(), StreamFilter::by_event_type(&["created"]), false)),
        Arc::new(processor),
        Arc::clone(&repository),
    )
    .with_config(config())
    .start(CancellationToken::new());

    let state = wait_for_state(&repository, &id, |s| {
        s.position().stream_position == StreamPosition(2)
    })
    .await;
    handle.stop().await.unwrap();

    assert_eq!(state.position(), ProcessingPosition::new(2, 4));
}

#[tokio::test]
async fn operator_skip_clears_stuck_partition() {
    let log = seeded_log(&["poison", "healthy", "poison", "healthy", "poison"]);
    let repository = Arc::new(InMemoryStateRepository::new());
    let id = StreamProcessorId::new(scope(), "projector", "stream");
    let healthy = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&healthy);
    let processor = FnProcessor::new("projector", true, move |request: &ProcessingRequest<'_>| {
        if request.partition.as_str() == "poison" {
            return Ok(ProcessingResult::failed("cannot project"));
        }
        recorded.lock().unwrap().push(request.position.stream_position.value());
        Ok(ProcessingResult::Succeeded)
    });

    let processors = StreamProcessors::default();
    processors
        .register(
            ScopedStreamProcessor::new(
                tenant(),
                id.clone(),
                Arc::new(log.stream(scope(), StreamFilter::all(), true)),
                Arc::new(processor),
                Arc::clone(&repository),
            )
            .with_config(config()),
        )
        .unwrap();

    let stuck =
        wait_for_state(&repository, &id, |s| s.position() == ProcessingPosition::new(5, 5)).await;
    let StreamProcessorState::Partitioned(stuck) = stuck else {
        panic!("Expected partitioned state");
    };
    let entry = stuck.failing_partitions.get(&PartitionId::new("poison")).unwrap();
    assert_eq!(entry.position, ProcessingPosition::new(0, 0));
    assert!(is_retry_disabled(entry.retry_time));
    assert_eq!(stuck.earliest_processing_position(), ProcessingPosition::new(0, 0));

    let skipped = processors
        .skip_events_before(&tenant(), &id, EventLogSequenceNumber(5))
        .await
        .unwrap();
    processors.shutdown().await;

    let StreamProcessorState::Partitioned(skipped) = skipped else {
        panic!("Expected partitioned state");
    };
    assert_eq!(skipped.failing_partition_count(), 0);
    assert_eq!(skipped.earliest_processing_position(), ProcessingPosition::new(5, 5));
    assert_eq!(*healthy.lock().unwrap(), vec![1, 3]);
}

#[tokio::test]
async fn duplicate_registration_is_rejected_per_tenant() {
    let log = seeded_log(&["a"]);
    let repository = Arc::new(InMemoryStateRepository::new());
    let id = StreamProcessorId::new(scope(), "projector", "stream");
    let processors = StreamProcessors::default();

    let build = |tenant: TenantId| {
        ScopedStreamProcessor::new(
            tenant,
            id.clone(),
            Arc::new(log.stream(scope(), StreamFilter::all(), false)),
            Arc::new(FnProcessor::new("projector", false, |_: &ProcessingRequest<'_>| {
                Ok(ProcessingResult::Succeeded)
            })),
            Arc::clone(&repository),
        )
        .with_config(config())
    };

    processors.register(build(tenant())).unwrap();
    processors.register(build(TenantId::new("other"))).unwrap();
    let duplicate = processors.register(build(tenant()));

    assert!(matches!(duplicate, Err(ProcessingError::AlreadyRegistered { .. })));
    assert_eq!(processors.len(), 2);
    processors.shutdown().await;
}

#[tokio::test]
async fn remote_processor_drives_a_stream() {
    let (to_client, mut from_server) = mpsc::channel(32);
    let (to_server, from_client) = mpsc::channel(32);
    to_server
        .send(ClientMessage::Register {
            processor: EventProcessorId::new("remote"),
            partitioned: false,
        })
        .await
        .unwrap();

    let handled = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&handled);
    tokio::spawn(async move {
        while let Some(message) = from_server.recv().await {
            let reply = match message {
                ServerMessage::RegistrationAccepted => continue,
                ServerMessage::Ping { sequence } => ClientMessage::Pong { sequence },
                ServerMessage::Request { call_id, request } => {
                    recorded.lock().unwrap().push(request.position.stream_position.value());
                    ClientMessage::Response {
                        call_id,
                        result: Ok(ProcessingResult::Succeeded),
                    }
                }
            };
            if to_server.send(reply).await.is_err() {
                break;
            }
        }
    });

    let cancel = CancellationToken::new();
    let remote = RemoteProcessor::accept(from_client, to_client, RemoteConfig::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(remote.state(), ConnectionState::Streaming);

    let log = seeded_log(&["a", "b", "c"]);
    let repository = Arc::new(InMemoryStateRepository::new());
    let id = StreamProcessorId::new(scope(), "remote", "stream");
    let handle = ScopedStreamProcessor::new(
        tenant(),
        id.clone(),
        Arc::new(log.stream(scope(), StreamFilter::all(), false)),
        Arc::new(remote),
        Arc::clone(&repository),
    )
    .with_config(config())
    .start(cancel.child_token());

    wait_for_state(&repository, &id, |s| s.position() == ProcessingPosition::new(3, 3)).await;
    handle.stop().await.unwrap();
    cancel.cancel();

    assert_eq!(*handled.lock().unwrap(), vec![0, 1, 2]);
}
