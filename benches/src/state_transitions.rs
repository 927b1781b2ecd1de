mod common;

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, BenchmarkId};
use streamkeeper::prelude::*;
use tokio_util::sync::CancellationToken;

/// Success of a healthy partition shares the failing map, so cost should not grow with it
fn bench_with_result_success(c: &mut Criterion) {
    let mut group = c.benchmark_group("with_result_success");

    for num_failing in [10, 1_000, 100_000] {
        let state = common::partitioned_state(num_failing, 1_000_000);
        let event = common::event("healthy", 1_000_000);
        group.bench_with_input(
            BenchmarkId::from_parameter(num_failing),
            &num_failing,
            |b, _| {
                b.iter(|| {
                    black_box(state.with_result(
                        &ProcessingResult::Succeeded,
                        &event,
                        common::now(),
                    ))
                });
            },
        );
    }

    group.finish();
}

/// A new failing partition copies the map once
fn bench_with_result_failure(c: &mut Criterion) {
    let mut group = c.benchmark_group("with_result_failure");

    for num_failing in [10, 1_000, 10_000] {
        let state = common::partitioned_state(num_failing, 1_000_000);
        let event = common::event("new", 1_000_000);
        let result = ProcessingResult::failed("boom");
        group.bench_with_input(
            BenchmarkId::from_parameter(num_failing),
            &num_failing,
            |b, _| {
                b.iter(|| black_box(state.with_result(&result, &event, common::now())));
            },
        );
    }

    group.finish();
}

fn bench_skip_events_before(c: &mut Criterion) {
    let mut group = c.benchmark_group("skip_events_before");

    for num_failing in [10, 1_000, 10_000] {
        let state = common::partitioned_state(num_failing, 1_000_000);
        group.bench_with_input(
            BenchmarkId::new("partial_window", num_failing),
            &num_failing,
            |b, _| {
                b.iter(|| black_box(state.skip_events_before(EventLogSequenceNumber(500_000))));
            },
        );
        group.bench_with_input(
            BenchmarkId::new("noop", num_failing),
            &num_failing,
            |b, _| {
                b.iter(|| black_box(state.skip_events_before(EventLogSequenceNumber(0))));
            },
        );
    }

    group.finish();
}

/// One catch-up pass replaying every failing partition's backlog
fn bench_catchup_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("catchup_pass");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for num_partitions in [1, 10, 100] {
        let log = common::seeded_log(1_000, num_partitions);
        let stream = log.stream(ScopeId::default_scope(), StreamFilter::all(), true);
        let processor = FnProcessor::new("bench", true, |_: &ProcessingRequest<'_>| {
            Ok(ProcessingResult::Succeeded)
        });
        let failing: FailingPartitions = (0..num_partitions)
            .map(|i| {
                FailingPartitionState::new(
                    PartitionId::new(format!("p{i}")),
                    ProcessingPosition::new(i as u64, i as u64),
                    "Something failed",
                    common::now(),
                    1,
                    common::now(),
                )
            })
            .collect();
        let state = PartitionedState::at(ProcessingPosition::new(1_000, 1_000))
            .with_failing_partitions(failing);
        let id = StreamProcessorId::new(ScopeId::default_scope(), "bench", "stream");
        let context = ExecutionContext::for_tenant(TenantId::new("tenant"));
        let engine = CatchupEngine::default();
        let cancel = CancellationToken::new();

        group.bench_with_input(
            BenchmarkId::from_parameter(num_partitions),
            &num_partitions,
            |b, _| {
                b.to_async(&runtime).iter(|| async {
                    black_box(
                        engine
                            .catchup_for(
                                &id,
                                &state,
                                &stream,
                                &processor,
                                &context,
                                common::now(),
                                &cancel,
                            )
                            .await
                            .unwrap(),
                    )
                });
            },
        );
    }

    group.finish();
}

fn bench_repository_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("repository_round_trip");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for num_failing in [0, 100, 1_000] {
        let id = StreamProcessorId::new(ScopeId::default_scope(), "bench", "stream");
        let state = StreamProcessorState::from(common::partitioned_state(num_failing, 100_000));
        let cancel = CancellationToken::new();

        group.bench_with_input(
            BenchmarkId::from_parameter(num_failing),
            &num_failing,
            |b, _| {
                b.to_async(&runtime).iter_batched(
                    || Arc::new(InMemoryStateRepository::new()),
                    |repository| {
                        let (id, state, cancel) = (id.clone(), state.clone(), cancel.clone());
                        async move {
                            repository.persist(&id, &state, &cancel).await.unwrap();
                            black_box(repository.get(&id, &cancel).await.unwrap())
                        }
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_with_result_success,
    bench_with_result_failure,
    bench_skip_events_before,
    bench_catchup_pass,
    bench_repository_round_trip,
);

criterion_main!(benches);
