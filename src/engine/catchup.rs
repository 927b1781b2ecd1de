use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::EngineError;
use super::processor::{EventProcessor, ProcessingRequest, invoke};
use crate::config::CatchupConfig;
use crate::domain::{
    ExecutionContext, FailingPartitionState, ProcessingPosition, ProcessingResult,
    StreamProcessorId, retry_disabled,
};
use crate::state::PartitionedState;
use crate::storage::EventSource;

/// Where one partition ended up after a catch-up attempt
enum PartitionOutcome {
    CaughtUp,
    StillFailing(FailingPartitionState),
}

/// Replays the backlog of failing partitions, each independently of the others
#[derive(Debug, Clone, Default)]
pub struct CatchupEngine {
    config: CatchupConfig,
}

impl CatchupEngine {
    pub fn new(config: CatchupConfig) -> Self {
        Self { config }
    }

    /// Any failing partition is due for a retry
    pub fn has_work(state: &PartitionedState, now: DateTime<Utc>) -> bool {
        state
            .failing_partitions
            .iter()
            .any(|failing| Self::is_due(failing, state.position, now))
    }

    fn is_due(
        failing: &FailingPartitionState,
        watermark: ProcessingPosition,
        now: DateTime<Utc>,
    ) -> bool {
        failing.can_retry_at(now) && failing.position.stream_position < watermark.stream_position
    }

    /// Runs one catch-up pass over every failing partition due for a retry.
    ///
    /// Partitions that are not due, or have nothing below the watermark, are
    /// returned as the same entries.
    #[allow(clippy::too_many_arguments)]
    pub async fn catchup_for<S, P>(
        &self,
        id: &StreamProcessorId,
        state: &PartitionedState,
        source: &S,
        processor: &P,
        execution_context: &ExecutionContext,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PartitionedState, EngineError>
    where
        S: EventSource + ?Sized,
        P: EventProcessor + ?Sized,
    {
        let mut next = state.clone();

        for failing in state.failing_partitions.iter() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if !Self::is_due(failing, state.position, now) {
                continue;
            }

            debug!(
                processor = %id,
                partition = %failing.partition,
                position = %failing.position,
                attempts = failing.processing_attempts,
                "Catching up failing partition"
            );

            let (outcome, processed_any) = self
                .catchup_partition(
                    failing,
                    state.position,
                    source,
                    processor,
                    execution_context,
                    now,
                    cancel,
                )
                .await?;

            if processed_any {
                next.last_successfully_processed = now;
            }
            next.failing_partitions = match outcome {
                PartitionOutcome::CaughtUp => {
                    info!(processor = %id, partition = %failing.partition, "Partition caught up");
                    next.failing_partitions.without(&failing.partition)
                }
                PartitionOutcome::StillFailing(updated) => {
                    warn!(
                        processor = %id,
                        partition = %updated.partition,
                        position = %updated.position,
                        attempts = updated.processing_attempts,
                        reason = %updated.reason,
                        "Partition is still failing"
                    );
                    next.failing_partitions.with(updated)
                }
            };
        }

        Ok(next)
    }

    #[allow(clippy::too_many_arguments)]
    async fn catchup_partition<S, P>(
        &self,
        failing: &FailingPartitionState,
        watermark: ProcessingPosition,
        source: &S,
        processor: &P,
        execution_context: &ExecutionContext,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<(PartitionOutcome, bool), EngineError>
    where
        S: EventSource + ?Sized,
        P: EventProcessor + ?Sized,
    {
        let partition = &failing.partition;
        let mut current = failing.clone();
        let mut processed_any = false;
        let mut immediate_retries = 0;
        // Only the event the partition is stuck on carries the earlier failure
        let mut retrying = true;

        let Some(mut event) = source
            .fetch_in_partition(
                partition,
                current.position.stream_position,
                watermark.stream_position,
                cancel,
            )
            .await?
        else {
            return Ok((PartitionOutcome::CaughtUp, processed_any));
        };

        loop {
            // Events below a skipped-to log position are not processed
            let below_skip =
                event.position.event_log_position < current.position.event_log_position;
            let result = if below_skip {
                ProcessingResult::Skipped
            } else {
                let request = ProcessingRequest::new(&event, execution_context);
                let request = if retrying {
                    request.retry(&current.reason, current.processing_attempts)
                } else {
                    request
                };
                invoke(processor, request, cancel).await?
            };

            match &result {
                ProcessingResult::Succeeded | ProcessingResult::Skipped => {
                    processed_any |= result == ProcessingResult::Succeeded;
                    let next = source
                        .fetch_in_partition(
                            partition,
                            event.position.stream_position.increment(),
                            watermark.stream_position,
                            cancel,
                        )
                        .await?;
                    match next {
                        None => return Ok((PartitionOutcome::CaughtUp, processed_any)),
                        Some(next) => {
                            current = FailingPartitionState {
                                position: resume_position(&current, next.position),
                                retry_time: now,
                                processing_attempts: 0,
                                ..current
                            };
                            immediate_retries = 0;
                            retrying = false;
                            event = next;
                        }
                    }
                }
                ProcessingResult::Failed { reason, .. }
                    if result.retries_immediately()
                        && immediate_retries < self.config.max_immediate_retries =>
                {
                    immediate_retries += 1;
                    retrying = true;
                    current = FailingPartitionState {
                        position: resume_position(&current, event.position),
                        ..current.with_failure(reason.clone(), now, now)
                    };
                }
                ProcessingResult::Failed { reason, .. } => {
                    // Exhausted immediate retries park the partition until skipped
                    let retry_time = if result.retries_immediately() {
                        retry_disabled()
                    } else {
                        result.retry_time(now)
                    };
                    let updated = FailingPartitionState {
                        position: resume_position(&current, event.position),
                        ..current.with_failure(reason.clone(), retry_time, now)
                    };
                    return Ok((PartitionOutcome::StillFailing(updated), processed_any));
                }
            }
        }
    }
}

/// Moves a failing partition to `position` without losing a skipped-to log position
fn resume_position(
    failing: &FailingPartitionState,
    position: ProcessingPosition,
) -> ProcessingPosition {
    position.with_event_log_position(
        position
            .event_log_position
            .max(failing.position.event_log_position),
    )
}
