use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::error::{EngineError, ProcessorError};
use crate::domain::{
    EventProcessorId, ExecutionContext, PartitionId, ProcessingPosition, ProcessingResult,
    StreamEvent,
};

/// Everything a processor is told about one processing attempt
#[derive(Debug, Clone, Copy)]
pub struct ProcessingRequest<'a> {
    pub event: &'a StreamEvent,
    pub partition: &'a PartitionId,
    pub position: ProcessingPosition,
    /// Reason of the previous failure when this is a retry
    pub failure_reason: Option<&'a str>,
    /// Number of earlier attempts at this event
    pub attempt: u32,
    pub execution_context: &'a ExecutionContext,
}

impl<'a> ProcessingRequest<'a> {
    /// First attempt at an event
    pub fn new(event: &'a StreamEvent, execution_context: &'a ExecutionContext) -> Self {
        Self {
            event,
            partition: &event.partition,
            position: event.position,
            failure_reason: None,
            attempt: 0,
            execution_context,
        }
    }

    /// Another attempt after `attempt` earlier failures
    pub fn retry(mut self, failure_reason: &'a str, attempt: u32) -> Self {
        self.failure_reason = Some(failure_reason);
        self.attempt = attempt;
        self
    }
}

/// The work behind a stream processor: a local function or a remote endpoint
#[async_trait]
pub trait EventProcessor: Send + Sync {
    fn identifier(&self) -> &EventProcessorId;

    fn is_partitioned(&self) -> bool;

    async fn process(
        &self,
        request: ProcessingRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult, ProcessorError>;
}

/// Runs a processor and turns errors and panics into non-retryable failures.
///
/// Only cancellation escapes as an error.
pub async fn invoke<P>(
    processor: &P,
    request: ProcessingRequest<'_>,
    cancel: &CancellationToken,
) -> Result<ProcessingResult, EngineError>
where
    P: EventProcessor + ?Sized,
{
    let position = request.position;
    let call = AssertUnwindSafe(processor.process(request, cancel)).catch_unwind();

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        outcome = call => Ok(match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => {
                warn!(
                    processor = %processor.identifier(),
                    %position,
                    error = %error,
                    "Processor failed"
                );
                ProcessingResult::failed(error.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(
                    processor = %processor.identifier(),
                    %position,
                    panic = %message,
                    "Processor panicked"
                );
                ProcessingResult::failed(message)
            }
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Processor panicked".to_string()
    }
}

/// In-process processor backed by a closure
pub struct FnProcessor<F> {
    identifier: EventProcessorId,
    partitioned: bool,
    handler: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(&ProcessingRequest<'_>) -> Result<ProcessingResult, ProcessorError> + Send + Sync,
{
    pub fn new(identifier: impl Into<EventProcessorId>, partitioned: bool, handler: F) -> Self {
        Self {
            identifier: identifier.into(),
            partitioned,
            handler,
        }
    }
}

#[async_trait]
impl<F> EventProcessor for FnProcessor<F>
where
    F: Fn(&ProcessingRequest<'_>) -> Result<ProcessingResult, ProcessorError> + Send + Sync,
{
    fn identifier(&self) -> &EventProcessorId {
        &self.identifier
    }

    fn is_partitioned(&self) -> bool {
        self.partitioned
    }

    async fn process(
        &self,
        request: ProcessingRequest<'_>,
        _cancel: &CancellationToken,
    ) -> Result<ProcessingResult, ProcessorError> {
        (self.handler)(&request)
    }
}
