use std::borrow::Cow;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::error::{AbortOnError, ErrorPolicy, ProcessingError};
use super::handle::{Command, ProcessorStatus, StreamProcessorControl, StreamProcessorHandle};
use crate::config::ProcessorConfig;
use crate::domain::{
    DomainError, ExecutionContext, ProcessingPosition, ProcessingResult, StreamEvent,
    StreamProcessorId, TenantId,
};
use crate::engine::{CatchupEngine, EventProcessor, ProcessingRequest, invoke};
use crate::state::{PartitionedState, StreamProcessorState, UnpartitionedState};
use crate::storage::{EventSource, StreamProcessorStateRepository};

const COMMAND_BUFFER: usize = 16;

/// Drives one event processor over one stream for one tenant.
///
/// Owns the processor's state: it is loaded once, every transition is
/// persisted before the loop moves on, and administrative commands are
/// served between events.
///
/// # Example
/// ```rust,ignore
/// let processor = ScopedStreamProcessor::new(tenant, id, source, handler, repository)
///     .with_config(ProcessorConfig::default().with_batch_size(50))
///     .with_error_policy(RetryOnError);
///
/// let handle = processor.start(cancel.child_token());
/// ```
pub struct ScopedStreamProcessor<S, P, R> {
    tenant: TenantId,
    id: StreamProcessorId,
    source: Arc<S>,
    processor: Arc<P>,
    repository: Arc<R>,
    config: ProcessorConfig,
    catchup: CatchupEngine,
    error_policy: Arc<dyn ErrorPolicy>,
    context: ExecutionContext,
    status: watch::Sender<ProcessorStatus>,
    commands: mpsc::Receiver<Command>,
    command_sender: mpsc::Sender<Command>,
}

impl<S, P, R> ScopedStreamProcessor<S, P, R>
where
    S: EventSource + 'static,
    P: EventProcessor + 'static,
    R: StreamProcessorStateRepository + 'static,
{
    pub fn new(
        tenant: TenantId,
        id: StreamProcessorId,
        source: Arc<S>,
        processor: Arc<P>,
        repository: Arc<R>,
    ) -> Self {
        let (status, _) = watch::channel(ProcessorStatus::Idle);
        let (command_sender, commands) = mpsc::channel(COMMAND_BUFFER);
        let config = ProcessorConfig::default();
        Self {
            context: ExecutionContext::for_tenant(tenant.clone()),
            tenant,
            id,
            source,
            processor,
            repository,
            catchup: CatchupEngine::new(config.catchup.clone()),
            config,
            error_policy: Arc::new(AbortOnError),
            status,
            commands,
            command_sender,
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.catchup = CatchupEngine::new(config.catchup.clone());
        self.config = config;
        self
    }

    /// Set how infrastructure errors are handled (defaults to AbortOnError)
    pub fn with_error_policy(mut self, policy: impl ErrorPolicy + 'static) -> Self {
        self.error_policy = Arc::new(policy);
        self
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn id(&self) -> &StreamProcessorId {
        &self.id
    }

    pub fn control(&self) -> StreamProcessorControl {
        StreamProcessorControl {
            tenant: self.tenant.clone(),
            id: self.id.clone(),
            status: self.status.subscribe(),
            commands: self.command_sender.clone(),
        }
    }

    /// Spawns the processing loop onto the runtime
    pub fn start(self, cancel: CancellationToken) -> StreamProcessorHandle {
        let control = self.control();
        let task = tokio::spawn(self.run(cancel.clone()));
        StreamProcessorHandle {
            control,
            cancel,
            task,
        }
    }

    /// Runs until cancelled or faulted.
    ///
    /// Cancellation is a clean stop and returns `Ok`.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ProcessingError> {
        let span = info_span!("stream_processor", tenant = %self.tenant, processor = %self.id);
        async move {
            self.status.send_replace(ProcessorStatus::Running);
            info!(partitioned = self.processor.is_partitioned(), "Stream processor started");

            match self.process(&cancel).await {
                Ok(()) => {
                    info!("Stream processor stopped");
                    self.status.send_replace(ProcessorStatus::Cancelled);
                    Ok(())
                }
                Err(e) if e.is_cancelled() => {
                    info!("Stream processor stopped");
                    self.status.send_replace(ProcessorStatus::Cancelled);
                    Ok(())
                }
                Err(e) => {
                    error!(error = %e, "Stream processor faulted");
                    self.status.send_replace(ProcessorStatus::Faulted(e.to_string()));
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn process(&mut self, cancel: &CancellationToken) -> Result<(), ProcessingError> {
        // None until loaded, and again after an error so the persisted state is reloaded
        let mut state: Option<StreamProcessorState> = None;

        while !cancel.is_cancelled() {
            match self.advance(&mut state, cancel).await {
                Ok(true) => {}
                Ok(false) => self.wait(&mut state, cancel).await?,
                Err(e)
                    if e.is_infrastructure() && self.error_policy.handle_infrastructure_error(&e) =>
                {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.config.idle_poll_interval) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// One step of work; false when there was nothing to do
    async fn advance(
        &mut self,
        state: &mut Option<StreamProcessorState>,
        cancel: &CancellationToken,
    ) -> Result<bool, ProcessingError> {
        let mut current = match state.take() {
            Some(current) => current,
            None => self.load_state(cancel).await?,
        };
        while let Ok(command) = self.commands.try_recv() {
            current = self.handle_command(command, current, cancel).await?;
        }

        let next = match &current {
            StreamProcessorState::Unpartitioned(unpartitioned) => {
                self.step_unpartitioned(unpartitioned, cancel).await?
            }
            StreamProcessorState::Partitioned(partitioned) => {
                self.step_partitioned(partitioned, cancel).await?
            }
        };
        let progressed = next.is_some();
        *state = Some(next.unwrap_or(current));
        Ok(progressed)
    }

    /// Sleeps for the idle interval, waking early for commands
    async fn wait(
        &mut self,
        state: &mut Option<StreamProcessorState>,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessingError> {
        let command = tokio::select! {
            _ = cancel.cancelled() => None,
            _ = tokio::time::sleep(self.config.idle_poll_interval) => None,
            command = self.commands.recv() => command,
        };
        if let Some(command) = command {
            let current = match state.take() {
                Some(current) => current,
                None => self.load_state(cancel).await?,
            };
            *state = Some(self.handle_command(command, current, cancel).await?);
        }
        Ok(())
    }

    async fn load_state(
        &self,
        cancel: &CancellationToken,
    ) -> Result<StreamProcessorState, ProcessingError> {
        let partitioned = self.processor.is_partitioned();
        match self.repository.get(&self.id, cancel).await? {
            Some(state) if state.is_partitioned() == partitioned => {
                info!(position = %state.position(), "Resuming from persisted state");
                Ok(state)
            }
            Some(_) if partitioned => {
                Err(DomainError::ExpectedPartitionedState(self.id.clone()).into())
            }
            Some(_) => Err(DomainError::ExpectedUnpartitionedState(self.id.clone()).into()),
            None => {
                let state = StreamProcessorState::initial(partitioned);
                self.persist(&state, cancel).await?;
                info!("Starting from the beginning of the stream");
                Ok(state)
            }
        }
    }

    async fn handle_command(
        &self,
        command: Command,
        current: StreamProcessorState,
        cancel: &CancellationToken,
    ) -> Result<StreamProcessorState, ProcessingError> {
        match command {
            Command::SkipEventsBefore { target, reply } => {
                let skipped = match current.skip_events_before(target) {
                    Cow::Borrowed(_) => None,
                    Cow::Owned(skipped) => Some(skipped),
                };
                let Some(skipped) = skipped else {
                    debug!(%target, "Nothing to skip");
                    let _ = reply.send(Ok(current.clone()));
                    return Ok(current);
                };

                if let Err(e) = self.persist(&skipped, cancel).await {
                    let _ = reply.send(Err(ProcessingError::CommandFailed(e.to_string())));
                    return Err(e);
                }
                info!(%target, position = %skipped.position(), "Skipped events");
                let _ = reply.send(Ok(skipped.clone()));
                Ok(skipped)
            }
        }
    }

    async fn step_unpartitioned(
        &self,
        state: &UnpartitionedState,
        cancel: &CancellationToken,
    ) -> Result<Option<StreamProcessorState>, ProcessingError> {
        if !state.can_retry_at(Utc::now()) {
            return Ok(None);
        }
        let Some(event) = self
            .source
            .fetch(state.position.stream_position, 1, cancel)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };

        let result = if is_skipped(&event, state.position) {
            ProcessingResult::Skipped
        } else {
            let mut request = ProcessingRequest::new(&event, &self.context);
            if state.is_failing {
                request = request.retry(&state.failure_reason, state.processing_attempts);
            }
            invoke(&*self.processor, request, cancel).await?
        };
        log_failure(&result, &event);

        let next = StreamProcessorState::from(state.with_result(&result, &event, Utc::now()));
        self.persist(&next, cancel).await?;
        Ok(Some(next))
    }

    async fn step_partitioned(
        &self,
        state: &PartitionedState,
        cancel: &CancellationToken,
    ) -> Result<Option<StreamProcessorState>, ProcessingError> {
        let now = Utc::now();
        if CatchupEngine::has_work(state, now) {
            let caught_up = self
                .catchup
                .catchup_for(
                    &self.id,
                    state,
                    &*self.source,
                    &*self.processor,
                    &self.context,
                    now,
                    cancel,
                )
                .await?;
            let next = StreamProcessorState::from(caught_up);
            self.persist(&next, cancel).await?;
            return Ok(Some(next));
        }

        let events = self
            .source
            .fetch(state.position.stream_position, self.config.batch_size, cancel)
            .await?;
        if events.is_empty() {
            return Ok(None);
        }

        let mut next = state.clone();
        for event in &events {
            if cancel.is_cancelled() {
                break;
            }
            // Events of failing partitions stay behind as backlog for catch-up
            let result = if is_skipped(event, next.position) || next.is_failing(&event.partition) {
                ProcessingResult::Skipped
            } else {
                let request = ProcessingRequest::new(event, &self.context);
                invoke(&*self.processor, request, cancel).await?
            };
            log_failure(&result, event);

            next = next.with_result(&result, event, Utc::now());
            self.persist(&StreamProcessorState::from(next.clone()), cancel)
                .await?;
        }
        debug!(
            position = %next.position,
            failing = next.failing_partition_count(),
            "Processed batch"
        );
        Ok(Some(StreamProcessorState::from(next)))
    }

    async fn persist(
        &self,
        state: &StreamProcessorState,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessingError> {
        self.repository.persist(&self.id, state, cancel).await?;
        Ok(())
    }
}

/// The event lies before a skipped-to event log position
fn is_skipped(event: &StreamEvent, position: ProcessingPosition) -> bool {
    event.position.event_log_position < position.event_log_position
}

fn log_failure(result: &ProcessingResult, event: &StreamEvent) {
    if let ProcessingResult::Failed {
        reason, retryable, ..
    } = result
    {
        warn!(
            partition = %event.partition,
            position = %event.position,
            reason = %reason,
            retryable = *retryable,
            "Event processing failed"
        );
    }
}
