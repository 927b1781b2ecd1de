use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::ProcessingError;
use crate::domain::{EventLogSequenceNumber, StreamProcessorId, TenantId};
use crate::state::StreamProcessorState;

/// Lifecycle of a scoped stream processor.
///
/// `Idle` until started, `Running` while the loop is alive, then `Cancelled`
/// or `Faulted`. A stopped loop keeps its terminal status; registering the
/// same processor again starts a fresh instance at `Idle`, which is how a
/// registry slot returns to `Idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorStatus {
    Idle,
    Running,
    Cancelled,
    Faulted(String),
}

impl ProcessorStatus {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Faulted(_))
    }
}

/// Requests served by the processing loop between events
#[derive(Debug)]
pub(crate) enum Command {
    SkipEventsBefore {
        target: EventLogSequenceNumber,
        reply: oneshot::Sender<Result<StreamProcessorState, ProcessingError>>,
    },
}

/// Cloneable remote control for one scoped stream processor
#[derive(Debug, Clone)]
pub struct StreamProcessorControl {
    pub(crate) tenant: TenantId,
    pub(crate) id: StreamProcessorId,
    pub(crate) status: watch::Receiver<ProcessorStatus>,
    pub(crate) commands: mpsc::Sender<Command>,
}

impl StreamProcessorControl {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn id(&self) -> &StreamProcessorId {
        &self.id
    }

    pub fn status(&self) -> ProcessorStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessorStatus> {
        self.status.clone()
    }

    /// Moves the processor's safe resume point past `target`.
    ///
    /// Served by the processing loop, so it never races with event
    /// processing. Returns the state in effect afterwards.
    pub async fn skip_events_before(
        &self,
        target: EventLogSequenceNumber,
    ) -> Result<StreamProcessorState, ProcessingError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::SkipEventsBefore { target, reply })
            .await
            .map_err(|_| ProcessingError::Stopped)?;
        response.await.map_err(|_| ProcessingError::Stopped)?
    }
}

/// A started scoped stream processor
#[derive(Debug)]
pub struct StreamProcessorHandle {
    pub(crate) control: StreamProcessorControl,
    pub(crate) cancel: CancellationToken,
    pub(crate) task: JoinHandle<Result<(), ProcessingError>>,
}

impl StreamProcessorHandle {
    pub fn control(&self) -> StreamProcessorControl {
        self.control.clone()
    }

    pub fn status(&self) -> ProcessorStatus {
        self.control.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessorStatus> {
        self.control.subscribe()
    }

    pub async fn skip_events_before(
        &self,
        target: EventLogSequenceNumber,
    ) -> Result<StreamProcessorState, ProcessingError> {
        self.control.skip_events_before(target).await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the processing loop to end
    pub async fn join(self) -> Result<(), ProcessingError> {
        self.task
            .await
            .map_err(|error| ProcessingError::TaskFailed(error.to_string()))?
    }

    /// Cancels the processor and waits for it to stop
    pub async fn stop(self) -> Result<(), ProcessingError> {
        self.cancel();
        self.join().await
    }
}
