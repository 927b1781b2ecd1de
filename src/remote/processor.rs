use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::ConnectionState;
use super::error::RemoteError;
use super::messages::{CallId, ClientMessage, RemoteRequest, ServerMessage};
use crate::config::RemoteConfig;
use crate::domain::{EventProcessorId, ProcessingResult};
use crate::engine::{EventProcessor, ProcessingRequest, ProcessorError};

type PendingCall = oneshot::Sender<Result<ProcessingResult, String>>;

/// Connection state shared between callers and the dispatcher task
struct Shared {
    identifier: EventProcessorId,
    state: watch::Sender<ConnectionState>,
    pending: DashMap<CallId, PendingCall>,
    outgoing: mpsc::Sender<ServerMessage>,
    closed: CancellationToken,
}

impl Shared {
    fn close(&self, reason: &str) {
        if self.closed.is_cancelled() {
            return;
        }
        info!(processor = %self.identifier, reason, "Closing reverse-call connection");
        self.state.send_modify(|state| *state = state.close());
        self.closed.cancel();
        // Dropping the senders fails every waiting call
        self.pending.clear();
    }
}

/// An event processor living on the other end of a reverse-call connection.
///
/// The remote side connects, registers, and then answers requests; calls are
/// multiplexed by [`CallId`] and the connection is kept alive with pings.
///
/// # Example
/// ```rust,ignore
/// let (to_client, from_server) = mpsc::channel(32);
/// let (to_server, from_client) = mpsc::channel(32);
/// // hand `to_server` / `from_server` to the transport
///
/// let processor =
///     RemoteProcessor::accept(from_client, to_client, RemoteConfig::default(), &cancel).await?;
/// ```
pub struct RemoteProcessor {
    shared: Arc<Shared>,
    partitioned: bool,
    next_call_id: AtomicU64,
    request_timeout: std::time::Duration,
}

impl RemoteProcessor {
    /// Runs the registration handshake and starts dispatching responses
    pub async fn accept(
        mut incoming: mpsc::Receiver<ClientMessage>,
        outgoing: mpsc::Sender<ServerMessage>,
        config: RemoteConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, RemoteError> {
        let mut state = ConnectionState::Connecting;

        let first = tokio::select! {
            _ = cancel.cancelled() => return Err(RemoteError::Closed),
            first = tokio::time::timeout(config.handshake_timeout, incoming.recv()) => first,
        };
        let (identifier, partitioned) = match first {
            Err(_) => return Err(RemoteError::Timeout(config.handshake_timeout)),
            Ok(None) => return Err(RemoteError::Closed),
            Ok(Some(ClientMessage::Register {
                processor,
                partitioned,
            })) => (processor, partitioned),
            Ok(Some(other)) => {
                return Err(RemoteError::UnexpectedMessage {
                    expected: "register",
                    received: other.kind().to_string(),
                });
            }
        };
        state = state.register()?;

        outgoing
            .send(ServerMessage::RegistrationAccepted)
            .await
            .map_err(|_| RemoteError::Closed)?;
        state = state.start_streaming()?;
        info!(processor = %identifier, partitioned, "Remote processor registered");

        let (state, _) = watch::channel(state);
        let shared = Arc::new(Shared {
            identifier,
            state,
            pending: DashMap::new(),
            outgoing,
            closed: cancel.child_token(),
        });
        tokio::spawn(dispatch(Arc::clone(&shared), incoming, config.clone()));

        Ok(Self {
            shared,
            partitioned,
            next_call_id: AtomicU64::new(0),
            request_timeout: config.request_timeout,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn close(&self) {
        self.shared.close("closed by server");
    }

    async fn call(
        &self,
        request: RemoteRequest,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult, RemoteError> {
        if !self.state().is_streaming() {
            return Err(RemoteError::Closed);
        }

        let call_id = CallId(self.next_call_id.fetch_add(1, Ordering::Relaxed));
        let (reply, response) = oneshot::channel();
        self.shared.pending.insert(call_id, reply);
        let _pending = PendingGuard {
            pending: &self.shared.pending,
            call_id,
        };
        // The dispatcher may have closed between the state check and the insert
        if self.shared.closed.is_cancelled() {
            return Err(RemoteError::Closed);
        }

        let sent = self
            .shared
            .outgoing
            .send(ServerMessage::Request { call_id, request })
            .await;
        if sent.is_err() {
            self.shared.close("client went away");
            return Err(RemoteError::Closed);
        }
        debug!(processor = %self.shared.identifier, %call_id, "Sent request");

        tokio::select! {
            _ = cancel.cancelled() => Err(RemoteError::Closed),
            _ = self.shared.closed.cancelled() => Err(RemoteError::Closed),
            _ = tokio::time::sleep(self.request_timeout) => {
                Err(RemoteError::Timeout(self.request_timeout))
            }
            reply = response => match reply {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(reason)) => Err(RemoteError::Remote(reason)),
                Err(_) => Err(RemoteError::Closed),
            },
        }
    }
}

/// Forgets a call once its caller stops waiting, including when the caller is dropped
struct PendingGuard<'a> {
    pending: &'a DashMap<CallId, PendingCall>,
    call_id: CallId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.call_id);
    }
}

impl Drop for RemoteProcessor {
    fn drop(&mut self) {
        self.shared.close("processor dropped");
    }
}

#[async_trait]
impl EventProcessor for RemoteProcessor {
    fn identifier(&self) -> &EventProcessorId {
        &self.shared.identifier
    }

    fn is_partitioned(&self) -> bool {
        self.partitioned
    }

    async fn process(
        &self,
        request: ProcessingRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult, ProcessorError> {
        Ok(self.call(RemoteRequest::from(&request), cancel).await?)
    }
}

/// Routes responses to waiting calls and keeps the connection alive
async fn dispatch(
    shared: Arc<Shared>,
    mut incoming: mpsc::Receiver<ClientMessage>,
    config: RemoteConfig,
) {
    let mut ping = tokio::time::interval(config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_pong = Instant::now();
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            _ = shared.closed.cancelled() => break,
            message = incoming.recv() => match message {
                None => {
                    shared.close("client disconnected");
                    break;
                }
                Some(ClientMessage::Response { call_id, result }) => {
                    match shared.pending.remove(&call_id) {
                        Some((_, reply)) => {
                            let _ = reply.send(result);
                        }
                        None => warn!(
                            processor = %shared.identifier,
                            %call_id,
                            "Response to unknown call"
                        ),
                    }
                }
                Some(ClientMessage::Pong { .. }) => last_pong = Instant::now(),
                Some(ClientMessage::Register { .. }) => {
                    warn!(processor = %shared.identifier, "Client registered twice");
                    shared.close("protocol violation");
                    break;
                }
            },
            _ = ping.tick() => {
                if last_pong.elapsed() > config.ping_timeout {
                    shared.close("client stopped answering pings");
                    break;
                }
                sequence += 1;
                if shared.outgoing.send(ServerMessage::Ping { sequence }).await.is_err() {
                    shared.close("client went away");
                    break;
                }
            }
        }
    }
}
