use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::error::ProcessingError;
use super::handle::{ProcessorStatus, StreamProcessorControl, StreamProcessorHandle};
use super::scoped::ScopedStreamProcessor;
use crate::domain::{EventLogSequenceNumber, StreamProcessorId, TenantId};
use crate::engine::EventProcessor;
use crate::state::StreamProcessorState;
use crate::storage::{EventSource, StreamProcessorStateRepository};

type RegistryKey = (TenantId, StreamProcessorId);

/// Running stream processors, one per tenant and stream processor id.
///
/// Every processor runs under a child of the registry's cancellation token,
/// so [`StreamProcessors::shutdown`] stops them all.
pub struct StreamProcessors {
    processors: DashMap<RegistryKey, StreamProcessorHandle>,
    cancel: CancellationToken,
}

impl Default for StreamProcessors {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl StreamProcessors {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            processors: DashMap::new(),
            cancel,
        }
    }

    /// Starts `processor` unless one with the same tenant and id is still running.
    ///
    /// A stopped processor under the same key is replaced.
    pub fn register<S, P, R>(
        &self,
        processor: ScopedStreamProcessor<S, P, R>,
    ) -> Result<StreamProcessorControl, ProcessingError>
    where
        S: EventSource + 'static,
        P: EventProcessor + 'static,
        R: StreamProcessorStateRepository + 'static,
    {
        let key = (processor.tenant().clone(), processor.id().clone());
        match self.processors.entry(key) {
            Entry::Occupied(entry) if !entry.get().is_finished() => {
                let (tenant, id) = entry.key().clone();
                warn!(%tenant, processor = %id, "Stream processor is already registered");
                Err(ProcessingError::AlreadyRegistered { tenant, id })
            }
            Entry::Occupied(mut entry) => {
                let handle = processor.start(self.cancel.child_token());
                let control = handle.control();
                info!(
                    tenant = %entry.key().0,
                    processor = %entry.key().1,
                    "Replacing stopped stream processor"
                );
                entry.insert(handle);
                Ok(control)
            }
            Entry::Vacant(entry) => {
                let handle = processor.start(self.cancel.child_token());
                let control = handle.control();
                info!(
                    tenant = %entry.key().0,
                    processor = %entry.key().1,
                    "Registered stream processor"
                );
                entry.insert(handle);
                Ok(control)
            }
        }
    }

    /// Stops and removes a processor, returning how it ended
    pub async fn unregister(
        &self,
        tenant: &TenantId,
        id: &StreamProcessorId,
    ) -> Result<(), ProcessingError> {
        let Some((_, handle)) = self.processors.remove(&(tenant.clone(), id.clone())) else {
            return Err(ProcessingError::NotRegistered {
                tenant: tenant.clone(),
                id: id.clone(),
            });
        };
        info!(%tenant, processor = %id, "Unregistering stream processor");
        handle.stop().await
    }

    pub fn is_registered(&self, tenant: &TenantId, id: &StreamProcessorId) -> bool {
        self.processors.contains_key(&(tenant.clone(), id.clone()))
    }

    pub fn status(&self, tenant: &TenantId, id: &StreamProcessorId) -> Option<ProcessorStatus> {
        self.control(tenant, id).map(|control| control.status())
    }

    pub fn control(
        &self,
        tenant: &TenantId,
        id: &StreamProcessorId,
    ) -> Option<StreamProcessorControl> {
        self.processors
            .get(&(tenant.clone(), id.clone()))
            .map(|handle| handle.control())
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Skips events of one registered processor, see [`StreamProcessorControl::skip_events_before`]
    pub async fn skip_events_before(
        &self,
        tenant: &TenantId,
        id: &StreamProcessorId,
        target: EventLogSequenceNumber,
    ) -> Result<StreamProcessorState, ProcessingError> {
        let control = self
            .control(tenant, id)
            .ok_or_else(|| ProcessingError::NotRegistered {
                tenant: tenant.clone(),
                id: id.clone(),
            })?;
        control.skip_events_before(target).await
    }

    /// Cancels every processor and waits for all of them to stop.
    ///
    /// Faulted processors are logged; shutdown itself does not fail.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let keys: Vec<RegistryKey> = self
            .processors
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for key in keys {
            if let Some(((tenant, id), handle)) = self.processors.remove(&key)
                && let Err(e) = handle.join().await
            {
                warn!(%tenant, processor = %id, error = %e, "Stream processor ended with an error");
            }
        }
        info!("All stream processors stopped");
    }
}
