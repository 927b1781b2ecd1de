use std::collections::HashMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use super::error::StorageError;
use crate::domain::{PartitionId, ScopeId, StreamEvent, StreamPosition, StreamProcessorId};
use crate::state::StreamProcessorState;

/// Stored stream processor state paired with its id
pub type StoredStreamProcessorState = (StreamProcessorId, StreamProcessorState);

/// Ordered, append-only stream of events a processor reads from
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Up to `max` events starting at stream position `from`
    async fn fetch(
        &self,
        from: StreamPosition,
        max: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<StreamEvent>, StorageError>;

    /// First event of `partition` in `[from, until)`
    async fn fetch_in_partition(
        &self,
        partition: &PartitionId,
        from: StreamPosition,
        until: StreamPosition,
        cancel: &CancellationToken,
    ) -> Result<Option<StreamEvent>, StorageError>;
}

/// Persistence of stream processor states, grouped by scope.
///
/// Implementations must round-trip every field; timestamps may come back
/// truncated to millisecond precision.
#[async_trait]
pub trait StreamProcessorStateRepository: Send + Sync {
    /// Store all given states of one scope
    async fn persist_for_scope(
        &self,
        scope: &ScopeId,
        states: HashMap<StreamProcessorId, StreamProcessorState>,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError>;

    /// All stored states of one scope
    fn get_for_scope(
        &self,
        scope: &ScopeId,
        cancel: &CancellationToken,
    ) -> BoxStream<'static, Result<StoredStreamProcessorState, StorageError>>;

    async fn persist(
        &self,
        id: &StreamProcessorId,
        state: &StreamProcessorState,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        let states = HashMap::from([(id.clone(), state.clone())]);
        self.persist_for_scope(&id.scope, states, cancel).await
    }

    async fn get(
        &self,
        id: &StreamProcessorId,
        cancel: &CancellationToken,
    ) -> Result<Option<StreamProcessorState>, StorageError> {
        let mut stored = self.get_for_scope(&id.scope, cancel);
        while let Some((stored_id, state)) = stored.try_next().await? {
            if stored_id == *id {
                return Ok(Some(state));
            }
        }
        Ok(None)
    }
}
