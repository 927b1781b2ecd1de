use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::StorageError;
use super::traits::{StoredStreamProcessorState, StreamProcessorStateRepository};
use crate::domain::{
    FailingPartitionState, PartitionId, ProcessingPosition, ScopeId, StreamProcessorId,
};
use crate::state::{PartitionedState, StreamProcessorState, UnpartitionedState};

/// Stored form of a stream processor state; timestamps are kept in milliseconds
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
enum StateDocument {
    Unpartitioned {
        position: ProcessingPosition,
        failing: bool,
        failure_reason: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        retry_time: DateTime<Utc>,
        processing_attempts: u32,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        last_successfully_processed: DateTime<Utc>,
    },
    Partitioned {
        position: ProcessingPosition,
        failing_partitions: Vec<FailingPartitionDocument>,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        last_successfully_processed: DateTime<Utc>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct FailingPartitionDocument {
    partition: PartitionId,
    position: ProcessingPosition,
    reason: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    retry_time: DateTime<Utc>,
    processing_attempts: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    last_failed: DateTime<Utc>,
}

impl From<&StreamProcessorState> for StateDocument {
    fn from(state: &StreamProcessorState) -> Self {
        match state {
            StreamProcessorState::Unpartitioned(state) => Self::Unpartitioned {
                position: state.position,
                failing: state.is_failing,
                failure_reason: state.failure_reason.clone(),
                retry_time: state.retry_time,
                processing_attempts: state.processing_attempts,
                last_successfully_processed: state.last_successfully_processed,
            },
            StreamProcessorState::Partitioned(state) => Self::Partitioned {
                position: state.position,
                failing_partitions: state
                    .failing_partitions
                    .iter()
                    .map(|failing| FailingPartitionDocument {
                        partition: failing.partition.clone(),
                        position: failing.position,
                        reason: failing.reason.clone(),
                        retry_time: failing.retry_time,
                        processing_attempts: failing.processing_attempts,
                        last_failed: failing.last_failed,
                    })
                    .collect(),
                last_successfully_processed: state.last_successfully_processed,
            },
        }
    }
}

impl From<StateDocument> for StreamProcessorState {
    fn from(document: StateDocument) -> Self {
        match document {
            StateDocument::Unpartitioned {
                position,
                failing,
                failure_reason,
                retry_time,
                processing_attempts,
                last_successfully_processed,
            } => Self::Unpartitioned(UnpartitionedState {
                position,
                is_failing: failing,
                failure_reason,
                retry_time,
                processing_attempts,
                last_successfully_processed,
            }),
            StateDocument::Partitioned {
                position,
                failing_partitions,
                last_successfully_processed,
            } => Self::Partitioned(
                PartitionedState {
                    position,
                    last_successfully_processed,
                    ..PartitionedState::initial()
                }
                .with_failing_partitions(
                    failing_partitions
                        .into_iter()
                        .map(|failing| {
                            FailingPartitionState::new(
                                failing.partition,
                                failing.position,
                                failing.reason,
                                failing.retry_time,
                                failing.processing_attempts,
                                failing.last_failed,
                            )
                        })
                        .collect(),
                ),
            ),
        }
    }
}

/// Concurrent in-memory state repository storing JSON documents
#[derive(Default)]
pub struct InMemoryStateRepository {
    documents: DashMap<StreamProcessorId, String>,
    unavailable: AtomicBool,
}

impl InMemoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: every operation fails while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn check_available(&self, cancel: &CancellationToken) -> Result<(), StorageError> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "state repository is unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StreamProcessorStateRepository for InMemoryStateRepository {
    async fn persist_for_scope(
        &self,
        scope: &ScopeId,
        states: HashMap<StreamProcessorId, StreamProcessorState>,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        self.check_available(cancel)?;

        // Encode everything first so a bad state leaves the scope untouched
        let mut documents = Vec::with_capacity(states.len());
        for (id, state) in states {
            if id.scope != *scope {
                return Err(StorageError::ScopeMismatch {
                    id,
                    scope: scope.clone(),
                });
            }
            let document = serde_json::to_string(&StateDocument::from(&state))?;
            documents.push((id, document));
        }

        debug!(scope = %scope, count = documents.len(), "Persisting stream processor states");
        for (id, document) in documents {
            self.documents.insert(id, document);
        }
        Ok(())
    }

    fn get_for_scope(
        &self,
        scope: &ScopeId,
        cancel: &CancellationToken,
    ) -> BoxStream<'static, Result<StoredStreamProcessorState, StorageError>> {
        if let Err(e) = self.check_available(cancel) {
            return stream::once(async move { Err(e) }).boxed();
        }

        let documents: Vec<(StreamProcessorId, String)> = self
            .documents
            .iter()
            .filter(|entry| entry.key().scope == *scope)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        stream::iter(documents.into_iter().map(
            |(id, document)| -> Result<StoredStreamProcessorState, StorageError> {
                let document: StateDocument = serde_json::from_str(&document)?;
                Ok((id, StreamProcessorState::from(document)))
            },
        ))
        .boxed()
    }
}
