use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{EventLogSequenceNumber, FailingPartitionState, PartitionId, ProcessingPosition};

/// Copy-on-write map of failing partitions.
///
/// Every change yields a new map that shares the untouched entries with the
/// previous one, so callers can tell "nothing changed" by pointer identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailingPartitions {
    entries: Arc<BTreeMap<PartitionId, Arc<FailingPartitionState>>>,
}

impl FailingPartitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, partition: &PartitionId) -> bool {
        self.entries.contains_key(partition)
    }

    pub fn get(&self, partition: &PartitionId) -> Option<&Arc<FailingPartitionState>> {
        self.entries.get(partition)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FailingPartitionState>> + '_ {
        self.entries.values()
    }

    pub fn partitions(&self) -> impl Iterator<Item = &PartitionId> + '_ {
        self.entries.keys()
    }

    /// Copy with one entry inserted or replaced
    pub fn with(&self, state: FailingPartitionState) -> Self {
        self.with_shared(Arc::new(state))
    }

    pub fn with_shared(&self, state: Arc<FailingPartitionState>) -> Self {
        let mut entries = (*self.entries).clone();
        entries.insert(state.partition.clone(), state);
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Copy without the given partition; returns `self` shared when absent
    pub fn without(&self, partition: &PartitionId) -> Self {
        if !self.contains(partition) {
            return self.clone();
        }
        let mut entries = (*self.entries).clone();
        entries.remove(partition);
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Same underlying map
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }

    /// Same entry instance for `partition` in both maps
    pub fn entry_ptr_eq(&self, other: &Self, partition: &PartitionId) -> bool {
        match (self.get(partition), other.get(partition)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Lowest recorded position, stream axis first
    pub fn earliest_position(&self) -> Option<ProcessingPosition> {
        self.iter().map(|state| state.position).min()
    }

    /// Lowest recorded event log position
    pub fn earliest_event_log_position(&self) -> Option<EventLogSequenceNumber> {
        self.iter().map(|state| state.position.event_log_position).min()
    }
}

impl FromIterator<FailingPartitionState> for FailingPartitions {
    fn from_iter<I: IntoIterator<Item = FailingPartitionState>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|state| (state.partition.clone(), Arc::new(state)))
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }
}

impl FromIterator<Arc<FailingPartitionState>> for FailingPartitions {
    fn from_iter<I: IntoIterator<Item = Arc<FailingPartitionState>>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|state| (state.partition.clone(), state))
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }
}
