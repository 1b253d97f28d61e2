use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{TimelineError, TimelineResult};
use crate::key::ResourceKey;
use crate::replay::ManifestRevision;

/// Storage for replayed timelines.
///
/// Revisions of one key are appended in order: each append must carry the
/// next sequence number.
pub trait HistoryStore: Send + Sync {
    fn append(&self, key: &ResourceKey, revision: ManifestRevision) -> TimelineResult<()>;

    /// Every revision of `key`, oldest first. Empty for unknown keys.
    fn timeline(&self, key: &ResourceKey) -> TimelineResult<Vec<ManifestRevision>>;

    fn latest(&self, key: &ResourceKey) -> TimelineResult<Option<ManifestRevision>>;

    /// Keys in the order of their first append.
    fn keys(&self) -> TimelineResult<Vec<ResourceKey>>;

    /// Number of revisions stored for `key`.
    fn len(&self, key: &ResourceKey) -> TimelineResult<u64>;
}

/// In-memory history store for replays and tests.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    inner: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    timelines: HashMap<ResourceKey, Vec<ManifestRevision>>,
    order: Vec<ResourceKey>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total revisions across all keys.
    pub fn total_revisions(&self) -> TimelineResult<usize> {
        let state = self.read()?;
        Ok(state.timelines.values().map(Vec::len).sum())
    }

    fn read(&self) -> TimelineResult<RwLockReadGuard<'_, StoreState>> {
        self.inner
            .read()
            .map_err(|_| TimelineError::Store("history store read lock poisoned".into()))
    }

    fn write(&self) -> TimelineResult<RwLockWriteGuard<'_, StoreState>> {
        self.inner
            .write()
            .map_err(|_| TimelineError::Store("history store write lock poisoned".into()))
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn append(&self, key: &ResourceKey, revision: ManifestRevision) -> TimelineResult<()> {
        let mut state = self.write()?;
        let current = state.timelines.get(key).map_or(0, Vec::len);
        let expected_seq = current as u64 + 1;
        if revision.seq != expected_seq {
            return Err(TimelineError::Store(format!(
                "{key}: append out of order; expected seq {expected_seq}, found {}",
                revision.seq
            )));
        }
        if current == 0 {
            state.order.push(key.clone());
        }
        state
            .timelines
            .entry(key.clone())
            .or_default()
            .push(revision);
        Ok(())
    }

    fn timeline(&self, key: &ResourceKey) -> TimelineResult<Vec<ManifestRevision>> {
        let state = self.read()?;
        Ok(state.timelines.get(key).cloned().unwrap_or_default())
    }

    fn latest(&self, key: &ResourceKey) -> TimelineResult<Option<ManifestRevision>> {
        let state = self.read()?;
        Ok(state.timelines.get(key).and_then(|t| t.last()).cloned())
    }

    fn keys(&self) -> TimelineResult<Vec<ResourceKey>> {
        let state = self.read()?;
        Ok(state.order.clone())
    }

    fn len(&self, key: &ResourceKey) -> TimelineResult<u64> {
        let state = self.read()?;
        Ok(state.timelines.get(key).map_or(0, |t| t.len() as u64))
    }
}
