//! Append-only, range-queryable log of applied patches.

use async_trait::async_trait;
use parking_lot::RwLock;

use json_crdt_core::{patch_log, Patch, SessionId};

use crate::error::SyncError;
use crate::state_vector::StateVector;

/// One stored patch, keyed by the issuing session's counter range.
#[derive(Debug, Clone)]
pub struct StoredPatch {
    pub sid: SessionId,
    pub start: u64,
    pub end: u64,
    pub patch: Patch,
}

/// Durable record of applied patches, replayable to a catching-up peer.
#[async_trait]
pub trait PatchStore: Send + Sync {
    /// Appends a patch. Re-appending a patch with an already-recorded
    /// `(sid, start)` key is a no-op, keeping redelivery harmless.
    async fn append(&self, patch: &Patch) -> Result<(), SyncError>;

    /// All stored patches carrying counters past `known`, in append order.
    async fn patches_since(&self, known: &StateVector) -> Result<Vec<Patch>, SyncError>;

    /// Knowledge summary of everything stored.
    async fn state_vector(&self) -> Result<StateVector, SyncError>;
}

/// In-memory patch store for tests and single-process replicas.
#[derive(Debug, Default)]
pub struct MemoryPatchStore {
    inner: RwLock<MemoryPatchStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryPatchStoreInner {
    log: Vec<StoredPatch>,
    knowledge: StateVector,
}

impl MemoryPatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from a blob produced by `export_log`, skipping
    /// duplicate entries the blob may carry.
    pub fn from_log_blob(blob: &[u8]) -> Result<Self, SyncError> {
        let patches =
            patch_log::decode_log(blob).map_err(|e| SyncError::Store(e.to_string()))?;
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for patch in &patches {
                inner.record(patch)?;
            }
        }
        Ok(store)
    }

    /// Serializes the whole log into one persistable blob, in append order.
    pub fn export_log(&self) -> Result<Vec<u8>, SyncError> {
        let inner = self.inner.read();
        patch_log::encode_log(inner.log.iter().map(|s| &s.patch))
            .map_err(|e| SyncError::Store(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.inner.read().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().log.is_empty()
    }
}

impl MemoryPatchStoreInner {
    fn record(&mut self, patch: &Patch) -> Result<(), SyncError> {
        let id = patch
            .id()
            .ok_or_else(|| SyncError::Store("cannot append an empty patch".to_string()))?;
        if self.log.iter().any(|s| s.sid == id.sid && s.start == id.cnt) {
            return Ok(());
        }
        let end = id.cnt + patch.span().saturating_sub(1);
        self.knowledge.observe_patch(patch);
        self.log.push(StoredPatch {
            sid: id.sid,
            start: id.cnt,
            end,
            patch: patch.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl PatchStore for MemoryPatchStore {
    async fn append(&self, patch: &Patch) -> Result<(), SyncError> {
        self.inner.write().record(patch)
    }

    async fn patches_since(&self, known: &StateVector) -> Result<Vec<Patch>, SyncError> {
        let inner = self.inner.read();
        Ok(inner
            .log
            .iter()
            .filter(|s| !known.covers(s.sid, s.start, s.end))
            .map(|s| s.patch.clone())
            .collect())
    }

    async fn state_vector(&self) -> Result<StateVector, SyncError> {
        Ok(self.inner.read().knowledge.clone())
    }
}
