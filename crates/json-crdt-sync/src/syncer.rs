//! Pull-based reconciliation between the local replica and a peer.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use json_crdt_core::{Document, Patch};

use crate::error::SyncError;
use crate::peer::SyncEndpoint;
use crate::state_vector::StateVector;
use crate::store::PatchStore;

/// Applies foreign patches and keeps the state vector and patch store in
/// step with the document. All document access is lock-scoped; nothing here
/// blocks on the network while holding the lock.
pub struct Syncer {
    doc: Arc<RwLock<Document>>,
    store: Arc<dyn PatchStore>,
    state: Arc<RwLock<StateVector>>,
}

impl Syncer {
    pub fn new(
        doc: Arc<RwLock<Document>>,
        store: Arc<dyn PatchStore>,
        state: Arc<RwLock<StateVector>>,
    ) -> Self {
        Self { doc, state, store }
    }

    pub fn local_state(&self) -> StateVector {
        self.state.read().clone()
    }

    /// Patches a peer with knowledge `peer_state` is missing.
    pub async fn collect_for(&self, peer_state: &StateVector) -> Result<Vec<Patch>, SyncError> {
        self.store.patches_since(peer_state).await
    }

    /// Applies one patch to the document and records it. Safe to call with
    /// patches the replica has already seen; the merge rules make the
    /// reapplication a no-op and the store skips the duplicate.
    pub async fn apply_local(&self, patch: &Patch) -> Result<(), SyncError> {
        {
            let mut doc = self.doc.write();
            patch.apply(&mut doc)?;
        }
        self.record(patch).await
    }

    /// Records an already-applied patch in the store and state vector.
    pub async fn record(&self, patch: &Patch) -> Result<(), SyncError> {
        self.state.write().observe_patch(patch);
        self.store.append(patch).await
    }

    /// Integrates a batch of foreign patches in order. Returns how many
    /// were applied; the first failure aborts the batch.
    pub async fn integrate(&self, patches: &[Patch]) -> Result<usize, SyncError> {
        for patch in patches {
            self.apply_local(patch).await?;
        }
        debug!(count = patches.len(), "integrated foreign patches");
        Ok(patches.len())
    }

    /// Full pull cycle against one endpoint: send our state vector, fetch
    /// what we are missing, integrate it.
    pub async fn pull(&self, endpoint: &dyn SyncEndpoint) -> Result<usize, SyncError> {
        let local = self.local_state();
        let missing = endpoint.patches_since(&local).await?;
        self.integrate(&missing).await
    }
}
