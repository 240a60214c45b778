//! The synchronization façade tying document, store, broadcast, and peers
//! together.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::timeout;
use tracing::{info, warn};

use json_crdt_core::{Document, Patch};

use crate::broadcast::{Broadcaster, EncodingFormat, Envelope};
use crate::error::SyncError;
use crate::peer::{PeerDiscovery, PeerId, SyncEndpoint, Transport};
use crate::state_vector::StateVector;
use crate::store::PatchStore;
use crate::syncer::Syncer;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Topic patches are broadcast on.
    pub topic: String,
    /// Payload encoding for broadcast envelopes.
    pub encoding: EncodingFormat,
    /// Deadline for any single network-facing call.
    pub network_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            topic: "patches".to_string(),
            encoding: EncodingFormat::Binary,
            network_timeout: Duration::from_secs(5),
        }
    }
}

/// One replica's coordination hub. Local patch application is synchronous
/// and in-memory; broadcast and peer reconciliation happen outside the
/// document lock and never make local apply wait on peer availability.
pub struct SyncManager {
    doc: Arc<RwLock<Document>>,
    syncer: Syncer,
    broadcaster: Arc<dyn Broadcaster>,
    discovery: Arc<dyn PeerDiscovery>,
    transport: Arc<dyn Transport>,
    options: SyncOptions,
}

impl SyncManager {
    pub fn new(
        document: Document,
        store: Arc<dyn PatchStore>,
        broadcaster: Arc<dyn Broadcaster>,
        discovery: Arc<dyn PeerDiscovery>,
        transport: Arc<dyn Transport>,
        options: SyncOptions,
    ) -> Self {
        let doc = Arc::new(RwLock::new(document));
        let state = Arc::new(RwLock::new(StateVector::new()));
        let syncer = Syncer::new(doc.clone(), store, state);
        Self {
            doc,
            syncer,
            broadcaster,
            discovery,
            transport,
            options,
        }
    }

    pub fn document(&self) -> Arc<RwLock<Document>> {
        self.doc.clone()
    }

    /// Materialized view of the local document.
    pub fn view(&self) -> serde_json::Value {
        self.doc.read().view()
    }

    pub fn local_state(&self) -> StateVector {
        self.syncer.local_state()
    }

    /// Applies a patch locally, records it, then broadcasts it. Broadcast
    /// failure is logged and non-fatal: local state has already converged
    /// and propagation retries through normal sync.
    pub async fn apply_patch(&self, patch: &Patch) -> Result<(), SyncError> {
        self.syncer.apply_local(patch).await?;
        self.broadcast(patch).await;
        Ok(())
    }

    /// Records and broadcasts a patch the caller already applied to the
    /// document under its own critical section.
    pub(crate) async fn record_and_broadcast(&self, patch: &Patch) -> Result<(), SyncError> {
        self.syncer.record(patch).await?;
        self.broadcast(patch).await;
        Ok(())
    }

    async fn broadcast(&self, patch: &Patch) {
        let envelope = match Envelope::from_patch(&self.options.topic, patch, self.options.encoding)
        {
            Ok(env) => env,
            Err(err) => {
                warn!(%err, "failed to encode patch for broadcast");
                return;
            }
        };
        let deadline = self.options.network_timeout;
        match timeout(deadline, self.broadcaster.publish(envelope)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%err, "patch broadcast failed"),
            Err(_) => warn!(?deadline, "patch broadcast timed out"),
        }
    }

    /// Handles a broadcast envelope received from another replica. Does not
    /// rebroadcast; peers hear about the patch from its origin.
    pub async fn receive(&self, envelope: &Envelope) -> Result<(), SyncError> {
        if envelope.topic != self.options.topic {
            return Ok(());
        }
        let patch = envelope.decode_patch()?;
        self.syncer.apply_local(&patch).await
    }

    /// Pull reconciliation against one named peer. Returns the number of
    /// patches integrated.
    pub async fn sync_with_peer(&self, peer: &PeerId) -> Result<usize, SyncError> {
        let deadline = self.options.network_timeout;
        let endpoint = timeout(deadline, self.transport.connect(peer))
            .await
            .map_err(|_| SyncError::Timeout(deadline))??;
        let local = self.syncer.local_state();
        let missing = timeout(deadline, endpoint.patches_since(&local))
            .await
            .map_err(|_| SyncError::Timeout(deadline))??;
        let applied = self.syncer.integrate(&missing).await?;
        info!(%peer, applied, "synced with peer");
        Ok(applied)
    }

    /// Reconciles against every discovered peer. A failing peer is logged
    /// and skipped. Returns the total number of patches integrated.
    pub async fn sync_with_all_peers(&self) -> Result<usize, SyncError> {
        let peers = self.discovery.peers().await?;
        let mut total = 0;
        for peer in peers {
            match self.sync_with_peer(&peer).await {
                Ok(applied) => total += applied,
                Err(err) => warn!(%peer, %err, "peer sync failed"),
            }
        }
        Ok(total)
    }
}

#[async_trait]
impl SyncEndpoint for SyncManager {
    async fn state_vector(&self) -> Result<StateVector, SyncError> {
        Ok(self.syncer.local_state())
    }

    async fn patches_since(&self, known: &StateVector) -> Result<Vec<Patch>, SyncError> {
        self.syncer.collect_for(known).await
    }
}
