//! Peer identity, discovery, and transport resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use json_crdt_core::Patch;

use crate::error::SyncError;
use crate::state_vector::StateVector;

/// Opaque peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The peer-facing reconciliation surface a replica exposes.
#[async_trait]
pub trait SyncEndpoint: Send + Sync {
    /// Summary of everything this replica knows.
    async fn state_vector(&self) -> Result<StateVector, SyncError>;

    /// Patches this replica holds that `known` does not cover.
    async fn patches_since(&self, known: &StateVector) -> Result<Vec<Patch>, SyncError>;
}

/// Resolves a peer id to its reconciliation endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, peer: &PeerId) -> Result<Arc<dyn SyncEndpoint>, SyncError>;
}

/// In-process transport: a registry of endpoints by peer id.
#[derive(Default)]
pub struct LocalTransport {
    endpoints: RwLock<HashMap<PeerId, Arc<dyn SyncEndpoint>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, peer: PeerId, endpoint: Arc<dyn SyncEndpoint>) {
        self.endpoints.write().insert(peer, endpoint);
    }

    pub fn unregister(&self, peer: &PeerId) {
        self.endpoints.write().remove(peer);
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn connect(&self, peer: &PeerId) -> Result<Arc<dyn SyncEndpoint>, SyncError> {
        self.endpoints
            .read()
            .get(peer)
            .cloned()
            .ok_or_else(|| SyncError::UnknownPeer(peer.clone()))
    }
}

/// Maintains the live set of peer identifiers.
#[async_trait]
pub trait PeerDiscovery: Send + Sync {
    async fn peers(&self) -> Result<Vec<PeerId>, SyncError>;
}

/// Fixed peer set, for topologies known up front.
#[derive(Debug, Clone, Default)]
pub struct StaticPeers {
    peers: Vec<PeerId>,
}

impl StaticPeers {
    pub fn new(peers: Vec<PeerId>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl PeerDiscovery for StaticPeers {
    async fn peers(&self) -> Result<Vec<PeerId>, SyncError> {
        Ok(self.peers.clone())
    }
}

/// Shared-registry discovery with heartbeats. A peer that has not
/// heartbeated within the TTL is dropped from the live set.
#[derive(Debug)]
pub struct RegistryDiscovery {
    ttl: Duration,
    seen: RwLock<HashMap<PeerId, Instant>>,
}

impl RegistryDiscovery {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: RwLock::new(HashMap::new()),
        }
    }

    /// Records that `peer` is alive right now.
    pub fn heartbeat(&self, peer: PeerId) {
        self.seen.write().insert(peer, Instant::now());
    }

    pub fn forget(&self, peer: &PeerId) {
        self.seen.write().remove(peer);
    }
}

#[async_trait]
impl PeerDiscovery for RegistryDiscovery {
    async fn peers(&self) -> Result<Vec<PeerId>, SyncError> {
        let ttl = self.ttl;
        let mut seen = self.seen.write();
        seen.retain(|_, last| last.elapsed() <= ttl);
        let mut live: Vec<PeerId> = seen.keys().cloned().collect();
        live.sort();
        Ok(live)
    }
}
