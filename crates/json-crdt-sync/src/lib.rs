//! Multi-replica synchronization and edit coordination for json-crdt.
//!
//! Composes the core document model with state vectors, an append-only
//! patch store, broadcast fan-out, peer discovery, and a sync manager
//! façade, plus the optimistic/transactional edit layer on top.

pub mod broadcast;
pub mod edit;
pub mod error;
pub mod manager;
pub mod peer;
pub mod persist;
pub mod state_vector;
pub mod store;
pub mod syncer;

pub use broadcast::{Broadcaster, ChannelBroadcaster, EncodingFormat, Envelope};
pub use edit::{EditError, EditOptions, Editor, LockGuard, LockManager, MemoryLockManager};
pub use error::SyncError;
pub use manager::{SyncManager, SyncOptions};
pub use peer::{
    LocalTransport, PeerDiscovery, PeerId, RegistryDiscovery, StaticPeers, SyncEndpoint, Transport,
};
pub use persist::{DocumentKey, DocumentStore, MemoryDocumentStore};
pub use state_vector::StateVector;
pub use store::{MemoryPatchStore, PatchStore, StoredPatch};
pub use syncer::Syncer;
