//! Error taxonomy for synchronization and transport.

use std::time::Duration;

use thiserror::Error;

use json_crdt_core::{CodecError, DocError};

use crate::peer::PeerId;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Document-level failure while applying a patch.
    #[error("document error: {0}")]
    Doc(#[from] DocError),
    /// Patch could not be encoded or decoded for transport.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// Patch store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(String),
    /// Broadcast channel failure.
    #[error("broadcast error: {0}")]
    Broadcast(String),
    /// Peer id could not be resolved to an endpoint.
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),
    /// A network-facing call exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Transport-level failure talking to a peer.
    #[error("transport error: {0}")]
    Transport(String),
}
