//! Error taxonomy for document and patch operations.

use thiserror::Error;

use crate::clock::Timestamp;

#[derive(Debug, Error)]
pub enum DocError {
    /// Unrecognized node discriminator in an operation or on the wire.
    #[error("unknown node type: {0}")]
    InvalidNodeType(String),
    /// Malformed operation or unsupported operation/target combination.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// Operation references a node id that is not in the document.
    #[error("node not found: {0}")]
    NodeNotFound(Timestamp),
    /// Unsupported or malformed wire encoding.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
}
