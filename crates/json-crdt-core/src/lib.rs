//! JSON-shaped CRDT engine: document model, patch protocol, and codecs.

pub mod apply;
pub mod clock;
pub mod codec_binary;
pub mod codec_verbose;
pub mod document;
pub mod error;
pub mod node;
pub mod patch;
pub mod patch_builder;
pub mod patch_log;
pub mod value;

pub use clock::{LocalClock, SessionId, Timestamp};
pub use codec_verbose::CodecError;
pub use document::{Document, ROOT_ID};
pub use error::DocError;
pub use node::{Node, NodeKind};
pub use patch::{DelTarget, InsPayload, Op, Patch};
pub use patch_builder::PatchBuilder;
pub use value::NodeValue;

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
