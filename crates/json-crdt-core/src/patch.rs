//! Patches: ordered batches of operations from a single session.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::Timestamp;
use crate::document::Document;
use crate::error::DocError;
use crate::node::NodeKind;
use crate::value::NodeValue;

/// Payload of an `Ins` operation, shaped by the target node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InsPayload {
    /// Write the register of a `val` node.
    Val(NodeValue),
    /// Set one or more keys of an `obj` node.
    Obj(Vec<(String, NodeValue)>),
    /// Set one or more indexed slots of a `vec` node.
    Vec(Vec<(u64, NodeValue)>),
    /// Splice text into a `str` node after the anchor element.
    Str { after: Timestamp, text: String },
    /// Splice values into an `arr` node after the anchor element.
    Arr {
        after: Timestamp,
        values: Vec<NodeValue>,
    },
    /// Splice bytes into a `bin` node after the anchor element.
    Bin { after: Timestamp, data: Vec<u8> },
}

/// Target of a `Del` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DelTarget {
    /// Tombstone one key of an `obj` node.
    Key(String),
    /// Tombstone one slot of a `vec` node.
    Index(u64),
    /// Tombstone a contiguous id range of an RGA node.
    Range { start: Timestamp, end: Timestamp },
    /// Clear the register of a `val` node.
    Node,
}

/// One CRDT operation. `id` is the operation's own timestamp; structural
/// operations additionally name the node they mutate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Create a node. `value` is required for `con` nodes and ignored for
    /// the container kinds.
    New {
        id: Timestamp,
        kind: NodeKind,
        value: Option<NodeValue>,
    },
    /// Insert into or set slots of the node `obj`.
    Ins {
        id: Timestamp,
        obj: Timestamp,
        payload: InsPayload,
    },
    /// Delete from the node `obj`.
    Del {
        id: Timestamp,
        obj: Timestamp,
        target: DelTarget,
    },
    /// Reserve `len` counter values without touching any node.
    Nop { id: Timestamp, len: u64 },
}

impl Op {
    pub fn id(&self) -> Timestamp {
        match self {
            Op::New { id, .. } | Op::Ins { id, .. } | Op::Del { id, .. } | Op::Nop { id, .. } => {
                *id
            }
        }
    }

    /// Number of clock ticks the operation consumes. RGA inserts consume
    /// one tick per inserted element so every element gets a distinct slot
    /// id; everything else consumes one.
    pub fn span(&self) -> u64 {
        match self {
            Op::Ins {
                payload: InsPayload::Str { text, .. },
                ..
            } => (text.chars().count() as u64).max(1),
            Op::Ins {
                payload: InsPayload::Arr { values, .. },
                ..
            } => (values.len() as u64).max(1),
            Op::Ins {
                payload: InsPayload::Bin { data, .. },
                ..
            } => (data.len() as u64).max(1),
            Op::Nop { len, .. } => (*len).max(1),
            _ => 1,
        }
    }
}

/// Ordered batch of operations minted by one session, with free-form
/// metadata carried alongside for the coordination layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Patch {
    pub ops: Vec<Op>,
    pub metadata: Map<String, Value>,
}

impl Patch {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            metadata: Map::new(),
        }
    }

    /// Id of the first operation; identifies the patch itself.
    pub fn id(&self) -> Option<Timestamp> {
        self.ops.first().map(|op| op.id())
    }

    /// Total clock ticks consumed across all operations.
    pub fn span(&self) -> u64 {
        self.ops.iter().map(|op| op.span()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies every operation in order. Application is sequential and not
    /// atomic: the first failing operation aborts the patch and earlier
    /// effects stay. Individual operations are idempotent under the LWW and
    /// RGA guards, so redelivering the whole patch converges anyway. The
    /// document version advances only when the full patch applied.
    pub fn apply(&self, doc: &mut Document) -> Result<(), DocError> {
        for op in &self.ops {
            crate::apply::apply_op(doc, op)?;
        }
        doc.bump_version();
        Ok(())
    }
}
