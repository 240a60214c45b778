//! CRDT node variants and their merge rules.
//!
//! Nodes are a closed sum type; every dispatch point matches exhaustively,
//! so an unsupported node/operation combination is a compile-time concern
//! rather than a runtime surprise.

mod lww;
mod rga;

pub use lww::{LwwSlot, ObjNode, ValNode, VecNode};
pub use rga::{ArrNode, BinNode, Rga, RgaAtom, StrNode};

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::error::DocError;
use crate::value::NodeValue;

/// Node type discriminator carried by `New` operations and the wire codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Con,
    Val,
    Obj,
    Vec,
    Str,
    Arr,
    Bin,
}

impl NodeKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            NodeKind::Con => "con",
            NodeKind::Val => "val",
            NodeKind::Obj => "obj",
            NodeKind::Vec => "vec",
            NodeKind::Str => "str",
            NodeKind::Arr => "arr",
            NodeKind::Bin => "bin",
        }
    }

    pub fn from_wire_name(name: &str) -> Result<Self, DocError> {
        Ok(match name {
            "con" => NodeKind::Con,
            "val" => NodeKind::Val,
            "obj" => NodeKind::Obj,
            "vec" => NodeKind::Vec,
            "str" => NodeKind::Str,
            "arr" => NodeKind::Arr,
            "bin" => NodeKind::Bin,
            other => return Err(DocError::InvalidNodeType(other.to_string())),
        })
    }
}

/// Immutable constant node. Created once, no merge logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConNode {
    id: Timestamp,
    value: NodeValue,
}

impl ConNode {
    pub fn new(id: Timestamp, value: NodeValue) -> Self {
        Self { id, value }
    }

    pub fn id(&self) -> Timestamp {
        self.id
    }

    pub fn value(&self) -> &NodeValue {
        &self.value
    }
}

/// A CRDT node. The document owns every node; nodes reference each other
/// only by id, which keeps the structure an acyclic graph by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Con(ConNode),
    Val(ValNode),
    Obj(ObjNode),
    Vec(VecNode),
    Str(StrNode),
    Arr(ArrNode),
    Bin(BinNode),
}

impl Node {
    pub fn id(&self) -> Timestamp {
        match self {
            Node::Con(n) => n.id(),
            Node::Val(n) => n.id(),
            Node::Obj(n) => n.id(),
            Node::Vec(n) => n.id(),
            Node::Str(n) => n.id(),
            Node::Arr(n) => n.id(),
            Node::Bin(n) => n.id(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Con(_) => NodeKind::Con,
            Node::Val(_) => NodeKind::Val,
            Node::Obj(_) => NodeKind::Obj,
            Node::Vec(_) => NodeKind::Vec,
            Node::Str(_) => NodeKind::Str,
            Node::Arr(_) => NodeKind::Arr,
            Node::Bin(_) => NodeKind::Bin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SessionId;

    #[test]
    fn wire_names_round_trip() {
        for kind in [
            NodeKind::Con,
            NodeKind::Val,
            NodeKind::Obj,
            NodeKind::Vec,
            NodeKind::Str,
            NodeKind::Arr,
            NodeKind::Bin,
        ] {
            assert_eq!(NodeKind::from_wire_name(kind.wire_name()).unwrap(), kind);
        }
        assert!(matches!(
            NodeKind::from_wire_name("map"),
            Err(DocError::InvalidNodeType(_))
        ));
    }

    #[test]
    fn node_reports_its_id_and_kind() {
        let id = Timestamp::new(SessionId::from_bytes([1; 16]), 4);
        let node = Node::Con(ConNode::new(id, NodeValue::Lit(serde_json::json!(42))));
        assert_eq!(node.id(), id);
        assert_eq!(node.kind(), NodeKind::Con);
    }
}
