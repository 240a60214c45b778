//! Applying single operations to a document.
//!
//! Every path first feeds the operation's id range into the document clock,
//! then dispatches on the (node kind, operation) pair. Type mismatches and
//! unknown targets surface as errors; stale or redelivered effects fall
//! through the LWW and RGA guards silently.

use crate::clock::Timestamp;
use crate::document::Document;
use crate::error::DocError;
use crate::node::{ArrNode, BinNode, ConNode, Node, NodeKind, ObjNode, StrNode, ValNode, VecNode};
use crate::patch::{DelTarget, InsPayload, Op};
use crate::value::NodeValue;

pub fn apply_op(doc: &mut Document, op: &Op) -> Result<(), DocError> {
    doc.observe(op.id(), op.span());
    match op {
        Op::New { id, kind, value } => apply_new(doc, *id, *kind, value.clone()),
        Op::Ins { id, obj, payload } => apply_ins(doc, *id, *obj, payload),
        Op::Del { id, obj, target } => apply_del(doc, *id, *obj, target),
        Op::Nop { .. } => Ok(()),
    }
}

fn apply_new(
    doc: &mut Document,
    id: Timestamp,
    kind: NodeKind,
    value: Option<NodeValue>,
) -> Result<(), DocError> {
    let node = match kind {
        NodeKind::Con => {
            let value = value.ok_or_else(|| {
                DocError::InvalidOperation("con node requires a value".to_string())
            })?;
            Node::Con(ConNode::new(id, value))
        }
        NodeKind::Val => Node::Val(ValNode::new(id)),
        NodeKind::Obj => Node::Obj(ObjNode::new(id)),
        NodeKind::Vec => Node::Vec(VecNode::new(id)),
        NodeKind::Str => Node::Str(StrNode::new(id)),
        NodeKind::Arr => Node::Arr(ArrNode::new(id)),
        NodeKind::Bin => Node::Bin(BinNode::new(id)),
    };
    doc.add_node(node);
    Ok(())
}

fn apply_ins(
    doc: &mut Document,
    id: Timestamp,
    obj: Timestamp,
    payload: &InsPayload,
) -> Result<(), DocError> {
    let node = doc.get_node_mut(obj)?;
    match (node, payload) {
        (Node::Val(val), InsPayload::Val(value)) => {
            val.set(id, value.clone());
            Ok(())
        }
        (Node::Obj(map), InsPayload::Obj(entries)) => {
            for (key, value) in entries {
                map.set(key, id, value.clone());
            }
            Ok(())
        }
        (Node::Vec(vec), InsPayload::Vec(entries)) => {
            for (index, value) in entries {
                vec.set(*index, id, value.clone());
            }
            Ok(())
        }
        (Node::Str(s), InsPayload::Str { after, text }) => s.insert(*after, id, text),
        (Node::Arr(a), InsPayload::Arr { after, values }) => {
            a.insert(*after, id, values.clone())
        }
        (Node::Bin(b), InsPayload::Bin { after, data }) => b.insert(*after, id, data),
        (node, _) => Err(DocError::InvalidOperation(format!(
            "ins payload does not match {} node {obj}",
            node.kind().wire_name()
        ))),
    }
}

fn apply_del(
    doc: &mut Document,
    id: Timestamp,
    obj: Timestamp,
    target: &DelTarget,
) -> Result<(), DocError> {
    let node = doc.get_node_mut(obj)?;
    match (node, target) {
        (Node::Val(val), DelTarget::Node) => {
            val.clear(id);
            Ok(())
        }
        (Node::Obj(map), DelTarget::Key(key)) => {
            map.delete(key, id);
            Ok(())
        }
        (Node::Vec(vec), DelTarget::Index(index)) => {
            vec.delete(*index, id);
            Ok(())
        }
        (Node::Str(s), DelTarget::Range { start, end }) => {
            s.delete_range(*start, *end);
            Ok(())
        }
        (Node::Arr(a), DelTarget::Range { start, end }) => {
            a.delete_range(*start, *end);
            Ok(())
        }
        (Node::Bin(b), DelTarget::Range { start, end }) => {
            b.delete_range(*start, *end);
            Ok(())
        }
        (node, _) => Err(DocError::InvalidOperation(format!(
            "del target does not match {} node {obj}",
            node.kind().wire_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SessionId;
    use serde_json::json;

    fn ts(sid: u8, cnt: u64) -> Timestamp {
        Timestamp::new(SessionId::from_bytes([sid; 16]), cnt)
    }

    fn doc() -> Document {
        Document::new(SessionId::from_bytes([1; 16]))
    }

    #[test]
    fn new_con_without_value_is_rejected() {
        let mut doc = doc();
        let err = apply_op(
            &mut doc,
            &Op::New {
                id: ts(2, 1),
                kind: NodeKind::Con,
                value: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, DocError::InvalidOperation(_)));
    }

    #[test]
    fn ins_into_missing_node_is_node_not_found() {
        let mut doc = doc();
        let err = apply_op(
            &mut doc,
            &Op::Ins {
                id: ts(2, 2),
                obj: ts(9, 9),
                payload: InsPayload::Val(NodeValue::Lit(json!(1))),
            },
        )
        .unwrap_err();
        assert!(matches!(err, DocError::NodeNotFound(id) if id == ts(9, 9)));
    }

    #[test]
    fn mismatched_payload_is_invalid_operation() {
        let mut doc = doc();
        apply_op(
            &mut doc,
            &Op::New {
                id: ts(2, 1),
                kind: NodeKind::Str,
                value: None,
            },
        )
        .unwrap();
        let err = apply_op(
            &mut doc,
            &Op::Ins {
                id: ts(2, 2),
                obj: ts(2, 1),
                payload: InsPayload::Obj(vec![("k".to_string(), NodeValue::Lit(json!(1)))]),
            },
        )
        .unwrap_err();
        assert!(matches!(err, DocError::InvalidOperation(_)));
    }

    #[test]
    fn applying_an_op_advances_the_clock() {
        let mut doc = doc();
        apply_op(
            &mut doc,
            &Op::Nop {
                id: ts(9, 40),
                len: 10,
            },
        )
        .unwrap();
        let minted = doc.next_timestamp();
        assert!(minted.cnt >= 50);
    }
}
