//! Building patches with canonically minted operation ids.
//!
//! The builder owns a cursor into one session's counter space and hands
//! out consecutive ids as operations are appended, so a built patch always
//! carries a gap-free id range. The caller obtains a builder positioned at
//! the document clock via `Document::builder` and, after applying the built
//! patch, the document clock catches up by observing the ops.

use serde_json::{Map, Value};

use crate::clock::{SessionId, Timestamp};
use crate::error::DocError;
use crate::node::NodeKind;
use crate::patch::{DelTarget, InsPayload, Op, Patch};
use crate::value::NodeValue;

#[derive(Debug)]
pub struct PatchBuilder {
    sid: SessionId,
    next: u64,
    ops: Vec<Op>,
    metadata: Map<String, Value>,
}

impl PatchBuilder {
    pub fn new(sid: SessionId, next: u64) -> Self {
        Self {
            sid,
            next,
            ops: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn sid(&self) -> SessionId {
        self.sid
    }

    fn mint(&mut self, span: u64) -> Timestamp {
        let ts = Timestamp::new(self.sid, self.next);
        self.next = self.next.saturating_add(span.max(1));
        ts
    }

    fn push(&mut self, op: Op) -> Timestamp {
        let id = op.id();
        self.ops.push(op);
        id
    }

    /// Creates a constant node holding `value`.
    pub fn new_con(&mut self, value: NodeValue) -> Timestamp {
        let id = self.mint(1);
        self.push(Op::New {
            id,
            kind: NodeKind::Con,
            value: Some(value),
        })
    }

    pub fn new_val(&mut self) -> Timestamp {
        self.new_container(NodeKind::Val)
    }

    pub fn new_obj(&mut self) -> Timestamp {
        self.new_container(NodeKind::Obj)
    }

    pub fn new_vec(&mut self) -> Timestamp {
        self.new_container(NodeKind::Vec)
    }

    pub fn new_str(&mut self) -> Timestamp {
        self.new_container(NodeKind::Str)
    }

    pub fn new_arr(&mut self) -> Timestamp {
        self.new_container(NodeKind::Arr)
    }

    pub fn new_bin(&mut self) -> Timestamp {
        self.new_container(NodeKind::Bin)
    }

    fn new_container(&mut self, kind: NodeKind) -> Timestamp {
        let id = self.mint(1);
        self.push(Op::New {
            id,
            kind,
            value: None,
        })
    }

    /// Writes the register of the `val` node `obj`.
    pub fn ins_val(&mut self, obj: Timestamp, value: NodeValue) -> Timestamp {
        let id = self.mint(1);
        self.push(Op::Ins {
            id,
            obj,
            payload: InsPayload::Val(value),
        })
    }

    /// Sets keys of the `obj` node `obj`. All entries share one write id.
    pub fn ins_obj(&mut self, obj: Timestamp, entries: Vec<(String, NodeValue)>) -> Timestamp {
        let id = self.mint(1);
        self.push(Op::Ins {
            id,
            obj,
            payload: InsPayload::Obj(entries),
        })
    }

    /// Sets indexed slots of the `vec` node `obj`.
    pub fn ins_vec(&mut self, obj: Timestamp, entries: Vec<(u64, NodeValue)>) -> Timestamp {
        let id = self.mint(1);
        self.push(Op::Ins {
            id,
            obj,
            payload: InsPayload::Vec(entries),
        })
    }

    /// Splices `text` into the `str` node `obj` after the anchor `after`.
    /// Rejects empty text, which would mint an id without an element.
    pub fn ins_str(
        &mut self,
        obj: Timestamp,
        after: Timestamp,
        text: &str,
    ) -> Result<Timestamp, DocError> {
        let span = text.chars().count() as u64;
        if span == 0 {
            return Err(DocError::InvalidOperation(
                "cannot insert empty text".to_string(),
            ));
        }
        let id = self.mint(span);
        Ok(self.push(Op::Ins {
            id,
            obj,
            payload: InsPayload::Str {
                after,
                text: text.to_string(),
            },
        }))
    }

    pub fn ins_arr(
        &mut self,
        obj: Timestamp,
        after: Timestamp,
        values: Vec<NodeValue>,
    ) -> Result<Timestamp, DocError> {
        if values.is_empty() {
            return Err(DocError::InvalidOperation(
                "cannot insert zero elements".to_string(),
            ));
        }
        let id = self.mint(values.len() as u64);
        Ok(self.push(Op::Ins {
            id,
            obj,
            payload: InsPayload::Arr { after, values },
        }))
    }

    pub fn ins_bin(
        &mut self,
        obj: Timestamp,
        after: Timestamp,
        data: Vec<u8>,
    ) -> Result<Timestamp, DocError> {
        if data.is_empty() {
            return Err(DocError::InvalidOperation(
                "cannot insert zero bytes".to_string(),
            ));
        }
        let id = self.mint(data.len() as u64);
        Ok(self.push(Op::Ins {
            id,
            obj,
            payload: InsPayload::Bin { after, data },
        }))
    }

    /// Tombstones one key of the `obj` node `obj`.
    pub fn del_key(&mut self, obj: Timestamp, key: &str) -> Timestamp {
        let id = self.mint(1);
        self.push(Op::Del {
            id,
            obj,
            target: DelTarget::Key(key.to_string()),
        })
    }

    pub fn del_index(&mut self, obj: Timestamp, index: u64) -> Timestamp {
        let id = self.mint(1);
        self.push(Op::Del {
            id,
            obj,
            target: DelTarget::Index(index),
        })
    }

    /// Tombstones the RGA id range `[start, end]` of the node `obj`.
    pub fn del_range(&mut self, obj: Timestamp, start: Timestamp, end: Timestamp) -> Timestamp {
        let id = self.mint(1);
        self.push(Op::Del {
            id,
            obj,
            target: DelTarget::Range { start, end },
        })
    }

    /// Clears the register of the `val` node `obj`.
    pub fn del_node(&mut self, obj: Timestamp) -> Timestamp {
        let id = self.mint(1);
        self.push(Op::Del {
            id,
            obj,
            target: DelTarget::Node,
        })
    }

    /// Reserves `len` counter values without any document effect.
    pub fn nop(&mut self, len: u64) -> Timestamp {
        let span = len.max(1);
        let id = self.mint(span);
        self.push(Op::Nop { id, len: span })
    }

    pub fn set_metadata(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn build(self) -> Patch {
        Patch {
            ops: self.ops,
            metadata: self.metadata,
        }
    }
}
