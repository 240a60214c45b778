//! The document: sole owner of all nodes, clock authority, and the
//! materialized plain-value view.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::{LocalClock, SessionId, Timestamp};
use crate::error::DocError;
use crate::node::{Node, ValNode};
use crate::patch_builder::PatchBuilder;
use crate::value::NodeValue;

/// Sentinel id of the root register; present in every document.
pub const ROOT_ID: Timestamp = Timestamp::new(SessionId::NIL, 0);

/// One replica's document. Lives for the process/session lifetime; nodes
/// are created by `New` operations and never physically removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    clock: LocalClock,
    nodes: HashMap<Timestamp, Node>,
    version: u64,
}

impl Document {
    pub fn new(sid: SessionId) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID, Node::Val(ValNode::new(ROOT_ID)));
        Self {
            clock: LocalClock::new(sid),
            nodes,
            version: 0,
        }
    }

    pub fn sid(&self) -> SessionId {
        self.clock.sid()
    }

    /// Count of locally applied patches; the optimistic edit layer uses it
    /// to detect interleaved mutations.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Mints the next timestamp for this document's session.
    pub fn next_timestamp(&mut self) -> Timestamp {
        self.clock.tick(1)
    }

    /// Mints a timestamp that reserves `span` consecutive ticks.
    pub fn next_span(&mut self, span: u64) -> Timestamp {
        self.clock.tick(span)
    }

    pub(crate) fn observe(&mut self, ts: Timestamp, span: u64) {
        self.clock.observe(ts, span);
    }

    /// A patch builder positioned at this document's clock. Builders must
    /// be built and applied one at a time per document; the edit layer
    /// serializes the snapshot-build-apply sequence under its lock.
    pub fn builder(&self) -> PatchBuilder {
        PatchBuilder::new(self.sid(), self.clock.peek())
    }

    pub fn get_node(&self, id: Timestamp) -> Result<&Node, DocError> {
        self.nodes.get(&id).ok_or(DocError::NodeNotFound(id))
    }

    pub(crate) fn get_node_mut(&mut self, id: Timestamp) -> Result<&mut Node, DocError> {
        self.nodes.get_mut(&id).ok_or(DocError::NodeNotFound(id))
    }

    /// Inserts a new node. Re-adding an existing id is a no-op so that a
    /// redelivered `New` operation stays idempotent.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.entry(node.id()).or_insert(node);
    }

    pub fn contains(&self, id: Timestamp) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Materializes the current state as a plain JSON tree. One-shot
    /// recursive resolution; tombstones are invisible, temporal values
    /// render as RFC3339 strings, dangling references as `null`.
    pub fn view(&self) -> Value {
        self.resolve(ROOT_ID).unwrap_or(Value::Null)
    }

    /// View of a single node subtree.
    pub fn node_view(&self, id: Timestamp) -> Result<Value, DocError> {
        self.get_node(id)?;
        Ok(self.resolve(id).unwrap_or(Value::Null))
    }

    fn resolve(&self, id: Timestamp) -> Option<Value> {
        match self.nodes.get(&id)? {
            Node::Con(con) => Some(self.value_view(con.value())),
            Node::Val(val) => Some(
                val.current()
                    .map(|v| self.value_view(v))
                    .unwrap_or(Value::Null),
            ),
            Node::Obj(obj) => {
                let mut out = Map::new();
                for (k, v) in obj.live_entries() {
                    out.insert(k.clone(), self.value_view(v));
                }
                Some(Value::Object(out))
            }
            Node::Vec(vec) => {
                let len = vec.live_len() as usize;
                let mut out = vec![Value::Null; len];
                for (i, v) in vec.live_entries() {
                    out[*i as usize] = self.value_view(v);
                }
                Some(Value::Array(out))
            }
            Node::Str(s) => Some(Value::String(s.text())),
            Node::Arr(a) => Some(Value::Array(a.visible().map(|v| self.value_view(v)).collect())),
            Node::Bin(b) => Some(Value::Array(
                b.bytes().into_iter().map(Value::from).collect(),
            )),
        }
    }

    fn value_view(&self, value: &NodeValue) -> Value {
        match value {
            NodeValue::Lit(v) => v.clone(),
            NodeValue::Temporal(t) => Value::String(t.to_rfc3339()),
            NodeValue::Ref(id) => self.resolve(*id).unwrap_or(Value::Null),
        }
    }

    /// CBOR snapshot of the full document (node map, clock, version), for
    /// the persistence adapter interface.
    pub fn to_binary(&self) -> Result<Vec<u8>, DocError> {
        let mut out = Vec::with_capacity(256);
        ciborium::ser::into_writer(self, &mut out)
            .map_err(|e| DocError::InvalidEncoding(format!("snapshot encode: {e}")))?;
        Ok(out)
    }

    pub fn from_binary(data: &[u8]) -> Result<Self, DocError> {
        let doc: Document = ciborium::de::from_reader(data)
            .map_err(|e| DocError::InvalidEncoding(format!("snapshot decode: {e}")))?;
        if !doc.nodes.contains_key(&ROOT_ID) {
            return Err(DocError::InvalidEncoding(
                "snapshot is missing the root node".to_string(),
            ));
        }
        Ok(doc)
    }
}
