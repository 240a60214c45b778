//! Values stored inside LWW slots and `arr` elements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Timestamp;

/// A value held by an LWW slot or an `arr` element.
///
/// Temporal values and node references are first-class variants rather
/// than sentinel-encoded JSON objects; the sentinel forms
/// (`{"type":"time",...}` and `{"type":"ref",...}`) exist only on the
/// wire, see the verbose codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeValue {
    /// Plain JSON scalar or tree, stored inline.
    Lit(Value),
    /// Structural, non-owning reference to another node, resolved at view
    /// time through the document's node map.
    Ref(Timestamp),
    /// Point in time; rendered as an RFC3339 string in materialized views.
    Temporal(DateTime<Utc>),
}

impl NodeValue {
    pub fn is_ref(&self) -> bool {
        matches!(self, NodeValue::Ref(_))
    }

    /// Referenced node id, if this value is a reference.
    pub fn as_ref_id(&self) -> Option<Timestamp> {
        match self {
            NodeValue::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<Value> for NodeValue {
    fn from(v: Value) -> Self {
        NodeValue::Lit(v)
    }
}

impl From<Timestamp> for NodeValue {
    fn from(id: Timestamp) -> Self {
        NodeValue::Ref(id)
    }
}

impl From<DateTime<Utc>> for NodeValue {
    fn from(t: DateTime<Utc>) -> Self {
        NodeValue::Temporal(t)
    }
}
