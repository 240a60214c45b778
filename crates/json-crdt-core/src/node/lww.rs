//! Last-Writer-Wins registers and maps.
//!
//! Every slot records the timestamp of the write that set it. A write
//! replaces the stored value iff its timestamp compares greater than the
//! stored one; otherwise it is a no-op. The rule is commutative,
//! associative, and idempotent, so replicas converge regardless of
//! delivery order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::value::NodeValue;

/// One LWW slot: the winning write's timestamp plus its value.
///
/// `value: None` marks a deletion tombstone; the timestamp stays behind so
/// a stale concurrent write cannot resurrect the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LwwSlot {
    pub write: Timestamp,
    pub value: Option<NodeValue>,
}

impl LwwSlot {
    fn wins_over(&self, ts: Timestamp) -> bool {
        ts <= self.write
    }
}

/// LWW register over a single value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValNode {
    id: Timestamp,
    slot: Option<LwwSlot>,
}

impl ValNode {
    pub fn new(id: Timestamp) -> Self {
        Self { id, slot: None }
    }

    pub fn id(&self) -> Timestamp {
        self.id
    }

    /// Applies a write. Returns whether the write won.
    pub fn set(&mut self, ts: Timestamp, value: NodeValue) -> bool {
        match &self.slot {
            Some(slot) if slot.wins_over(ts) => false,
            _ => {
                self.slot = Some(LwwSlot {
                    write: ts,
                    value: Some(value),
                });
                true
            }
        }
    }

    /// Clears the register under the same timestamp guard as `set`.
    pub fn clear(&mut self, ts: Timestamp) -> bool {
        match &self.slot {
            Some(slot) if slot.wins_over(ts) => false,
            _ => {
                self.slot = Some(LwwSlot {
                    write: ts,
                    value: None,
                });
                true
            }
        }
    }

    pub fn current(&self) -> Option<&NodeValue> {
        self.slot.as_ref().and_then(|s| s.value.as_ref())
    }

    pub fn write_ts(&self) -> Option<Timestamp> {
        self.slot.as_ref().map(|s| s.write)
    }
}

/// LWW map keyed by string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjNode {
    id: Timestamp,
    entries: BTreeMap<String, LwwSlot>,
}

impl ObjNode {
    pub fn new(id: Timestamp) -> Self {
        Self {
            id,
            entries: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Timestamp {
        self.id
    }

    pub fn set(&mut self, key: &str, ts: Timestamp, value: NodeValue) -> bool {
        match self.entries.get(key) {
            Some(slot) if slot.wins_over(ts) => false,
            _ => {
                self.entries.insert(
                    key.to_owned(),
                    LwwSlot {
                        write: ts,
                        value: Some(value),
                    },
                );
                true
            }
        }
    }

    /// Deletes a key, leaving a timestamped tombstone. Deleting a key that
    /// was never written still records the tombstone so a slower concurrent
    /// write loses deterministically.
    pub fn delete(&mut self, key: &str, ts: Timestamp) -> bool {
        match self.entries.get(key) {
            Some(slot) if slot.wins_over(ts) => false,
            _ => {
                self.entries.insert(
                    key.to_owned(),
                    LwwSlot {
                        write: ts,
                        value: None,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&NodeValue> {
        self.entries.get(key).and_then(|s| s.value.as_ref())
    }

    pub fn write_ts(&self, key: &str) -> Option<Timestamp> {
        self.entries.get(key).map(|s| s.write)
    }

    /// Keys with live (non-tombstoned) values, in key order.
    pub fn live_entries(&self) -> impl Iterator<Item = (&String, &NodeValue)> {
        self.entries
            .iter()
            .filter_map(|(k, s)| s.value.as_ref().map(|v| (k, v)))
    }
}

/// LWW map keyed by integer index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VecNode {
    id: Timestamp,
    slots: BTreeMap<u64, LwwSlot>,
}

impl VecNode {
    pub fn new(id: Timestamp) -> Self {
        Self {
            id,
            slots: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Timestamp {
        self.id
    }

    pub fn set(&mut self, index: u64, ts: Timestamp, value: NodeValue) -> bool {
        match self.slots.get(&index) {
            Some(slot) if slot.wins_over(ts) => false,
            _ => {
                self.slots.insert(
                    index,
                    LwwSlot {
                        write: ts,
                        value: Some(value),
                    },
                );
                true
            }
        }
    }

    pub fn delete(&mut self, index: u64, ts: Timestamp) -> bool {
        match self.slots.get(&index) {
            Some(slot) if slot.wins_over(ts) => false,
            _ => {
                self.slots.insert(
                    index,
                    LwwSlot {
                        write: ts,
                        value: None,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, index: u64) -> Option<&NodeValue> {
        self.slots.get(&index).and_then(|s| s.value.as_ref())
    }

    /// Length of the materialized vector: one past the highest live index.
    pub fn live_len(&self) -> u64 {
        self.slots
            .iter()
            .filter(|(_, s)| s.value.is_some())
            .map(|(i, _)| i + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn live_entries(&self) -> impl Iterator<Item = (&u64, &NodeValue)> {
        self.slots
            .iter()
            .filter_map(|(i, s)| s.value.as_ref().map(|v| (i, v)))
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

    #[test]
    fn later_write_wins_regardless_of_arrival_order() {
        let mut a = ObjNode::new(ts(1, 1));
        let mut b = ObjNode::new(ts(1, 1));

        let w1 = (ts(0x0a, 5), NodeValue::Lit(json!(5)));
        let w2 = (ts(0x0b, 3), NodeValue::Lit(json!(10)));

        a.set("counter", w1.0, w1.1.clone());
        a.set("counter", w2.0, w2.1.clone());

        b.set("counter", w2.0, w2.1);
        b.set("counter", w1.0, w1.1);

        // (0x0b, 3) > (0x0a, 5): session id compares before counter.
        assert_eq!(a.get("counter"), Some(&NodeValue::Lit(json!(10))));
        assert_eq!(a.get("counter"), b.get("counter"));
    }

    #[test]
    fn stale_write_cannot_resurrect_deleted_key() {
        let mut obj = ObjNode::new(ts(1, 1));
        assert!(obj.set("k", ts(2, 1), NodeValue::Lit(json!("v"))));
        assert!(obj.delete("k", ts(2, 5)));
        assert!(!obj.set("k", ts(2, 3), NodeValue::Lit(json!("stale"))));
        assert_eq!(obj.get("k"), None);
        // A genuinely newer write takes the slot back.
        assert!(obj.set("k", ts(2, 7), NodeValue::Lit(json!("fresh"))));
        assert_eq!(obj.get("k"), Some(&NodeValue::Lit(json!("fresh"))));
    }

    #[test]
    fn set_is_idempotent() {
        let mut val = ValNode::new(ts(1, 1));
        assert!(val.set(ts(2, 2), NodeValue::Lit(json!(1))));
        assert!(!val.set(ts(2, 2), NodeValue::Lit(json!(1))));
        assert_eq!(val.current(), Some(&NodeValue::Lit(json!(1))));
        assert_eq!(val.write_ts(), Some(ts(2, 2)));
    }

    #[test]
    fn vector_fills_by_highest_live_index() {
        let mut vec = VecNode::new(ts(1, 1));
        vec.set(2, ts(2, 1), NodeValue::Lit(json!("c")));
        assert_eq!(vec.live_len(), 3);
        vec.delete(2, ts(2, 2));
        assert_eq!(vec.live_len(), 0);
        assert_eq!(vec.get(2), None);
    }
}
