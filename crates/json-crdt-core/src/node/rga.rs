//! Replicated Growable Array core shared by the `str`, `arr`, and `bin`
//! node variants.
//!
//! Each element carries its own slot id and is anchored to the element it
//! was inserted after. Concurrent inserts at the same anchor are ordered
//! by descending slot id, so replicas that integrate them in either order
//! end up with the same sequence. Deletes tombstone elements in place;
//! tombstones are invisible in the materialized value but remain valid
//! anchors for later inserts.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::error::DocError;
use crate::value::NodeValue;

/// One sequence element. `content: None` is a tombstone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RgaAtom<T> {
    pub slot: Timestamp,
    pub content: Option<T>,
}

/// Anchored, id-ordered sequence with tombstoned deletes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rga<T> {
    container: Timestamp,
    atoms: Vec<RgaAtom<T>>,
}

impl<T> Rga<T> {
    pub fn new(container: Timestamp) -> Self {
        Self {
            container,
            atoms: Vec::new(),
        }
    }

    pub fn id(&self) -> Timestamp {
        self.container
    }

    /// Inserts `items` immediately after the `after` anchor; anchoring at
    /// the container id means the head of the sequence. Element `i` takes
    /// slot id `first + i`. Slots that are already present are skipped, so
    /// redelivering the same insert is a no-op.
    pub fn insert(
        &mut self,
        after: Timestamp,
        first: Timestamp,
        items: Vec<T>,
    ) -> Result<(), DocError> {
        let mut idx = if after == self.container {
            0
        } else {
            match self.atoms.iter().position(|a| a.slot == after) {
                Some(i) => i + 1,
                None => {
                    return Err(DocError::InvalidOperation(format!(
                        "insert anchor {after} not found"
                    )))
                }
            }
        };
        // Concurrent inserts at the same anchor: the greater slot id sits
        // closer to the anchor, giving every replica the same order.
        while idx < self.atoms.len() && self.atoms[idx].slot > first {
            idx += 1;
        }
        let fresh: Vec<RgaAtom<T>> = items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| {
                let slot = first.step(i as u64);
                if self.atoms.iter().any(|a| a.slot == slot) {
                    None
                } else {
                    Some(RgaAtom {
                        slot,
                        content: Some(item),
                    })
                }
            })
            .collect();
        self.atoms.splice(idx..idx, fresh);
        Ok(())
    }

    /// Tombstones every atom whose slot falls inside `[start, end]` (one
    /// session's contiguous counter range). Ids in the range that are not
    /// present are ignored, so redelivery and partial knowledge are safe.
    pub fn delete_range(&mut self, start: Timestamp, end: Timestamp) {
        for atom in &mut self.atoms {
            if atom.slot.sid == start.sid && atom.slot.cnt >= start.cnt && atom.slot.cnt <= end.cnt
            {
                atom.content = None;
            }
        }
    }

    pub fn visible(&self) -> impl Iterator<Item = &T> {
        self.atoms.iter().filter_map(|a| a.content.as_ref())
    }

    pub fn visible_len(&self) -> usize {
        self.atoms.iter().filter(|a| a.content.is_some()).count()
    }

    /// Slot id of the `index`-th visible element.
    pub fn visible_slot(&self, index: usize) -> Option<Timestamp> {
        self.atoms
            .iter()
            .filter(|a| a.content.is_some())
            .nth(index)
            .map(|a| a.slot)
    }

    pub fn atoms(&self) -> &[RgaAtom<T>] {
        &self.atoms
    }
}

/// RGA over characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrNode {
    rga: Rga<char>,
}

impl StrNode {
    pub fn new(id: Timestamp) -> Self {
        Self { rga: Rga::new(id) }
    }

    pub fn id(&self) -> Timestamp {
        self.rga.id()
    }

    pub fn insert(&mut self, after: Timestamp, first: Timestamp, text: &str) -> Result<(), DocError> {
        self.rga.insert(after, first, text.chars().collect())
    }

    pub fn delete_range(&mut self, start: Timestamp, end: Timestamp) {
        self.rga.delete_range(start, end)
    }

    pub fn text(&self) -> String {
        self.rga.visible().collect()
    }

    pub fn visible_slot(&self, index: usize) -> Option<Timestamp> {
        self.rga.visible_slot(index)
    }

    pub fn len(&self) -> usize {
        self.rga.visible_len()
    }

    pub fn is_empty(&self) -> bool {
        self.rga.visible_len() == 0
    }
}

/// RGA over element values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrNode {
    rga: Rga<NodeValue>,
}

impl ArrNode {
    pub fn new(id: Timestamp) -> Self {
        Self { rga: Rga::new(id) }
    }

    pub fn id(&self) -> Timestamp {
        self.rga.id()
    }

    pub fn insert(
        &mut self,
        after: Timestamp,
        first: Timestamp,
        values: Vec<NodeValue>,
    ) -> Result<(), DocError> {
        self.rga.insert(after, first, values)
    }

    pub fn delete_range(&mut self, start: Timestamp, end: Timestamp) {
        self.rga.delete_range(start, end)
    }

    pub fn visible(&self) -> impl Iterator<Item = &NodeValue> {
        self.rga.visible()
    }

    pub fn visible_slot(&self, index: usize) -> Option<Timestamp> {
        self.rga.visible_slot(index)
    }

    pub fn len(&self) -> usize {
        self.rga.visible_len()
    }

    pub fn is_empty(&self) -> bool {
        self.rga.visible_len() == 0
    }
}

/// RGA over bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinNode {
    rga: Rga<u8>,
}

impl BinNode {
    pub fn new(id: Timestamp) -> Self {
        Self { rga: Rga::new(id) }
    }

    pub fn id(&self) -> Timestamp {
        self.rga.id()
    }

    pub fn insert(&mut self, after: Timestamp, first: Timestamp, data: &[u8]) -> Result<(), DocError> {
        self.rga.insert(after, first, data.to_vec())
    }

    pub fn delete_range(&mut self, start: Timestamp, end: Timestamp) {
        self.rga.delete_range(start, end)
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.rga.visible().copied().collect()
    }

    pub fn visible_slot(&self, index: usize) -> Option<Timestamp> {
        self.rga.visible_slot(index)
    }

    pub fn len(&self) -> usize {
        self.rga.visible_len()
    }

    pub fn is_empty(&self) -> bool {
        self.rga.visible_len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SessionId;

    fn ts(sid: u8, cnt: u64) -> Timestamp {
        Timestamp::new(SessionId::from_bytes([sid; 16]), cnt)
    }

    fn container() -> Timestamp {
        ts(1, 1)
    }

    #[test]
    fn sequential_inserts_extend_in_order() {
        let mut s = StrNode::new(container());
        s.insert(container(), ts(2, 1), "ab").unwrap();
        let b = s.visible_slot(1).unwrap();
        s.insert(b, ts(2, 3), "c").unwrap();
        assert_eq!(s.text(), "abc");
    }

    #[test]
    fn concurrent_head_inserts_converge_in_either_order() {
        let mut left = StrNode::new(container());
        let mut right = StrNode::new(container());

        let ins_a = (ts(0x0a, 1), "aa");
        let ins_b = (ts(0x0b, 1), "bb");

        left.insert(container(), ins_a.0, ins_a.1).unwrap();
        left.insert(container(), ins_b.0, ins_b.1).unwrap();

        right.insert(container(), ins_b.0, ins_b.1).unwrap();
        right.insert(container(), ins_a.0, ins_a.1).unwrap();

        assert_eq!(left.text(), right.text());
        // The greater session id wins the position next to the anchor.
        assert_eq!(left.text(), "bbaa");
    }

    #[test]
    fn redelivered_insert_is_a_no_op() {
        let mut s = StrNode::new(container());
        s.insert(container(), ts(2, 1), "hey").unwrap();
        s.insert(container(), ts(2, 1), "hey").unwrap();
        assert_eq!(s.text(), "hey");
    }

    #[test]
    fn delete_leaves_tombstones_that_still_anchor() {
        let mut s = StrNode::new(container());
        s.insert(container(), ts(2, 1), "abc").unwrap();
        let b = s.visible_slot(1).unwrap();
        s.delete_range(ts(2, 1), ts(2, 3));
        assert_eq!(s.text(), "");
        assert_eq!(s.len(), 0);
        // Inserting after the tombstoned 'b' still works.
        s.insert(b, ts(2, 10), "x").unwrap();
        assert_eq!(s.text(), "x");
    }

    #[test]
    fn delete_is_idempotent() {
        let mut b = BinNode::new(container());
        b.insert(container(), ts(2, 1), &[1, 2, 3]).unwrap();
        b.delete_range(ts(2, 2), ts(2, 2));
        b.delete_range(ts(2, 2), ts(2, 2));
        assert_eq!(b.bytes(), vec![1, 3]);
    }

    #[test]
    fn missing_anchor_is_rejected() {
        let mut s = StrNode::new(container());
        let err = s.insert(ts(9, 9), ts(2, 1), "x").unwrap_err();
        assert!(matches!(err, DocError::InvalidOperation(_)));
    }
}
