//! Per-session knowledge summaries.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use json_crdt_core::{Patch, SessionId, Timestamp};

/// Sorted, disjoint, inclusive counter ranges for one session. Adjacent and
/// overlapping inserts merge; a hole between ranges is a gap the replica has
/// not seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Coverage {
    ranges: Vec<(u64, u64)>,
}

impl Coverage {
    fn insert(&mut self, start: u64, end: u64) {
        let mut merged = (start, end);
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        let mut placed = false;
        for &(s, e) in &self.ranges {
            if e.saturating_add(1) < merged.0 {
                out.push((s, e));
            } else if merged.1.saturating_add(1) < s {
                if !placed {
                    out.push(merged);
                    placed = true;
                }
                out.push((s, e));
            } else {
                merged.0 = merged.0.min(s);
                merged.1 = merged.1.max(e);
            }
        }
        if !placed {
            out.push(merged);
        }
        self.ranges = out;
    }

    fn covers(&self, start: u64, end: u64) -> bool {
        self.ranges.iter().any(|&(s, e)| s <= start && end <= e)
    }

    fn covers_all(&self, other: &Coverage) -> bool {
        other.ranges.iter().all(|&(s, e)| self.covers(s, e))
    }

    /// Sub-ranges of `self` not covered by `other`.
    fn minus(&self, other: &Coverage) -> Vec<(u64, u64)> {
        let mut out = Vec::new();
        for &(s, e) in &self.ranges {
            let mut cursor = s;
            for &(os, oe) in &other.ranges {
                if oe < cursor || os > e {
                    continue;
                }
                if os > cursor {
                    out.push((cursor, os - 1));
                }
                cursor = cursor.max(oe.saturating_add(1));
                if cursor > e {
                    break;
                }
            }
            if cursor <= e {
                out.push((cursor, e));
            }
        }
        out
    }
}

/// `SessionId -> observed counter ranges`, a compact summary of one
/// replica's knowledge. Used to compute which patches a peer is missing.
/// Tracking ranges rather than a single high-water mark keeps patches that
/// arrived out of order from masking the gap they skipped; a missed patch
/// stays visible as a hole until pull sync fills it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateVector {
    entries: BTreeMap<SessionId, Coverage>,
}

impl StateVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a timestamp range `[ts.cnt, ts.cnt + span)`.
    pub fn observe(&mut self, ts: Timestamp, span: u64) {
        let last = ts.cnt.saturating_add(span.max(1)).saturating_sub(1);
        self.entries.entry(ts.sid).or_default().insert(ts.cnt, last);
    }

    /// Records every operation of a patch.
    pub fn observe_patch(&mut self, patch: &Patch) {
        for op in &patch.ops {
            self.observe(op.id(), op.span());
        }
    }

    /// Whether this replica has seen the given timestamp.
    pub fn contains(&self, ts: Timestamp) -> bool {
        self.covers(ts.sid, ts.cnt, ts.cnt)
    }

    /// Whether the full counter range `[start, end]` of `sid` was observed.
    pub fn covers(&self, sid: SessionId, start: u64, end: u64) -> bool {
        self.entries
            .get(&sid)
            .is_some_and(|cov| cov.covers(start, end))
    }

    /// Whether every range of `other` is covered by this vector.
    pub fn dominates(&self, other: &StateVector) -> bool {
        other.entries.iter().all(|(sid, cov)| {
            self.entries
                .get(sid)
                .is_some_and(|own| own.covers_all(cov))
        })
    }

    /// Counter ranges this replica knows about that `other` does not,
    /// including holes inside ranges `other` only partially observed.
    pub fn missing_from(&self, other: &StateVector) -> Vec<(SessionId, RangeInclusive<u64>)> {
        static EMPTY: Coverage = Coverage { ranges: Vec::new() };
        let mut out = Vec::new();
        for (sid, cov) in &self.entries {
            let known = other.entries.get(sid).unwrap_or(&EMPTY);
            for (start, end) in cov.minus(known) {
                out.push((*sid, start..=end));
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Serialized as a sequence of (sid, ranges) pairs so the vector survives
// string-keyed formats like JSON.
impl Serialize for StateVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for (sid, cov) in &self.entries {
            seq.serialize_element(&(sid, &cov.ranges))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for StateVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = StateVector;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a sequence of (session id, counter ranges) pairs")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut sv = StateVector::new();
                while let Some((sid, ranges)) = seq.next_element::<(SessionId, Vec<(u64, u64)>)>()?
                {
                    let cov = sv.entries.entry(sid).or_default();
                    for (start, end) in ranges {
                        cov.insert(start, end);
                    }
                }
                Ok(sv)
            }
        }

        deserializer.deserialize_seq(EntriesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(b: u8) -> SessionId {
        SessionId::from_bytes([b; 16])
    }

    fn ts(b: u8, cnt: u64) -> Timestamp {
        Timestamp::new(sid(b), cnt)
    }

    #[test]
    fn observe_merges_adjacent_and_overlapping_ranges() {
        let mut sv = StateVector::new();
        sv.observe(ts(1, 5), 3);
        assert!(sv.contains(ts(1, 7)));
        assert!(!sv.contains(ts(1, 8)));
        sv.observe(ts(1, 8), 2);
        assert!(sv.covers(sid(1), 5, 9));
        sv.observe(ts(1, 6), 1);
        assert!(sv.covers(sid(1), 5, 9));
    }

    #[test]
    fn out_of_order_delivery_leaves_a_visible_gap() {
        let mut sv = StateVector::new();
        sv.observe(ts(1, 1), 2);
        sv.observe(ts(1, 6), 2);

        assert!(sv.contains(ts(1, 2)));
        assert!(!sv.contains(ts(1, 4)));
        assert!(!sv.covers(sid(1), 1, 7));

        // Once the gap is observed the ranges collapse into one.
        sv.observe(ts(1, 3), 3);
        assert!(sv.covers(sid(1), 1, 7));
    }

    #[test]
    fn dominance_and_missing_ranges() {
        let mut a = StateVector::new();
        a.observe(ts(1, 1), 10);
        a.observe(ts(2, 1), 4);

        let mut b = StateVector::new();
        b.observe(ts(1, 1), 6);

        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));

        let missing = a.missing_from(&b);
        assert_eq!(missing, vec![(sid(1), 7..=10), (sid(2), 1..=4)]);
        assert!(b.missing_from(&a).is_empty());
    }

    #[test]
    fn missing_from_reports_interior_holes() {
        let mut a = StateVector::new();
        a.observe(ts(1, 1), 9);

        let mut b = StateVector::new();
        b.observe(ts(1, 1), 2);
        b.observe(ts(1, 7), 3);

        assert!(!b.dominates(&a));
        assert_eq!(a.missing_from(&b), vec![(sid(1), 3..=6)]);
    }

    #[test]
    fn serde_round_trips_through_json() {
        let mut sv = StateVector::new();
        sv.observe(ts(1, 1), 5);
        sv.observe(ts(1, 9), 2);
        sv.observe(ts(9, 3), 2);
        let json = serde_json::to_string(&sv).unwrap();
        let back: StateVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sv);
    }
}
