//! Session identity and logical timestamps.

use std::fmt;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// 16-byte session identifier, time-ordered by construction.
///
/// The layout follows ULID: the first 6 bytes are the big-endian unix
/// timestamp in milliseconds, the remaining 10 bytes are random. Byte-wise
/// comparison therefore sorts sessions roughly by creation time, and two
/// sessions never collide in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId([u8; 16]);

impl SessionId {
    /// Reserved identifier for the document root sentinel. Never issued to
    /// a writer session.
    pub const NIL: SessionId = SessionId([0; 16]);

    /// Generates a fresh session identifier for one writer process.
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let mut bytes = [0u8; 16];
        bytes[..6].copy_from_slice(&millis.to_be_bytes()[2..8]);
        rand::thread_rng().fill(&mut bytes[6..]);
        SessionId(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        SessionId(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Logical timestamp identifying both nodes and operations.
///
/// The total order compares the session id first and the counter second;
/// equal timestamps imply the same writer at the same logical moment. The
/// derived `Ord` on the field order encodes exactly that rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp {
    pub sid: SessionId,
    pub cnt: u64,
}

impl Timestamp {
    pub const fn new(sid: SessionId, cnt: u64) -> Self {
        Self { sid, cnt }
    }

    /// The timestamp `offset` ticks after this one, same session.
    pub fn step(&self, offset: u64) -> Self {
        Self {
            sid: self.sid,
            cnt: self.cnt.saturating_add(offset),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.sid, self.cnt)
    }
}

/// Per-document monotonic counter for one session.
///
/// Counters start at 1; counter 0 belongs to the root sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalClock {
    sid: SessionId,
    next: u64,
}

impl LocalClock {
    pub fn new(sid: SessionId) -> Self {
        Self { sid, next: 1 }
    }

    pub fn sid(&self) -> SessionId {
        self.sid
    }

    /// Counter value the next `tick` would issue.
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Issues the next timestamp and consumes `span` ticks.
    pub fn tick(&mut self, span: u64) -> Timestamp {
        let ts = Timestamp::new(self.sid, self.next);
        self.next = self.next.saturating_add(span.max(1));
        ts
    }

    /// Advances past an observed timestamp range so this session never
    /// reissues a counter value it has seen, its own or a peer's.
    pub fn observe(&mut self, ts: Timestamp, span: u64) {
        let end = ts.cnt.saturating_add(span.max(1));
        if end > self.next {
            self.next = end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(b: u8) -> SessionId {
        SessionId::from_bytes([b; 16])
    }

    #[test]
    fn timestamps_order_by_session_before_counter() {
        let low = Timestamp::new(sid(0x0a), 100);
        let high = Timestamp::new(sid(0x0b), 1);
        assert!(high > low);
        assert!(Timestamp::new(sid(0x0a), 2) > Timestamp::new(sid(0x0a), 1));
    }

    #[test]
    fn tick_is_strictly_increasing() {
        let mut clock = LocalClock::new(sid(1));
        let a = clock.tick(1);
        let b = clock.tick(3);
        let c = clock.tick(1);
        assert_eq!(a.cnt, 1);
        assert_eq!(b.cnt, 2);
        assert_eq!(c.cnt, 5);
    }

    #[test]
    fn observe_never_moves_backwards() {
        let mut clock = LocalClock::new(sid(1));
        clock.observe(Timestamp::new(sid(2), 10), 5);
        assert_eq!(clock.peek(), 15);
        clock.observe(Timestamp::new(sid(3), 1), 1);
        assert_eq!(clock.peek(), 15);
        let ts = clock.tick(1);
        assert_eq!(ts.cnt, 15);
    }

    #[test]
    fn generated_session_ids_are_unique_and_nonzero() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(!a.is_nil());
    }
}
