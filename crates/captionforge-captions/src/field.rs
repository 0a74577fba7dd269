//! Per-field caption byte pairs ordered by presentation time

/// A byte pair stamped with its sample time in track ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedPair {
    pub time: i64,
    pub data: [u8; 2],
}

/// Byte pairs of one field, kept sorted by time.
///
/// Samples arrive in decode order while composition offsets can move their
/// presentation times backwards, so entries are inserted rather than appended.
/// Pairs with equal times keep their arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldStream {
    entries: Vec<TimedPair>,
}

impl FieldStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, time: i64, data: [u8; 2]) {
        let idx = self.entries.partition_point(|e| e.time <= time);
        self.entries.insert(idx, TimedPair { time, data });
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimedPair> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand out the entries in time order, leaving the stream empty
    pub fn drain(&mut self) -> std::vec::Drain<'_, TimedPair> {
        self.entries.drain(..)
    }
}
