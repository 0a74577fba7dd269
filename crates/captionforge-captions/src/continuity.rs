//! Fragment sequence tracking across deliveries

use std::collections::HashSet;

use crate::cea608::Field;

/// Processed sequence numbers further than this from the last one are forgotten.
pub const HISTORY_WINDOW: u32 = 4096;

/// How a fragment's sequence number relates to what came before
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// No fragment seen yet
    First,
    /// Directly follows the previous fragment
    Contiguous,
    /// A gap or jump; downstream decoders must start over
    Discontinuity { previous: u32, current: u32 },
    /// Already processed
    Duplicate,
}

/// Sequence number history of one caption track.
///
/// Only sequence numbers within [`HISTORY_WINDOW`] of the last processed one
/// are remembered as duplicates. Starting over means replacing the tracker with [`ContinuityTracker::default`].
#[derive(Debug, Clone, Default)]
pub struct ContinuityTracker {
    last_seen: Option<u32>,
    processed: HashSet<u32>,
    pending_reset: [bool; 2],
}

impl ContinuityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processed(&self, sequence_number: u32) -> bool {
        self.processed.contains(&sequence_number)
    }

    pub fn last_seen(&self) -> Option<u32> {
        self.last_seen
    }

    /// Classify a fragment. A discontinuity arms a reset for both fields.
    pub fn observe(&mut self, sequence_number: u32) -> Continuity {
        if self.is_processed(sequence_number) {
            return Continuity::Duplicate;
        }

        match self.last_seen {
            None => Continuity::First,
            Some(previous) if previous.checked_add(1) == Some(sequence_number) => {
                Continuity::Contiguous
            }
            Some(previous) => {
                self.pending_reset = [true; 2];
                Continuity::Discontinuity {
                    previous,
                    current: sequence_number,
                }
            }
        }
    }

    /// Consume the pending reset for `field`, returning whether one was armed
    pub fn take_reset(&mut self, field: Field) -> bool {
        std::mem::take(&mut self.pending_reset[field.index()])
    }

    /// Mark a fragment as processed and advance the last-seen marker
    pub fn record(&mut self, sequence_number: u32) {
        self.processed.insert(sequence_number);
        self.last_seen = Some(sequence_number);

        // Prune in batches so the cost is amortized over many fragments.
        if self.processed.len() > 2 * HISTORY_WINDOW as usize {
            self.processed
                .retain(|&seen| seen.abs_diff(sequence_number) <= HISTORY_WINDOW);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_sequence() {
        let mut tracker = ContinuityTracker::new();
        assert_eq!(tracker.observe(1), Continuity::First);
        tracker.record(1);
        assert_eq!(tracker.observe(2), Continuity::Contiguous);
        tracker.record(2);
        assert_eq!(tracker.last_seen(), Some(2));
        assert!(!tracker.take_reset(Field::One));
    }

    #[test]
    fn test_gap_arms_one_reset_per_field() {
        let mut tracker = ContinuityTracker::new();
        tracker.record(1);
        assert_eq!(
            tracker.observe(5),
            Continuity::Discontinuity {
                previous: 1,
                current: 5
            }
        );
        assert!(tracker.take_reset(Field::One));
        assert!(!tracker.take_reset(Field::One));
        assert!(tracker.take_reset(Field::Two));
    }

    #[test]
    fn test_duplicates_detected() {
        let mut tracker = ContinuityTracker::new();
        tracker.record(3);
        tracker.record(4);
        assert_eq!(tracker.observe(3), Continuity::Duplicate);
        assert_eq!(tracker.observe(4), Continuity::Duplicate);
        assert!(!tracker.take_reset(Field::Two));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = ContinuityTracker::new();
        let last = 3 * HISTORY_WINDOW;
        for sequence_number in 1..=last {
            tracker.record(sequence_number);
        }

        assert!(tracker.processed.len() <= 2 * HISTORY_WINDOW as usize + 1);
        assert!(tracker.is_processed(last));
        assert!(tracker.is_processed(last - HISTORY_WINDOW));
        assert!(!tracker.is_processed(1));
    }

    #[test]
    fn test_backwards_jump_is_discontinuity() {
        let mut tracker = ContinuityTracker::new();
        tracker.record(10);
        assert!(matches!(
            tracker.observe(2),
            Continuity::Discontinuity { .. }
        ));
    }

    #[test]
    fn test_wraparound_is_discontinuity() {
        let mut tracker = ContinuityTracker::new();
        tracker.record(u32::MAX);
        assert!(matches!(
            tracker.observe(0),
            Continuity::Discontinuity { .. }
        ));
    }
}
