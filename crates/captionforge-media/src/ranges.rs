//! Buffered time ranges for out-of-band caption data.

/// Half-open interval `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of the interval in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Ordered set of disjoint, non-adjacent time ranges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferedRanges {
    ranges: Vec<TimeRange>,
}

impl BufferedRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `[start, end)` into the set, coalescing overlapping and touching ranges.
    ///
    /// Empty, inverted or NaN intervals are ignored.
    pub fn add(&mut self, start: f64, end: f64) {
        if !(start < end) {
            return;
        }

        // Ranges in first..last overlap or touch the new one.
        let first = self.ranges.partition_point(|r| r.end < start);
        let last = self.ranges.partition_point(|r| r.start <= end);

        let mut merged = TimeRange::new(start, end);
        if first < last {
            merged.start = merged.start.min(self.ranges[first].start);
            merged.end = merged.end.max(self.ranges[last - 1].end);
        }
        self.ranges.splice(first..last, [merged]);
    }

    /// Subtract `[start, end)` from the set, splitting ranges that straddle it.
    pub fn remove(&mut self, start: f64, end: f64) {
        if !(start < end) {
            return;
        }

        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        for range in self.ranges.drain(..) {
            if range.end <= start || range.start >= end {
                kept.push(range);
                continue;
            }
            if range.start < start {
                kept.push(TimeRange::new(range.start, start));
            }
            if range.end > end {
                kept.push(TimeRange::new(end, range.end));
            }
        }
        self.ranges = kept;
    }

    /// Whether `time` falls inside a buffered range.
    pub fn contains(&self, time: f64) -> bool {
        let idx = self.ranges.partition_point(|r| r.end <= time);
        self.ranges
            .get(idx)
            .is_some_and(|r| r.start <= time && time < r.end)
    }

    /// The ranges in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &TimeRange> {
        self.ranges.iter()
    }

    pub fn as_slice(&self) -> &[TimeRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}
