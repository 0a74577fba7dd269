//! Sample timing on the presentation timeline.
//!
//! Decode times are kept in track ticks as `i64` (composition offsets are
//! signed) and only converted to seconds at the edges.

use crate::fragment::FragmentSample;

/// Track timescale in ticks per second. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timescale(u32);

impl Timescale {
    /// The 90 kHz MPEG system clock.
    pub const MPEG_90K: Timescale = Timescale(90_000);

    /// Wrap a timescale, rejecting zero.
    pub fn new(ticks_per_second: u32) -> Option<Self> {
        (ticks_per_second > 0).then_some(Self(ticks_per_second))
    }

    /// Ticks per second.
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Convert ticks to seconds.
    pub fn seconds(&self, ticks: i64) -> f64 {
        ticks as f64 / self.0 as f64
    }

    /// Convert seconds to the nearest tick.
    pub fn ticks(&self, seconds: f64) -> i64 {
        (seconds * self.0 as f64).round() as i64
    }
}

/// Absolute decode time of every sample: base + preceding durations + composition offset.
///
/// Times saturate at the `i64` range; [`decode_span`] tells whether a run fits.
pub fn sample_decode_times(
    base_decode_time: u64,
    samples: &[FragmentSample],
) -> impl Iterator<Item = (&FragmentSample, i64)> + '_ {
    let base = i64::try_from(base_decode_time).unwrap_or(i64::MAX);
    samples.iter().scan(0i64, move |elapsed, sample| {
        let time = base
            .saturating_add(*elapsed)
            .saturating_add(i64::from(sample.composition_offset));
        *elapsed = elapsed.saturating_add(i64::from(sample.duration));
        Some((sample, time))
    })
}

/// Decode time just past the last sample, or `None` on overflow.
pub fn fragment_end_time(base_decode_time: u64, samples: &[FragmentSample]) -> Option<u64> {
    samples
        .iter()
        .try_fold(base_decode_time, |end, s| end.checked_add(u64::from(s.duration)))
}

/// Start and end of a run in signed ticks.
///
/// `None` when the end time, shifted by any composition offset, leaves the
/// `i64` range.
pub fn decode_span(base_decode_time: u64, samples: &[FragmentSample]) -> Option<(i64, i64)> {
    let start = i64::try_from(base_decode_time).ok()?;
    let end = i64::try_from(fragment_end_time(base_decode_time, samples)?).ok()?;
    end.checked_add(i64::from(i32::MAX))?;
    Some((start, end))
}

/// One-time offset that pins the first out-of-band sample to its expected start.
///
/// The offset is taken from the first sample ever normalized and kept until
/// [`TimelineAnchor::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineAnchor {
    offset: Option<i64>,
}

impl TimelineAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The anchor in ticks, once computed.
    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    /// Shift a decode time onto the playback timeline.
    ///
    /// On first use the anchor becomes `decode_time - expected_start * timescale`.
    pub fn normalize(&mut self, decode_time: i64, expected_start: f64, timescale: Timescale) -> i64 {
        let anchor = *self
            .offset
            .get_or_insert_with(|| decode_time.saturating_sub(timescale.ticks(expected_start)));
        decode_time.saturating_sub(anchor)
    }

    /// The anchor in seconds (0 before the first sample).
    pub fn offset_seconds(&self, timescale: Timescale) -> f64 {
        timescale.seconds(self.offset.unwrap_or(0))
    }

    /// Forget the anchor so the next sample computes a new one.
    pub fn reset(&mut self) {
        self.offset = None;
    }
}
