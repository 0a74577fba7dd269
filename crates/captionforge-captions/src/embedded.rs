//! Embedded CEA-608 extraction from fragmented H.264 video
//!
//! [`EmbeddedCaptionExtractor`] is fed the init segment and then media
//! fragments of one video track. For each fragment it walks every sample's
//! SEI payloads, collects the GA94 byte pairs per field in presentation
//! order and forwards them to the [`FieldDecoder`] attached for that field.
//! Sequence numbers are tracked so that re-delivered fragments are dropped
//! and gaps reset the decoders before new data reaches them.

use std::fmt;
use std::str::FromStr;

use captionforge_media::timeline::sample_decode_times;
use captionforge_media::{FragmentInfo, InitSegment, Timescale, TrackDefaults};

use crate::cea608::{extract_byte_pairs, is_cea608_payload, Field};
use crate::continuity::{Continuity, ContinuityTracker};
use crate::field::FieldStream;
use crate::nal::SeiScanner;
use crate::{Error, Result};

/// Receiver of one field's caption byte pairs.
///
/// Interpreting the CEA-608 control codes and building cues is up to the
/// implementation.
pub trait FieldDecoder {
    /// A byte pair presented at `time` seconds. Calls arrive in time order.
    fn add_data(&mut self, time: f64, data: [u8; 2]);

    /// No data before `time` seconds will follow; close any open cue there.
    fn split_at(&mut self, time: f64);

    /// Drop all decoding state.
    fn reset(&mut self);
}

impl<D: FieldDecoder + ?Sized> FieldDecoder for Box<D> {
    fn add_data(&mut self, time: f64, data: [u8; 2]) {
        (**self).add_data(time, data)
    }

    fn split_at(&mut self, time: f64) {
        (**self).split_at(time)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Caption service carried in one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "UPPERCASE"))]
pub enum CaptionChannel {
    /// Primary captions, field 1
    Cc1,
    /// Primary captions, field 2
    Cc3,
}

impl CaptionChannel {
    pub fn field(&self) -> Field {
        match self {
            CaptionChannel::Cc1 => Field::One,
            CaptionChannel::Cc3 => Field::Two,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionChannel::Cc1 => "CC1",
            CaptionChannel::Cc3 => "CC3",
        }
    }
}

impl FromStr for CaptionChannel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CC1" => Ok(CaptionChannel::Cc1),
            "CC3" => Ok(CaptionChannel::Cc3),
            _ => {
                tracing::warn!("Ignoring unsupported caption channel {:?}", s);
                Err(Error::UnsupportedChannel(s.to_string()))
            }
        }
    }
}

impl fmt::Display for CaptionChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte pairs of one fragment, per field, in presentation order
#[derive(Debug, Default)]
pub struct CaptionBatch {
    pub fields: [FieldStream; 2],
    /// GA94 caption payloads seen, padding-only ones included
    pub caption_payloads: usize,
    /// Samples whose scan was cut short
    pub sample_errors: Vec<Error>,
}

impl CaptionBatch {
    pub fn field(&self, field: Field) -> &FieldStream {
        &self.fields[field.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(FieldStream::is_empty)
    }
}

/// Collect the caption byte pairs of every sample in a fragment.
///
/// Pair times are absolute track ticks. A sample that fails to scan stops
/// contributing at the point of failure; the remaining samples are still read.
pub fn scan_fragment(data: &[u8], info: &FragmentInfo, base_decode_time: u64) -> CaptionBatch {
    let mut batch = CaptionBatch::default();

    for (index, (sample, time)) in sample_decode_times(base_decode_time, &info.samples).enumerate()
    {
        let Some(bytes) = sample.bytes(data) else {
            let range = sample.range();
            tracing::warn!(
                "Fragment {}: sample {} lies outside the buffer",
                info.sequence_number,
                index
            );
            batch.sample_errors.push(Error::SampleOutOfBounds {
                index,
                start: range.start,
                end: range.end,
                len: data.len(),
            });
            continue;
        };

        for payload in SeiScanner::new(bytes) {
            let payload = match payload {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(
                        "Fragment {}: sample {}: {}",
                        info.sequence_number,
                        index,
                        e
                    );
                    batch.sample_errors.push(e);
                    break;
                }
            };

            let body = payload.bytes(bytes);
            if !is_cea608_payload(payload.payload_type, body) {
                continue;
            }
            batch.caption_payloads += 1;
            for pair in extract_byte_pairs(body) {
                batch.fields[pair.field.index()].insert(time, pair.data);
            }
        }
    }

    batch
}

/// Why a media fragment produced no output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No init segment has supplied a timescale yet
    NoTimescale,
    /// The sequence number was already processed
    Duplicate,
    /// The fragment has no base decode time
    MissingTiming,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::NoTimescale => "no timescale",
            SkipReason::Duplicate => "duplicate sequence number",
            SkipReason::MissingTiming => "missing tfdt",
        };
        f.write_str(reason)
    }
}

/// Summary of a fragment whose caption data was forwarded
#[derive(Debug)]
pub struct ProcessedFragment {
    pub sequence_number: u32,
    /// The fragment did not follow the previous one; decoders were reset
    pub discontinuity: bool,
    /// Byte pairs forwarded per field
    pub pairs: [usize; 2],
    /// Base decode time in seconds
    pub start_time: f64,
    /// Decode time past the last sample, in seconds
    pub end_time: f64,
    /// Samples whose scan failed
    pub sample_errors: Vec<Error>,
}

/// Result of delivering one media fragment
#[derive(Debug)]
pub enum FragmentOutcome {
    Skipped {
        sequence_number: Option<u32>,
        reason: SkipReason,
    },
    Processed(ProcessedFragment),
}

impl FragmentOutcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, FragmentOutcome::Processed(_))
    }
}

/// Everything learned from the stream so far
#[derive(Debug, Default)]
struct TrackState {
    timescale: Option<Timescale>,
    defaults: TrackDefaults,
    continuity: ContinuityTracker,
}

/// Embedded caption extraction for one video track.
pub struct EmbeddedCaptionExtractor<D> {
    decoders: [Option<D>; 2],
    state: TrackState,
}

impl<D> Default for EmbeddedCaptionExtractor<D> {
    fn default() -> Self {
        Self {
            decoders: [None, None],
            state: TrackState::default(),
        }
    }
}

impl<D: FieldDecoder> EmbeddedCaptionExtractor<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a channel's field to `decoder`, returning any decoder it replaces
    pub fn attach(&mut self, channel: CaptionChannel, decoder: D) -> Option<D> {
        tracing::debug!("Attaching decoder for {}", channel);
        self.decoders[channel.field().index()].replace(decoder)
    }

    pub fn detach(&mut self, channel: CaptionChannel) -> Option<D> {
        self.decoders[channel.field().index()].take()
    }

    pub fn decoder(&self, channel: CaptionChannel) -> Option<&D> {
        self.decoders[channel.field().index()].as_ref()
    }

    pub fn decoder_mut(&mut self, channel: CaptionChannel) -> Option<&mut D> {
        self.decoders[channel.field().index()].as_mut()
    }

    pub fn timescale(&self) -> Option<Timescale> {
        self.state.timescale
    }

    /// Sequence number of the last processed fragment
    pub fn last_sequence_number(&self) -> Option<u32> {
        self.state.continuity.last_seen()
    }

    /// Take the timescale and fragment defaults from an init segment.
    ///
    /// Only the first init segment after construction or [`reset`](Self::reset)
    /// is used; later ones are ignored.
    pub fn on_init_segment(&mut self, data: &[u8]) -> Result<()> {
        if let Some(timescale) = self.state.timescale {
            tracing::debug!(
                "Ignoring init segment, timescale already {}",
                timescale.get()
            );
            return Ok(());
        }

        let init = InitSegment::parse(data)?;
        if !init.handler_type.is_video() {
            tracing::warn!(
                "Embedded captions expected in a video track, got {:?}",
                init.handler_type
            );
        }

        self.state.timescale = Timescale::new(init.timescale);
        self.state.defaults = init.defaults;
        tracing::debug!("Embedded caption timescale {}", init.timescale);
        Ok(())
    }

    /// Extract and forward the caption data of one media fragment.
    ///
    /// Fails only when the fragment's boxes cannot be read; the extractor
    /// stays usable for later fragments.
    pub fn on_media_segment(&mut self, data: &[u8]) -> Result<FragmentOutcome> {
        let Some(timescale) = self.state.timescale else {
            tracing::debug!("Skipping fragment: no timescale yet");
            return Ok(FragmentOutcome::Skipped {
                sequence_number: None,
                reason: SkipReason::NoTimescale,
            });
        };

        let info = FragmentInfo::parse(data, &self.state.defaults)?;
        let sequence_number = info.sequence_number;

        if self.state.continuity.is_processed(sequence_number) {
            tracing::debug!("Skipping fragment {}: already processed", sequence_number);
            return Ok(FragmentOutcome::Skipped {
                sequence_number: Some(sequence_number),
                reason: SkipReason::Duplicate,
            });
        }

        let (Some(base_decode_time), Some((start_ticks, end_ticks))) =
            (info.base_decode_time, info.decode_span())
        else {
            tracing::debug!("Skipping fragment {}: no tfdt", sequence_number);
            return Ok(FragmentOutcome::Skipped {
                sequence_number: Some(sequence_number),
                reason: SkipReason::MissingTiming,
            });
        };

        let discontinuity = match self.state.continuity.observe(sequence_number) {
            Continuity::Discontinuity { previous, current } => {
                tracing::info!(
                    "Caption discontinuity: fragment {} after {}, resetting decoders",
                    current,
                    previous
                );
                true
            }
            _ => false,
        };

        let mut batch = scan_fragment(data, &info, base_decode_time);
        let end_time = timescale.seconds(end_ticks);
        let split = batch.caption_payloads > 0;

        let mut pairs = [0usize; 2];
        for field in Field::ALL {
            let reset = self.state.continuity.take_reset(field);
            let Some(decoder) = self.decoders[field.index()].as_mut() else {
                continue;
            };
            if reset {
                decoder.reset();
            }

            let stream = &mut batch.fields[field.index()];
            pairs[field.index()] = stream.len();
            for entry in stream.drain() {
                decoder.add_data(timescale.seconds(entry.time), entry.data);
            }
            if split {
                decoder.split_at(end_time);
            }
        }

        self.state.continuity.record(sequence_number);

        tracing::debug!(
            "Fragment {}: {} + {} caption pairs, {} sample errors",
            sequence_number,
            pairs[0],
            pairs[1],
            batch.sample_errors.len()
        );

        Ok(FragmentOutcome::Processed(ProcessedFragment {
            sequence_number,
            discontinuity,
            pairs,
            start_time: timescale.seconds(start_ticks),
            end_time,
            sample_errors: batch.sample_errors,
        }))
    }

    /// Start over: reset every attached decoder and forget the timescale and
    /// sequence history. Decoders stay attached.
    pub fn reset(&mut self) {
        for decoder in self.decoders.iter_mut().flatten() {
            decoder.reset();
        }
        self.state = TrackState::default();
    }
}

impl<D> fmt::Debug for EmbeddedCaptionExtractor<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedCaptionExtractor")
            .field("field_one", &self.decoders[0].is_some())
            .field("field_two", &self.decoders[1].is_some())
            .field("state", &self.state)
            .finish()
    }
}
