//! Out-of-band captions carried as a fragmented text track
//!
//! Each text sample (a TTML document, a WebVTT cue block) is decoded as
//! UTF-8 and handed to a [`TextParser`]. The first sample ever seen pins the
//! track's decode times to the player's expected start time, and every cue
//! is shifted by the same anchor before it reaches the [`CueSink`].

use std::fmt;
use std::str::Utf8Error;

use captionforge_media::timeline::sample_decode_times;
use captionforge_media::{
    BufferedRanges, FragmentInfo, InitSegment, Timescale, TimelineAnchor, TrackDefaults,
};

use crate::embedded::SkipReason;
use crate::{Error, Result};

/// Timescale assumed until an init segment supplies one
pub const DEFAULT_TEXT_TIMESCALE: Timescale = Timescale::MPEG_90K;

/// One caption cue on the playback timeline
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TextCue {
    /// Start in seconds
    pub start: f64,
    /// End in seconds
    pub end: f64,
    pub text: String,
    #[cfg_attr(feature = "serialize", serde(default, skip_serializing_if = "Option::is_none"))]
    pub id: Option<String>,
}

impl TextCue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Move the cue earlier by `offset` seconds
    pub fn shifted(mut self, offset: f64) -> Self {
        self.start -= offset;
        self.end -= offset;
        self
    }
}

/// Media time of the sample a payload came from, before anchoring
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleTiming {
    /// Decode time in seconds
    pub start: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl SampleTiming {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// A text payload that could not be turned into cues
#[derive(Debug, thiserror::Error)]
pub enum TextParseError {
    #[error("payload is not UTF-8: {0}")]
    Encoding(#[from] Utf8Error),

    #[error("corrupt payload: {0}")]
    Corrupt(String),
}

impl TextParseError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}

/// Turns one text payload into cues.
///
/// `Ok(vec![])` means the payload is valid but holds no cue; `Err` means it
/// could not be read. Cue times are in media time, the same clock as
/// [`SampleTiming`].
pub trait TextParser {
    fn parse(
        &mut self,
        content: &str,
        timing: SampleTiming,
    ) -> std::result::Result<Vec<TextCue>, TextParseError>;
}

impl<P: TextParser + ?Sized> TextParser for Box<P> {
    fn parse(
        &mut self,
        content: &str,
        timing: SampleTiming,
    ) -> std::result::Result<Vec<TextCue>, TextParseError> {
        (**self).parse(content, timing)
    }
}

/// Receives cues already placed on the playback timeline
pub trait CueSink {
    fn add_cues(&mut self, cues: Vec<TextCue>);
}

impl CueSink for Vec<TextCue> {
    fn add_cues(&mut self, cues: Vec<TextCue>) {
        self.extend(cues);
    }
}

impl<S: CueSink + ?Sized> CueSink for Box<S> {
    fn add_cues(&mut self, cues: Vec<TextCue>) {
        (**self).add_cues(cues)
    }
}

/// Text formats a track may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    WebVtt,
    Ttml,
}

impl TextFormat {
    /// Map a MIME type; `application/mp4` text tracks carry TTML.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let essence = mime_type.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "text/vtt" => Some(TextFormat::WebVtt),
            "application/ttml+xml" | "application/mp4" => Some(TextFormat::Ttml),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            TextFormat::WebVtt => "text/vtt",
            TextFormat::Ttml => "application/ttml+xml",
        }
    }
}

impl fmt::Display for TextFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Parse a whole, non-fragmented text track.
pub fn parse_sidecar<P: TextParser + ?Sized>(data: &[u8], parser: &mut P) -> Result<Vec<TextCue>> {
    let content = std::str::from_utf8(data).map_err(TextParseError::from)?;
    Ok(parser.parse(content, SampleTiming::default())?)
}

/// Summary of a text fragment whose samples were parsed
#[derive(Debug)]
pub struct ProcessedText {
    pub sequence_number: u32,
    pub samples: usize,
    /// Cues handed to the sink
    pub cues: usize,
    /// Samples that parsed to no cue
    pub empty_samples: usize,
    /// Samples that could not be read or parsed
    pub errors: Vec<Error>,
}

/// Result of delivering one text fragment
#[derive(Debug)]
pub enum TextOutcome {
    Skipped {
        sequence_number: u32,
        reason: SkipReason,
    },
    Processed(ProcessedText),
}

#[derive(Debug)]
struct TextTrackState {
    timescale: Timescale,
    initialized: bool,
    defaults: TrackDefaults,
    anchor: TimelineAnchor,
    buffered: BufferedRanges,
}

impl TextTrackState {
    fn new(timescale: Timescale) -> Self {
        Self {
            timescale,
            initialized: false,
            defaults: TrackDefaults::default(),
            anchor: TimelineAnchor::new(),
            buffered: BufferedRanges::new(),
        }
    }
}

/// An out-of-band caption track delivered as fMP4 text fragments.
pub struct FragmentedTextTrack<P, S> {
    parser: P,
    sink: S,
    default_timescale: Timescale,
    state: TextTrackState,
}

impl<P: TextParser, S: CueSink> FragmentedTextTrack<P, S> {
    pub fn new(parser: P, sink: S) -> Self {
        Self::with_timescale(parser, sink, DEFAULT_TEXT_TIMESCALE)
    }

    /// Use `timescale` until an init segment supplies one
    pub fn with_timescale(parser: P, sink: S, timescale: Timescale) -> Self {
        Self {
            parser,
            sink,
            default_timescale: timescale,
            state: TextTrackState::new(timescale),
        }
    }

    pub fn timescale(&self) -> Timescale {
        self.state.timescale
    }

    /// Anchor offset in seconds, once the first sample has been seen
    pub fn anchor(&self) -> Option<f64> {
        self.state
            .anchor
            .offset()
            .map(|ticks| self.state.timescale.seconds(ticks))
    }

    pub fn buffered(&self) -> &BufferedRanges {
        &self.state.buffered
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Read the track timescale. Only the first init segment is used.
    pub fn on_init_segment(&mut self, data: &[u8]) -> Result<()> {
        if self.state.initialized {
            tracing::debug!("Ignoring repeated text init segment");
            return Ok(());
        }

        let init = InitSegment::parse(data)?;
        if !init.handler_type.is_text() {
            tracing::warn!("Text track has handler {:?}", init.handler_type);
        }
        if let Some(timescale) = Timescale::new(init.timescale) {
            self.state.timescale = timescale;
        }
        self.state.defaults = init.defaults;
        self.state.initialized = true;

        tracing::debug!("Text track timescale {}", self.state.timescale.get());
        Ok(())
    }

    /// Parse every sample of a text fragment whose nominal start is
    /// `start_time` seconds.
    ///
    /// Sample failures are collected in the outcome; only an unreadable
    /// fragment is an `Err`.
    pub fn on_media_segment(&mut self, data: &[u8], start_time: f64) -> Result<TextOutcome> {
        let info = FragmentInfo::parse(data, &self.state.defaults)?;
        let Some(base_decode_time) = info.base_decode_time else {
            tracing::debug!("Skipping text fragment {}: no tfdt", info.sequence_number);
            return Ok(TextOutcome::Skipped {
                sequence_number: info.sequence_number,
                reason: SkipReason::MissingTiming,
            });
        };

        let timescale = self.state.timescale;
        let mut processed = ProcessedText {
            sequence_number: info.sequence_number,
            samples: info.samples.len(),
            cues: 0,
            empty_samples: 0,
            errors: Vec::new(),
        };

        for (index, (sample, decode_time)) in
            sample_decode_times(base_decode_time, &info.samples).enumerate()
        {
            let start = self.state.anchor.normalize(decode_time, start_time, timescale);
            let duration = i64::from(sample.duration);
            self.state.buffered.add(
                timescale.seconds(start),
                timescale.seconds(start.saturating_add(duration)),
            );

            let Some(bytes) = sample.bytes(data) else {
                let range = sample.range();
                processed.errors.push(Error::SampleOutOfBounds {
                    index,
                    start: range.start,
                    end: range.end,
                    len: data.len(),
                });
                continue;
            };

            let timing = SampleTiming {
                start: timescale.seconds(decode_time),
                duration: timescale.seconds(duration),
            };
            let parsed = std::str::from_utf8(bytes)
                .map_err(TextParseError::from)
                .and_then(|content| self.parser.parse(content, timing));

            match parsed {
                Ok(cues) if cues.is_empty() => processed.empty_samples += 1,
                Ok(cues) => {
                    let offset = self.state.anchor.offset_seconds(timescale);
                    processed.cues += cues.len();
                    self.sink
                        .add_cues(cues.into_iter().map(|cue| cue.shifted(offset)).collect());
                }
                Err(e) => {
                    tracing::warn!(
                        "Text fragment {}: sample {}: {}",
                        info.sequence_number,
                        index,
                        e
                    );
                    processed.errors.push(e.into());
                }
            }
        }

        tracing::debug!(
            "Text fragment {}: {} samples, {} cues",
            processed.sequence_number,
            processed.samples,
            processed.cues
        );
        Ok(TextOutcome::Processed(processed))
    }

    /// Drop `[start, end)` from the buffered ranges
    pub fn remove(&mut self, start: f64, end: f64) {
        self.state.buffered.remove(start, end);
    }

    /// Forget the timescale, anchor and buffered ranges
    pub fn reset(&mut self) {
        self.state = TextTrackState::new(self.default_timescale);
    }
}

impl<P, S> fmt::Debug for FragmentedTextTrack<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentedTextTrack")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
