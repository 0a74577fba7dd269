//! # captionforge-captions
//!
//! Caption extraction for fragmented MP4 streams.
//!
//! Two delivery modes are supported:
//!
//! - Embedded CEA-608: caption byte pairs carried in H.264 SEI
//!   (`user_data_registered_itu_t_t35`, GA94) inside the video samples.
//!   [`EmbeddedCaptionExtractor`] locates them, orders them per field and
//!   forwards them to a [`FieldDecoder`] for each attached channel.
//! - Out-of-band text: a separate fMP4 text track whose samples are
//!   documents for a [`TextParser`]. [`FragmentedTextTrack`] anchors them on
//!   the playback timeline and keeps the buffered ranges.
//!
//! ## Example
//!
//! ```no_run
//! use captionforge_captions::{CaptionChannel, EmbeddedCaptionExtractor, FieldDecoder};
//!
//! struct Printer;
//!
//! impl FieldDecoder for Printer {
//!     fn add_data(&mut self, time: f64, data: [u8; 2]) {
//!         println!("{:.3} {:02x}{:02x}", time, data[0], data[1]);
//!     }
//!     fn split_at(&mut self, _time: f64) {}
//!     fn reset(&mut self) {}
//! }
//!
//! let init = std::fs::read("init.mp4").unwrap();
//! let segment = std::fs::read("segment-1.m4s").unwrap();
//!
//! let mut extractor = EmbeddedCaptionExtractor::new();
//! extractor.attach(CaptionChannel::Cc1, Printer);
//! extractor.on_init_segment(&init).unwrap();
//! extractor.on_media_segment(&segment).unwrap();
//! ```

pub mod cea608;
pub mod continuity;
pub mod embedded;
pub mod error;
pub mod field;
pub mod nal;
pub mod sei;
pub mod text;

pub use cea608::{CcBytePair, Field};
pub use embedded::{
    scan_fragment, CaptionBatch, CaptionChannel, EmbeddedCaptionExtractor, FieldDecoder,
    FragmentOutcome, ProcessedFragment, SkipReason,
};
pub use error::{Error, Result};
pub use nal::SeiScanner;
pub use sei::SeiPayload;
pub use text::{
    parse_sidecar, CueSink, FragmentedTextTrack, ProcessedText, SampleTiming, TextCue,
    TextFormat, TextOutcome, TextParseError, TextParser,
};
