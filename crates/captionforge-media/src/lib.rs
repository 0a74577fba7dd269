//! Captionforge-Media: fMP4 fragment fields, timeline normalization and buffered ranges
//!
//! This crate is the container side of caption extraction. It never copies
//! sample data: fragment buffers are borrowed for one call and everything
//! derived from them (offsets, timings) is returned by value.
//!
//! # Modules
//!
//! - `mp4` - Box indexing and field readers (mfhd, tfhd, tfdt, trun, mdhd, trex)
//! - `fragment` - Sequence number, decode time and sample run of a media fragment
//! - `timeline` - Absolute decode times, tick conversion and the out-of-band anchor
//! - `ranges` - Buffered presentation-time ranges
//! - `fmp4` - Init segment and media fragment writers

pub mod error;
pub mod fmp4;
pub mod fragment;
pub mod mp4;
pub mod ranges;
pub mod timeline;

pub use error::{Error, Result};
pub use fragment::{extract_fragment, FragmentInfo, FragmentSample};
pub use mp4::{InitSegment, TrackDefaults};
pub use ranges::{BufferedRanges, TimeRange};
pub use timeline::{Timescale, TimelineAnchor};
