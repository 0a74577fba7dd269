//! Fragmented MP4 serialization.
//!
//! Writers for initialization segments and single-run media fragments, used
//! to build fixtures for the extraction paths.

mod writer;

pub use writer::{FragmentWriter, InitSegmentWriter, SampleSpec};
