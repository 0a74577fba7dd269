//! MP4 box parsing.
//!
//! This module indexes in-memory fMP4 buffers and reads the few box fields
//! caption extraction depends on: sequence numbers, decode times, run tables
//! and the track timescale.

mod atoms;
mod boxes;
mod fields;
mod init;

pub use atoms::{Atom, AtomType, HandlerType};
pub use boxes::{BoxLookup, BoxView, IsoFile};
pub use fields::{
    HdlrBox, MdhdBox, MfhdBox, TfdtBox, TfhdBox, TkhdBox, TrexBox, TrunBox, TrunSample,
};
pub use init::{InitSegment, TrackDefaults};
