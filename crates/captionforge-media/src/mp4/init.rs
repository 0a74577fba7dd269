//! Initialization segment (ftyp + moov) parsing.

use super::{AtomType, BoxLookup, HandlerType, HdlrBox, IsoFile, MdhdBox, TkhdBox, TrexBox};
use crate::{Error, Result};

/// Per-sample defaults a fragment falls back on when its own boxes are silent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackDefaults {
    pub sample_duration: u32,
    pub sample_size: u32,
    pub sample_flags: u32,
}

impl From<TrexBox> for TrackDefaults {
    fn from(trex: TrexBox) -> Self {
        Self {
            sample_duration: trex.default_sample_duration,
            sample_size: trex.default_sample_size,
            sample_flags: trex.default_sample_flags,
        }
    }
}

/// Track information read from an initialization segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitSegment {
    /// Track ID from tkhd (0 if absent).
    pub track_id: u32,
    /// Handler type of the first track.
    pub handler_type: HandlerType,
    /// Media timescale (ticks per second).
    pub timescale: u32,
    /// Fragment defaults from mvex/trex.
    pub defaults: TrackDefaults,
}

impl InitSegment {
    /// Parse the first track of an initialization segment.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let file = IsoFile::parse(data);
        Self::from_lookup(&file)
    }

    /// Read the first track of an initialization segment through a box lookup.
    pub fn from_lookup(lookup: &impl BoxLookup) -> Result<Self> {
        if lookup.get_box(AtomType::MOOV).is_none() {
            return Err(Error::MissingAtom("moov"));
        }

        let mdhd = lookup
            .get_box(AtomType::MDHD)
            .ok_or(Error::MissingAtom("mdhd"))?;
        let mdhd = MdhdBox::parse(mdhd.payload)?;
        if mdhd.timescale == 0 {
            return Err(Error::invalid_mp4("mdhd timescale is zero"));
        }

        let track_id = match lookup.get_box(AtomType::TKHD) {
            Some(tkhd) => TkhdBox::parse(tkhd.payload)?.track_id,
            None => 0,
        };

        let handler_type = match lookup.get_box(AtomType::HDLR) {
            Some(hdlr) => HdlrBox::parse(hdlr.payload)?.handler_type,
            None => HandlerType::Unknown([0; 4]),
        };

        // Prefer the trex matching our track; fall back to the first one.
        let trexes = lookup
            .get_boxes(AtomType::TREX)
            .iter()
            .map(|view| TrexBox::parse(view.payload))
            .collect::<Result<Vec<_>>>()?;
        let defaults = trexes
            .iter()
            .find(|trex| trex.track_id == track_id)
            .or_else(|| trexes.first())
            .map(|&trex| TrackDefaults::from(trex))
            .unwrap_or_default();

        tracing::debug!(
            "Init segment: track {} ({:?}), timescale {}",
            track_id,
            handler_type,
            mdhd.timescale
        );

        Ok(Self {
            track_id,
            handler_type,
            timescale: mdhd.timescale,
            defaults,
        })
    }
}
