//! Media fragment (moof + mdat) field extraction.
//!
//! Reads the sequence number, base decode time and the first track run of a
//! fragment and resolves each sample to a byte range of the fragment buffer.

use crate::mp4::{
    AtomType, BoxLookup, IsoFile, MfhdBox, TfdtBox, TfhdBox, TrackDefaults, TrunBox,
};
use crate::timeline::{decode_span, fragment_end_time};
use crate::{Error, Result};
use std::ops::Range;

/// One access unit of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FragmentSample {
    /// Byte offset of the sample within the fragment buffer.
    pub offset: usize,
    /// Sample size in bytes.
    pub size: u32,
    /// Sample duration in track timescale units.
    pub duration: u32,
    /// Composition time offset in track timescale units.
    pub composition_offset: i32,
}

impl FragmentSample {
    /// Byte range of the sample within the fragment buffer.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset.saturating_add(self.size as usize)
    }

    /// The sample's bytes, or `None` if the range runs past the buffer.
    pub fn bytes<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        data.get(self.range())
    }
}

/// Fields of a media fragment needed for caption extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FragmentInfo {
    /// Sequence number from mfhd.
    pub sequence_number: u32,
    /// Base media decode time from tfdt; `None` when tfdt is missing or unreadable.
    pub base_decode_time: Option<u64>,
    /// Samples of the first track run, in decode order.
    pub samples: Vec<FragmentSample>,
}

impl FragmentInfo {
    /// Index the buffer and extract the fragment fields.
    pub fn parse(data: &[u8], defaults: &TrackDefaults) -> Result<Self> {
        let file = IsoFile::parse(data);
        extract_fragment(&file, defaults)
    }

    /// Decode time just past the last sample, when the base time is known.
    pub fn end_time(&self) -> Option<u64> {
        fragment_end_time(self.base_decode_time?, &self.samples)
    }

    /// Base and end decode time as signed ticks, when the base time is known.
    pub fn decode_span(&self) -> Option<(i64, i64)> {
        decode_span(self.base_decode_time?, &self.samples)
    }

    /// Whether the fragment carries no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Extract sequence number, decode time and sample run from a fragment.
///
/// Fails with [`Error::MalformedFragment`] when moof, mfhd or trun is missing
/// or unreadable. A missing tfdt is not an error; it leaves
/// `base_decode_time` unset. When a fragment holds several track runs only
/// the first is used. A run whose decode times leave the signed 64-bit tick
/// range is malformed.
pub fn extract_fragment(lookup: &impl BoxLookup, defaults: &TrackDefaults) -> Result<FragmentInfo> {
    let moof = lookup
        .get_box(AtomType::MOOF)
        .ok_or_else(|| Error::malformed("no moof box"))?;

    let mfhd = lookup
        .get_box(AtomType::MFHD)
        .ok_or_else(|| Error::malformed("no mfhd box"))?;
    let sequence_number = MfhdBox::parse(mfhd.payload)
        .map_err(|e| Error::malformed(format!("unreadable mfhd: {}", e)))?
        .sequence_number;

    let truns = lookup.get_boxes(AtomType::TRUN);
    let trun = truns
        .first()
        .ok_or_else(|| Error::malformed(format!("fragment {} has no trun box", sequence_number)))?;
    if truns.len() > 1 {
        tracing::warn!(
            "Fragment {} has {} trun boxes, using the first",
            sequence_number,
            truns.len()
        );
    }
    let trun = TrunBox::parse(trun.payload)
        .map_err(|e| Error::malformed(format!("unreadable trun: {}", e)))?;

    let tfhd = match lookup.get_box(AtomType::TFHD) {
        Some(view) => TfhdBox::parse(view.payload)
            .map_err(|e| Error::malformed(format!("unreadable tfhd: {}", e)))?,
        None => TfhdBox::default(),
    };

    let base_decode_time = match lookup.get_box(AtomType::TFDT) {
        Some(view) => match TfdtBox::parse(view.payload) {
            Ok(tfdt) => Some(tfdt.base_media_decode_time),
            Err(e) => {
                tracing::warn!("Fragment {}: ignoring unreadable tfdt: {}", sequence_number, e);
                None
            }
        },
        None => None,
    };

    let base_offset = match tfhd.base_data_offset {
        Some(offset) => usize::try_from(offset)
            .map_err(|_| Error::malformed(format!("base data offset {} out of range", offset)))?,
        None => moof.offset(),
    };
    let data_offset = i64::from(trun.data_offset.unwrap_or(0));
    let first_offset = i64::try_from(base_offset)
        .ok()
        .and_then(|base| base.checked_add(data_offset))
        .and_then(|offset| usize::try_from(offset).ok())
        .ok_or_else(|| {
            Error::malformed(format!(
                "trun data offset {} from base {} is out of range",
                data_offset, base_offset
            ))
        })?;

    let default_duration = tfhd
        .default_sample_duration
        .unwrap_or(defaults.sample_duration);
    let default_size = tfhd.default_sample_size.unwrap_or(defaults.sample_size);

    let mut samples = Vec::with_capacity(trun.samples.len());
    let mut offset = first_offset;
    for entry in &trun.samples {
        let sample = FragmentSample {
            offset,
            size: entry.size.unwrap_or(default_size),
            duration: entry.duration.unwrap_or(default_duration),
            composition_offset: entry.composition_time_offset.unwrap_or(0),
        };
        offset = offset.saturating_add(sample.size as usize);
        samples.push(sample);
    }

    if let Some(base) = base_decode_time {
        if decode_span(base, &samples).is_none() {
            return Err(Error::malformed(format!(
                "fragment {} decode times overflow from base {}",
                sequence_number, base
            )));
        }
    }

    tracing::trace!(
        "Fragment {}: {} samples, base decode time {:?}",
        sequence_number,
        samples.len(),
        base_decode_time
    );

    Ok(FragmentInfo {
        sequence_number,
        base_decode_time,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fmp4::{FragmentWriter, SampleSpec};

    #[test]
    fn test_extract_offsets_and_timing() {
        let data = FragmentWriter::new(7)
            .base_media_decode_time(90_000)
            .sample(SampleSpec::new(vec![1; 10], 3000))
            .sample(SampleSpec::new(vec![2; 20], 3000).composition_offset(1500))
            .build();

        let info = FragmentInfo::parse(&data, &TrackDefaults::default()).unwrap();
        assert_eq!(info.sequence_number, 7);
        assert_eq!(info.base_decode_time, Some(90_000));
        assert_eq!(info.samples.len(), 2);
        assert_eq!(info.samples[0].bytes(&data).unwrap(), &[1; 10]);
        assert_eq!(info.samples[1].bytes(&data).unwrap(), &[2; 20]);
        assert_eq!(info.samples[1].composition_offset, 1500);
        assert_eq!(info.end_time(), Some(96_000));
        assert_eq!(info.decode_span(), Some((90_000, 96_000)));
    }

    #[test]
    fn test_several_runs_use_the_first() {
        let data = FragmentWriter::new(5)
            .base_media_decode_time(1000)
            .sample(SampleSpec::new(vec![1; 4], 100))
            .sample(SampleSpec::new(vec![2; 6], 100))
            .duplicate_trun()
            .build();

        let info = FragmentInfo::parse(&data, &TrackDefaults::default()).unwrap();
        assert_eq!(info.samples.len(), 2);
        assert_eq!(info.samples[0].bytes(&data).unwrap(), &[1; 4]);
        assert_eq!(info.samples[1].bytes(&data).unwrap(), &[2; 6]);
        assert_eq!(info.end_time(), Some(1200));
    }

    #[test]
    fn test_decode_time_overflow_is_malformed() {
        for base in [u64::MAX, 1 << 63] {
            let data = FragmentWriter::new(1)
                .base_media_decode_time(base)
                .sample(SampleSpec::new(vec![0; 4], 1000))
                .build();
            let err = FragmentInfo::parse(&data, &TrackDefaults::default()).unwrap_err();
            assert!(matches!(err, Error::MalformedFragment(_)));
        }
    }

    #[test]
    fn test_defaulted_run_count_is_bounded() {
        let mut data = FragmentWriter::new(1).omit_trun().build();
        // A trun with no per-sample fields claiming u32::MAX samples
        let trun = [0, 0, 0, 16, b't', b'r', b'u', b'n', 0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF];
        data.extend_from_slice(&trun);
        let err = FragmentInfo::parse(&data, &TrackDefaults::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedFragment(_)));
    }

    #[test]
    fn test_missing_trun_is_malformed() {
        let data = FragmentWriter::new(1).omit_trun().build();
        let err = FragmentInfo::parse(&data, &TrackDefaults::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedFragment(_)));
    }

    #[test]
    fn test_missing_tfdt_leaves_time_unset() {
        let data = FragmentWriter::new(3)
            .omit_tfdt()
            .sample(SampleSpec::new(vec![0; 4], 1000))
            .build();
        let info = FragmentInfo::parse(&data, &TrackDefaults::default()).unwrap();
        assert_eq!(info.base_decode_time, None);
        assert_eq!(info.end_time(), None);
        assert_eq!(info.samples.len(), 1);
    }

    #[test]
    fn test_empty_run_is_valid() {
        let data = FragmentWriter::new(2).build();
        let info = FragmentInfo::parse(&data, &TrackDefaults::default()).unwrap();
        assert!(info.is_empty());
        assert_eq!(info.end_time(), Some(0));
    }

    #[test]
    fn test_not_a_fragment() {
        let err = FragmentInfo::parse(b"garbage", &TrackDefaults::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedFragment(_)));
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let defaults = TrackDefaults {
            sample_duration: 1001,
            sample_size: 0,
            sample_flags: 0,
        };
        let data = FragmentWriter::new(4)
            .without_sample_durations()
            .sample(SampleSpec::new(vec![9; 3], 0))
            .build();
        let info = FragmentInfo::parse(&data, &defaults).unwrap();
        assert_eq!(info.samples[0].duration, 1001);
        assert_eq!(info.samples[0].size, 3);
    }
}
