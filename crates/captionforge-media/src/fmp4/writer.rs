//! Fragmented MP4 serialization (init segment, moof + mdat).

use bytes::{BufMut, BytesMut};

// trun flags
const DATA_OFFSET_PRESENT: u32 = 0x000001;
const SAMPLE_DURATION_PRESENT: u32 = 0x000100;
const SAMPLE_SIZE_PRESENT: u32 = 0x000200;
const SAMPLE_CTO_PRESENT: u32 = 0x000800;

// tfhd flags
const DEFAULT_BASE_IS_MOOF: u32 = 0x020000;

/// Start a box with a size placeholder; returns the position to patch.
fn begin_box(buf: &mut BytesMut, name: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0); // placeholder
    buf.put_slice(name);
    start
}

/// Patch the size of a box started with [`begin_box`].
fn end_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

/// One sample to be written into a fragment.
#[derive(Debug, Clone)]
pub struct SampleSpec {
    data: Vec<u8>,
    duration: u32,
    composition_offset: i32,
}

impl SampleSpec {
    /// Create a sample from its payload and duration.
    pub fn new(data: Vec<u8>, duration: u32) -> Self {
        Self {
            data,
            duration,
            composition_offset: 0,
        }
    }

    /// Set the composition time offset.
    pub fn composition_offset(mut self, offset: i32) -> Self {
        self.composition_offset = offset;
        self
    }
}

/// Builder for a moof + mdat media fragment with a single track run.
#[derive(Debug, Clone)]
pub struct FragmentWriter {
    sequence_number: u32,
    track_id: u32,
    base_media_decode_time: u64,
    samples: Vec<SampleSpec>,
    write_tfdt: bool,
    trun_count: usize,
    sample_durations: bool,
}

impl FragmentWriter {
    /// Create a new fragment writer.
    pub fn new(sequence_number: u32) -> Self {
        Self {
            sequence_number,
            track_id: 1,
            base_media_decode_time: 0,
            samples: Vec::new(),
            write_tfdt: true,
            trun_count: 1,
            sample_durations: true,
        }
    }

    /// Set the track ID written to tfhd.
    pub fn track_id(mut self, track_id: u32) -> Self {
        self.track_id = track_id;
        self
    }

    /// Set base media decode time.
    pub fn base_media_decode_time(mut self, time: u64) -> Self {
        self.base_media_decode_time = time;
        self
    }

    /// Append a sample.
    pub fn sample(mut self, sample: SampleSpec) -> Self {
        self.samples.push(sample);
        self
    }

    /// Append several samples.
    pub fn samples(mut self, samples: impl IntoIterator<Item = SampleSpec>) -> Self {
        self.samples.extend(samples);
        self
    }

    /// Leave out the tfdt box.
    pub fn omit_tfdt(mut self) -> Self {
        self.write_tfdt = false;
        self
    }

    /// Leave out the trun box.
    pub fn omit_trun(mut self) -> Self {
        self.trun_count = 0;
        self
    }

    /// Follow the run with a second one listing only the last sample.
    pub fn duplicate_trun(mut self) -> Self {
        self.trun_count = 2;
        self
    }

    /// Leave per-sample durations out of the trun so readers fall back to defaults.
    pub fn without_sample_durations(mut self) -> Self {
        self.sample_durations = false;
        self
    }

    /// Serialize the moof box followed by an mdat holding every sample.
    pub fn build(self) -> Vec<u8> {
        let data_size: usize = self.samples.iter().map(|s| s.data.len()).sum();
        let mut buf = BytesMut::with_capacity(256 + self.samples.len() * 16 + data_size);

        let moof_start = begin_box(&mut buf, b"moof");
        self.write_mfhd(&mut buf);

        let traf_start = begin_box(&mut buf, b"traf");
        self.write_tfhd(&mut buf);
        if self.write_tfdt {
            self.write_tfdt(&mut buf);
        }
        let offset_positions: Vec<usize> = (0..self.trun_count)
            .map(|run| {
                let samples = match run {
                    0 => &self.samples[..],
                    _ => &self.samples[self.samples.len().saturating_sub(1)..],
                };
                self.write_trun(&mut buf, samples)
            })
            .collect();
        end_box(&mut buf, traf_start);
        end_box(&mut buf, moof_start);

        // With default-base-is-moof, data offsets are relative to the moof start.
        let data_offset = (buf.len() - moof_start + 8) as i32;
        for pos in offset_positions {
            buf[pos..pos + 4].copy_from_slice(&data_offset.to_be_bytes());
        }

        let mdat_start = begin_box(&mut buf, b"mdat");
        for sample in &self.samples {
            buf.put_slice(&sample.data);
        }
        end_box(&mut buf, mdat_start);

        buf.to_vec()
    }

    fn write_mfhd(&self, buf: &mut BytesMut) {
        buf.put_u32(16);
        buf.put_slice(b"mfhd");
        buf.put_u32(0); // version/flags
        buf.put_u32(self.sequence_number);
    }

    fn write_tfhd(&self, buf: &mut BytesMut) {
        buf.put_u32(16);
        buf.put_slice(b"tfhd");
        buf.put_u32(DEFAULT_BASE_IS_MOOF); // version 0, flags
        buf.put_u32(self.track_id);
    }

    fn write_tfdt(&self, buf: &mut BytesMut) {
        // Version 1 for 64-bit decode time
        buf.put_u32(20);
        buf.put_slice(b"tfdt");
        buf.put_u32(0x01000000);
        buf.put_u64(self.base_media_decode_time);
    }

    /// Write a version 1 trun; returns the position of its data offset field.
    fn write_trun(&self, buf: &mut BytesMut, samples: &[SampleSpec]) -> usize {
        let mut flags = DATA_OFFSET_PRESENT | SAMPLE_SIZE_PRESENT | SAMPLE_CTO_PRESENT;
        if self.sample_durations {
            flags |= SAMPLE_DURATION_PRESENT;
        }

        let trun_start = begin_box(buf, b"trun");
        buf.put_u32(0x01000000 | flags);
        buf.put_u32(samples.len() as u32);

        let data_offset_pos = buf.len();
        buf.put_i32(0); // placeholder

        for sample in samples {
            if self.sample_durations {
                buf.put_u32(sample.duration);
            }
            buf.put_u32(sample.data.len() as u32);
            buf.put_i32(sample.composition_offset);
        }
        end_box(buf, trun_start);

        data_offset_pos
    }
}

/// Builder for an ftyp + moov initialization segment describing one track.
#[derive(Debug, Clone)]
pub struct InitSegmentWriter {
    timescale: u32,
    track_id: u32,
    handler: [u8; 4],
    default_sample_duration: u32,
}

impl InitSegmentWriter {
    /// Create a writer for a video track with the given timescale.
    pub fn new(timescale: u32) -> Self {
        Self {
            timescale,
            track_id: 1,
            handler: *b"vide",
            default_sample_duration: 0,
        }
    }

    /// Set the track ID.
    pub fn track_id(mut self, track_id: u32) -> Self {
        self.track_id = track_id;
        self
    }

    /// Set the handler type (e.g. `vide`, `subt`, `text`).
    pub fn handler(mut self, handler: [u8; 4]) -> Self {
        self.handler = handler;
        self
    }

    /// Set the trex default sample duration.
    pub fn default_sample_duration(mut self, duration: u32) -> Self {
        self.default_sample_duration = duration;
        self
    }

    /// Serialize the initialization segment.
    pub fn build(self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(512);

        let ftyp = begin_box(&mut buf, b"ftyp");
        buf.put_slice(b"iso6");
        buf.put_u32(0);
        buf.put_slice(b"iso6");
        buf.put_slice(b"cmfc");
        end_box(&mut buf, ftyp);

        let moov = begin_box(&mut buf, b"moov");
        self.write_mvhd(&mut buf);

        let trak = begin_box(&mut buf, b"trak");
        self.write_tkhd(&mut buf);
        let mdia = begin_box(&mut buf, b"mdia");
        self.write_mdhd(&mut buf);
        self.write_hdlr(&mut buf);
        end_box(&mut buf, mdia);
        end_box(&mut buf, trak);

        let mvex = begin_box(&mut buf, b"mvex");
        self.write_trex(&mut buf);
        end_box(&mut buf, mvex);
        end_box(&mut buf, moov);

        buf.to_vec()
    }

    fn write_mvhd(&self, buf: &mut BytesMut) {
        let start = begin_box(buf, b"mvhd");
        buf.put_u32(0); // version/flags
        buf.put_u32(0); // creation_time
        buf.put_u32(0); // modification_time
        buf.put_u32(1000); // timescale
        buf.put_u32(0); // duration
        buf.put_u32(0x00010000); // rate 1.0
        buf.put_u16(0x0100); // volume 1.0
        buf.put_slice(&[0; 10]);
        write_unity_matrix(buf);
        buf.put_slice(&[0; 24]);
        buf.put_u32(self.track_id + 1); // next_track_ID
        end_box(buf, start);
    }

    fn write_tkhd(&self, buf: &mut BytesMut) {
        let start = begin_box(buf, b"tkhd");
        buf.put_u32(0x00000003); // enabled, in movie
        buf.put_u32(0); // creation_time
        buf.put_u32(0); // modification_time
        buf.put_u32(self.track_id);
        buf.put_u32(0); // reserved
        buf.put_u32(0); // duration
        buf.put_slice(&[0; 8]);
        buf.put_u16(0); // layer
        buf.put_u16(0); // alternate_group
        buf.put_u16(0); // volume
        buf.put_u16(0); // reserved
        write_unity_matrix(buf);
        buf.put_u32(0); // width
        buf.put_u32(0); // height
        end_box(buf, start);
    }

    fn write_mdhd(&self, buf: &mut BytesMut) {
        let start = begin_box(buf, b"mdhd");
        buf.put_u32(0); // version/flags
        buf.put_u32(0); // creation_time
        buf.put_u32(0); // modification_time
        buf.put_u32(self.timescale);
        buf.put_u32(0); // duration
        buf.put_u16(0x55C4); // language "und"
        buf.put_u16(0);
        end_box(buf, start);
    }

    fn write_hdlr(&self, buf: &mut BytesMut) {
        let start = begin_box(buf, b"hdlr");
        buf.put_u32(0); // version/flags
        buf.put_u32(0); // pre_defined
        buf.put_slice(&self.handler);
        buf.put_slice(&[0; 12]);
        buf.put_u8(0); // empty name
        end_box(buf, start);
    }

    fn write_trex(&self, buf: &mut BytesMut) {
        let start = begin_box(buf, b"trex");
        buf.put_u32(0); // version/flags
        buf.put_u32(self.track_id);
        buf.put_u32(1); // default_sample_description_index
        buf.put_u32(self.default_sample_duration);
        buf.put_u32(0); // default_sample_size
        buf.put_u32(0); // default_sample_flags
        end_box(buf, start);
    }
}

fn write_unity_matrix(buf: &mut BytesMut) {
    for value in [0x00010000u32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
        buf.put_u32(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::{AtomType, BoxLookup, HandlerType, InitSegment, IsoFile};

    #[test]
    fn test_fragment_layout() {
        let data = FragmentWriter::new(1)
            .sample(SampleSpec::new(vec![0xAA; 5], 100))
            .build();

        assert_eq!(&data[4..8], b"moof");
        let file = IsoFile::parse(&data);
        let mdat = file.get_box(AtomType::MDAT).unwrap();
        assert_eq!(mdat.payload, &[0xAA; 5]);
        assert_eq!(mdat.atom.end(), data.len());
    }

    #[test]
    fn test_init_segment_round_trip() {
        let data = InitSegmentWriter::new(90_000)
            .track_id(2)
            .default_sample_duration(3003)
            .build();

        let init = InitSegment::parse(&data).unwrap();
        assert_eq!(init.timescale, 90_000);
        assert_eq!(init.track_id, 2);
        assert_eq!(init.handler_type, HandlerType::Video);
        assert_eq!(init.defaults.sample_duration, 3003);
    }
}
