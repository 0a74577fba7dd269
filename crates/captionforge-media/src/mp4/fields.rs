//! Field readers for the handful of boxes caption extraction needs.
//!
//! Every reader takes the box payload (after the 8/16 byte header) and checks
//! the remaining length before each multi-byte read.

use super::HandlerType;
use crate::{Error, Result};
use bytes::Buf;

const TFHD_BASE_DATA_OFFSET: u32 = 0x000001;
const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x000002;
const TFHD_DEFAULT_SAMPLE_DURATION: u32 = 0x000008;
const TFHD_DEFAULT_SAMPLE_SIZE: u32 = 0x000010;
const TFHD_DEFAULT_SAMPLE_FLAGS: u32 = 0x000020;
const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x020000;

const TRUN_DATA_OFFSET: u32 = 0x000001;
const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x000004;
const TRUN_SAMPLE_DURATION: u32 = 0x000100;
const TRUN_SAMPLE_SIZE: u32 = 0x000200;
const TRUN_SAMPLE_FLAGS: u32 = 0x000400;
const TRUN_SAMPLE_CTO: u32 = 0x000800;

/// Most samples accepted from a run that carries no per-sample table.
pub const MAX_DEFAULTED_TRUN_SAMPLES: usize = 1 << 20;

fn ensure(buf: &[u8], need: usize, atom: &'static str) -> Result<()> {
    if buf.remaining() < need {
        return Err(Error::BufferUnderflow {
            atom,
            need,
            have: buf.remaining(),
        });
    }
    Ok(())
}

/// Read the version byte and 24-bit flags of a full box.
fn full_box_header(buf: &mut &[u8], atom: &'static str) -> Result<(u8, u32)> {
    ensure(*buf, 4, atom)?;
    let word = buf.get_u32();
    Ok(((word >> 24) as u8, word & 0x00FF_FFFF))
}

fn read_u32(buf: &mut &[u8], atom: &'static str) -> Result<u32> {
    ensure(*buf, 4, atom)?;
    Ok(buf.get_u32())
}

fn read_u64(buf: &mut &[u8], atom: &'static str) -> Result<u64> {
    ensure(*buf, 8, atom)?;
    Ok(buf.get_u64())
}

/// Movie fragment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MfhdBox {
    pub sequence_number: u32,
}

impl MfhdBox {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        full_box_header(&mut buf, "mfhd")?;
        let sequence_number = read_u32(&mut buf, "mfhd")?;
        Ok(Self { sequence_number })
    }
}

/// Track fragment base media decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TfdtBox {
    pub base_media_decode_time: u64,
}

impl TfdtBox {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        let (version, _) = full_box_header(&mut buf, "tfdt")?;
        let base_media_decode_time = if version == 1 {
            read_u64(&mut buf, "tfdt")?
        } else {
            read_u32(&mut buf, "tfdt")? as u64
        };
        Ok(Self {
            base_media_decode_time,
        })
    }
}

/// Track fragment header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TfhdBox {
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
    pub default_base_is_moof: bool,
}

impl TfhdBox {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        let (_, flags) = full_box_header(&mut buf, "tfhd")?;
        let track_id = read_u32(&mut buf, "tfhd")?;

        let mut tfhd = Self {
            track_id,
            default_base_is_moof: flags & TFHD_DEFAULT_BASE_IS_MOOF != 0,
            ..Self::default()
        };

        if flags & TFHD_BASE_DATA_OFFSET != 0 {
            tfhd.base_data_offset = Some(read_u64(&mut buf, "tfhd")?);
        }
        if flags & TFHD_SAMPLE_DESCRIPTION_INDEX != 0 {
            tfhd.sample_description_index = Some(read_u32(&mut buf, "tfhd")?);
        }
        if flags & TFHD_DEFAULT_SAMPLE_DURATION != 0 {
            tfhd.default_sample_duration = Some(read_u32(&mut buf, "tfhd")?);
        }
        if flags & TFHD_DEFAULT_SAMPLE_SIZE != 0 {
            tfhd.default_sample_size = Some(read_u32(&mut buf, "tfhd")?);
        }
        if flags & TFHD_DEFAULT_SAMPLE_FLAGS != 0 {
            tfhd.default_sample_flags = Some(read_u32(&mut buf, "tfhd")?);
        }

        Ok(tfhd)
    }
}

/// One entry of a track run. Absent fields fall back to track defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrunSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub composition_time_offset: Option<i32>,
}

/// Track fragment run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrunBox {
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub samples: Vec<TrunSample>,
}

impl TrunBox {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        let (version, flags) = full_box_header(&mut buf, "trun")?;
        let sample_count = read_u32(&mut buf, "trun")? as usize;

        let mut trun = Self::default();
        if flags & TRUN_DATA_OFFSET != 0 {
            trun.data_offset = Some(read_u32(&mut buf, "trun")? as i32);
        }
        if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
            trun.first_sample_flags = Some(read_u32(&mut buf, "trun")?);
        }

        let per_sample = [
            TRUN_SAMPLE_DURATION,
            TRUN_SAMPLE_SIZE,
            TRUN_SAMPLE_FLAGS,
            TRUN_SAMPLE_CTO,
        ]
        .iter()
        .filter(|&&f| flags & f != 0)
        .count()
            * 4;

        // Reject counts the payload cannot hold before allocating for them.
        ensure(buf, sample_count.saturating_mul(per_sample), "trun")?;
        if per_sample == 0 && sample_count > MAX_DEFAULTED_TRUN_SAMPLES {
            return Err(Error::invalid_mp4(format!(
                "trun declares {} samples without a sample table",
                sample_count
            )));
        }

        trun.samples.reserve(sample_count);
        for _ in 0..sample_count {
            let mut sample = TrunSample::default();
            if flags & TRUN_SAMPLE_DURATION != 0 {
                sample.duration = Some(buf.get_u32());
            }
            if flags & TRUN_SAMPLE_SIZE != 0 {
                sample.size = Some(buf.get_u32());
            }
            if flags & TRUN_SAMPLE_FLAGS != 0 {
                sample.flags = Some(buf.get_u32());
            }
            if flags & TRUN_SAMPLE_CTO != 0 {
                sample.composition_time_offset = Some(if version == 0 {
                    buf.get_u32() as i32
                } else {
                    buf.get_i32()
                });
            }
            trun.samples.push(sample);
        }

        Ok(trun)
    }
}

/// Media header; only the timescale and duration are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MdhdBox {
    pub timescale: u32,
    pub duration: u64,
}

impl MdhdBox {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        let (version, _) = full_box_header(&mut buf, "mdhd")?;
        if version == 1 {
            // creation_time, modification_time
            ensure(buf, 16, "mdhd")?;
            buf.advance(16);
            let timescale = read_u32(&mut buf, "mdhd")?;
            let duration = read_u64(&mut buf, "mdhd")?;
            Ok(Self {
                timescale,
                duration,
            })
        } else {
            ensure(buf, 8, "mdhd")?;
            buf.advance(8);
            let timescale = read_u32(&mut buf, "mdhd")?;
            let duration = read_u32(&mut buf, "mdhd")? as u64;
            Ok(Self {
                timescale,
                duration,
            })
        }
    }
}

/// Track header; only the track id is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TkhdBox {
    pub track_id: u32,
}

impl TkhdBox {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        let (version, _) = full_box_header(&mut buf, "tkhd")?;
        let skip = if version == 1 { 16 } else { 8 };
        ensure(buf, skip, "tkhd")?;
        buf.advance(skip);
        let track_id = read_u32(&mut buf, "tkhd")?;
        Ok(Self { track_id })
    }
}

/// Handler reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdlrBox {
    pub handler_type: HandlerType,
}

impl HdlrBox {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        full_box_header(&mut buf, "hdlr")?;
        // pre_defined
        read_u32(&mut buf, "hdlr")?;
        let handler = read_u32(&mut buf, "hdlr")?;
        Ok(Self {
            handler_type: HandlerType::from_bytes(handler.to_be_bytes()),
        })
    }
}

/// Track extends defaults, declared once in the initialization segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrexBox {
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

impl TrexBox {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        full_box_header(&mut buf, "trex")?;
        ensure(buf, 20, "trex")?;
        Ok(Self {
            track_id: buf.get_u32(),
            default_sample_description_index: buf.get_u32(),
            default_sample_duration: buf.get_u32(),
            default_sample_size: buf.get_u32(),
            default_sample_flags: buf.get_u32(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tfdt_versions() {
        let v0 = [0, 0, 0, 0, 0, 0, 0x03, 0xE8];
        assert_eq!(TfdtBox::parse(&v0).unwrap().base_media_decode_time, 1000);

        let mut v1 = vec![1, 0, 0, 0];
        v1.extend_from_slice(&0x1_0000_0000u64.to_be_bytes());
        assert_eq!(
            TfdtBox::parse(&v1).unwrap().base_media_decode_time,
            0x1_0000_0000
        );
    }

    #[test]
    fn test_tfdt_truncated() {
        let err = TfdtBox::parse(&[1, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferUnderflow {
                atom: "tfdt",
                need: 8,
                have: 2
            }
        ));
    }

    #[test]
    fn test_trun_all_fields() {
        let flags = TRUN_DATA_OFFSET | TRUN_SAMPLE_DURATION | TRUN_SAMPLE_SIZE | TRUN_SAMPLE_CTO;
        let mut payload = (0x0100_0000u32 | flags).to_be_bytes().to_vec();
        payload.extend_from_slice(&2u32.to_be_bytes());
        payload.extend_from_slice(&120i32.to_be_bytes());
        for (dur, size, cto) in [(3000u32, 10u32, 0i32), (3000, 20, -1500)] {
            payload.extend_from_slice(&dur.to_be_bytes());
            payload.extend_from_slice(&size.to_be_bytes());
            payload.extend_from_slice(&cto.to_be_bytes());
        }

        let trun = TrunBox::parse(&payload).unwrap();
        assert_eq!(trun.data_offset, Some(120));
        assert_eq!(trun.samples.len(), 2);
        assert_eq!(trun.samples[1].size, Some(20));
        assert_eq!(trun.samples[1].composition_time_offset, Some(-1500));
        assert_eq!(trun.samples[0].flags, None);
    }

    #[test]
    fn test_trun_count_exceeds_payload() {
        let mut payload = TRUN_SAMPLE_SIZE.to_be_bytes().to_vec();
        payload.extend_from_slice(&1_000_000u32.to_be_bytes());
        payload.extend_from_slice(&[0; 8]);
        assert!(matches!(
            TrunBox::parse(&payload),
            Err(Error::BufferUnderflow { atom: "trun", .. })
        ));
    }

    #[test]
    fn test_trun_count_without_sample_table() {
        let err = TrunBox::parse(&[0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, Error::InvalidMp4(_)));

        let mut payload = vec![0, 0, 0, 0];
        payload.extend_from_slice(&(MAX_DEFAULTED_TRUN_SAMPLES as u32).to_be_bytes());
        let trun = TrunBox::parse(&payload).unwrap();
        assert_eq!(trun.samples.len(), MAX_DEFAULTED_TRUN_SAMPLES);
        assert_eq!(trun.samples[0], TrunSample::default());
    }

    #[test]
    fn test_tfhd_defaults() {
        let flags = TFHD_DEFAULT_SAMPLE_DURATION | TFHD_DEFAULT_SAMPLE_SIZE | TFHD_DEFAULT_BASE_IS_MOOF;
        let mut payload = flags.to_be_bytes().to_vec();
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&1001u32.to_be_bytes());
        payload.extend_from_slice(&64u32.to_be_bytes());

        let tfhd = TfhdBox::parse(&payload).unwrap();
        assert_eq!(tfhd.track_id, 1);
        assert_eq!(tfhd.default_sample_duration, Some(1001));
        assert_eq!(tfhd.default_sample_size, Some(64));
        assert_eq!(tfhd.base_data_offset, None);
        assert!(tfhd.default_base_is_moof);
    }

    #[test]
    fn test_mdhd_v0() {
        let mut payload = vec![0u8; 12];
        payload.extend_from_slice(&90000u32.to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&[0; 4]);
        assert_eq!(MdhdBox::parse(&payload).unwrap().timescale, 90000);
    }
}
