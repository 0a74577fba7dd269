//! H.264 NAL unit walking for length-prefixed (AVCC) samples

use crate::sei::{decode_sei_value, SeiPayload};
use crate::{Error, Result};

/// Size of the big-endian length prefix in front of every NAL unit
pub const NAL_LENGTH_SIZE: usize = 4;

/// H.264 NAL unit types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture
    Slice,
    /// Coded slice data partition A
    SliceDataA,
    SliceDataB,
    SliceDataC,
    /// Coded slice of an IDR picture
    Idr,
    /// Supplemental Enhancement Information
    Sei,
    /// Sequence Parameter Set
    Sps,
    /// Picture Parameter Set
    Pps,
    /// Access Unit Delimiter
    Aud,
    EndOfSequence,
    EndOfStream,
    FillerData,
    /// Unknown/other
    Unknown(u8),
}

impl From<u8> for NalUnitType {
    /// Classify from a NAL header byte; only the low 5 bits are significant.
    fn from(value: u8) -> Self {
        match value & 0x1F {
            1 => NalUnitType::Slice,
            2 => NalUnitType::SliceDataA,
            3 => NalUnitType::SliceDataB,
            4 => NalUnitType::SliceDataC,
            5 => NalUnitType::Idr,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::Aud,
            10 => NalUnitType::EndOfSequence,
            11 => NalUnitType::EndOfStream,
            12 => NalUnitType::FillerData,
            v => NalUnitType::Unknown(v),
        }
    }
}

impl NalUnitType {
    /// The 5-bit type code
    pub fn code(&self) -> u8 {
        match self {
            NalUnitType::Slice => 1,
            NalUnitType::SliceDataA => 2,
            NalUnitType::SliceDataB => 3,
            NalUnitType::SliceDataC => 4,
            NalUnitType::Idr => 5,
            NalUnitType::Sei => 6,
            NalUnitType::Sps => 7,
            NalUnitType::Pps => 8,
            NalUnitType::Aud => 9,
            NalUnitType::EndOfSequence => 10,
            NalUnitType::EndOfStream => 11,
            NalUnitType::FillerData => 12,
            NalUnitType::Unknown(v) => *v & 0x1F,
        }
    }

    /// Header byte with forbidden bit and nal_ref_idc cleared
    pub fn header_byte(&self) -> u8 {
        self.code()
    }
}

/// Body of the SEI unit currently being walked
#[derive(Debug, Clone, Copy)]
struct SeiUnit {
    cursor: usize,
    end: usize,
}

/// Lazily yields the SEI payloads of one sample.
///
/// Non-SEI units are stepped over by their length prefix. A length that runs
/// past the unit or the sample yields a single
/// [`Error::TruncatedNalUnit`], after which the scanner is exhausted.
#[derive(Debug, Clone)]
pub struct SeiScanner<'a> {
    data: &'a [u8],
    pos: usize,
    unit: Option<SeiUnit>,
    done: bool,
}

impl<'a> SeiScanner<'a> {
    pub fn new(sample: &'a [u8]) -> Self {
        Self {
            data: sample,
            pos: 0,
            unit: None,
            done: false,
        }
    }

    fn truncated(&mut self, offset: usize, needed: usize, available: usize) -> Option<Result<SeiPayload>> {
        self.done = true;
        self.unit = None;
        Some(Err(Error::TruncatedNalUnit {
            offset,
            needed,
            available,
        }))
    }

    /// Next payload of the current SEI unit, or `None` once its body is consumed.
    fn next_payload(&mut self, unit: SeiUnit) -> Option<Result<SeiPayload>> {
        // The last byte of the unit holds the RBSP trailing bits.
        if unit.cursor + 1 >= unit.end {
            self.unit = None;
            return None;
        }

        let body = &self.data[unit.cursor..unit.end];
        let Some((payload_type, type_len)) = decode_sei_value(body) else {
            return self.truncated(unit.cursor, body.len() + 1, body.len());
        };
        let Some((size, size_len)) = decode_sei_value(&body[type_len..]) else {
            return self.truncated(unit.cursor, body.len() + 1, body.len());
        };

        let offset = unit.cursor + type_len + size_len;
        let size = size as usize;
        let available = unit.end - offset;
        if size > available {
            return self.truncated(offset, size, available);
        }

        self.unit = Some(SeiUnit {
            cursor: offset + size,
            end: unit.end,
        });
        Some(Ok(SeiPayload {
            offset,
            size,
            payload_type,
        }))
    }
}

impl Iterator for SeiScanner<'_> {
    type Item = Result<SeiPayload>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some(unit) = self.unit {
                if let Some(item) = self.next_payload(unit) {
                    return Some(item);
                }
                continue;
            }

            let remaining = self.data.len() - self.pos;
            if remaining == 0 {
                self.done = true;
                return None;
            }
            if remaining < NAL_LENGTH_SIZE {
                return self.truncated(self.pos, NAL_LENGTH_SIZE, remaining);
            }

            let prefix = &self.data[self.pos..self.pos + NAL_LENGTH_SIZE];
            let length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
            let start = self.pos + NAL_LENGTH_SIZE;
            let available = self.data.len() - start;
            if length > available {
                return self.truncated(start, length, available);
            }
            self.pos = start + length;

            if length == 0 {
                continue;
            }
            if NalUnitType::from(self.data[start]) == NalUnitType::Sei {
                self.unit = Some(SeiUnit {
                    cursor: start + 1,
                    end: start + length,
                });
            }
        }
    }
}

impl std::iter::FusedIterator for SeiScanner<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sei::{length_prefixed_nal, SeiWriter};

    fn payloads(sample: &[u8]) -> Vec<Result<SeiPayload>> {
        SeiScanner::new(sample).collect()
    }

    #[test]
    fn test_nal_type_from_header_byte() {
        assert_eq!(NalUnitType::from(0x06), NalUnitType::Sei);
        assert_eq!(NalUnitType::from(0x65), NalUnitType::Idr);
        assert_eq!(NalUnitType::from(0x67), NalUnitType::Sps);
        assert_eq!(NalUnitType::from(0x1E), NalUnitType::Unknown(30));
        assert_eq!(NalUnitType::Sei.header_byte(), 0x06);
    }

    #[test]
    fn test_skips_non_sei_units() {
        let mut sample = length_prefixed_nal(0x65, &[0xAA; 16]);
        sample.extend(SeiWriter::new().payload(4, vec![1, 2, 3]).build());
        sample.extend(length_prefixed_nal(0x41, &[0xBB; 8]));

        let found = payloads(&sample);
        assert_eq!(found.len(), 1);
        let payload = *found[0].as_ref().unwrap();
        assert_eq!(payload.payload_type, 4);
        assert_eq!(payload.bytes(&sample), &[1, 2, 3]);
    }

    #[test]
    fn test_multiple_payloads_in_one_unit() {
        let sample = SeiWriter::new()
            .payload(5, vec![9; 300])
            .payload(4, vec![7; 2])
            .build();

        let found: Vec<SeiPayload> = SeiScanner::new(&sample).map(|p| p.unwrap()).collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].payload_type, 5);
        assert_eq!(found[0].size, 300);
        assert_eq!(found[1].payload_type, 4);
        assert_eq!(found[1].bytes(&sample), &[7, 7]);
    }

    #[test]
    fn test_zero_length_nal_skipped() {
        let mut sample = vec![0, 0, 0, 0];
        sample.extend(SeiWriter::new().payload(4, vec![1]).build());
        assert_eq!(payloads(&sample).len(), 1);
    }

    #[test]
    fn test_length_past_sample_is_truncated() {
        let mut sample = SeiWriter::new().payload(4, vec![1]).build();
        sample.extend([0, 0, 1, 0, 0x06, 0x04]);

        let found = payloads(&sample);
        assert_eq!(found.len(), 2);
        assert!(found[0].is_ok());
        assert!(matches!(
            found[1],
            Err(Error::TruncatedNalUnit {
                needed: 256,
                available: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_payload_size_past_unit_is_truncated() {
        // type 4, size 10, but only 2 bytes before the trailing bits
        let sample = length_prefixed_nal(0x06, &[0x04, 0x0A, 0x01, 0x02, 0x80]);
        let mut scanner = SeiScanner::new(&sample);
        assert!(matches!(
            scanner.next(),
            Some(Err(Error::TruncatedNalUnit { needed: 10, .. }))
        ));
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_short_length_prefix_is_truncated() {
        let found = payloads(&[0, 0, 1]);
        assert_eq!(found.len(), 1);
        assert!(found[0].is_err());
    }

    #[test]
    fn test_sample_without_sei() {
        let sample = length_prefixed_nal(0x65, &[0x88; 32]);
        assert!(payloads(&sample).is_empty());
        assert!(payloads(&[]).is_empty());
    }
}
