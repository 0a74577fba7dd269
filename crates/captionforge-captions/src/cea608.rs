//! CEA-608 byte pairs carried in ATSC A/53 (GA94) `cc_data()` SEI payloads
//!
//! A registered user data payload opens with an 8 byte signature
//! (T.35 country code, provider code, `GA94`, user data type `0x03`)
//! followed by the `cc_data()` structure:
//!
//! ```text
//! process_em_data_flag(1) process_cc_data_flag(1) additional_data_flag(1) cc_count(5)
//! em_data(8)
//! cc_count x { marker_bits(5) cc_valid(1) cc_type(2) cc_data_1(8) cc_data_2(8) }
//! ```

use std::fmt;

use bitstream_io::{BigEndian, BitRead, BitReader};
use bytes::{BufMut, BytesMut};

use crate::sei::SEI_TYPE_USER_DATA_REGISTERED;

/// ITU-T T.35 country code for the United States
pub const COUNTRY_CODE_USA: u8 = 0xB5;
/// ATSC provider code
pub const PROVIDER_CODE_ATSC: u16 = 0x0031;
/// `GA94`
pub const USER_IDENTIFIER_GA94: u32 = 0x4741_3934;
/// `cc_data()` user data type
pub const USER_DATA_TYPE_CC: u8 = 0x03;

/// Length of the signature preceding `cc_data()`
const SIGNATURE_LEN: usize = 8;

/// One of the two CEA-608 line-21 fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Field {
    One,
    Two,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::One, Field::Two];

    /// Zero-based index, for per-field arrays
    pub fn index(&self) -> usize {
        match self {
            Field::One => 0,
            Field::Two => 1,
        }
    }

    /// Field number as written in the standard (1 or 2)
    pub fn number(&self) -> u8 {
        self.index() as u8 + 1
    }

    /// Map a 2-bit `cc_type`; DTVCC types (2, 3) have no field.
    pub fn from_cc_type(cc_type: u8) -> Option<Self> {
        match cc_type {
            0 => Some(Field::One),
            1 => Some(Field::Two),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field {}", self.number())
    }
}

/// Two caption data bytes, parity bits included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcBytePair {
    pub field: Field,
    pub data: [u8; 2],
}

impl CcBytePair {
    /// Both bytes are padding once parity is masked off
    pub fn is_padding(data: [u8; 2]) -> bool {
        data[0] & 0x7F == 0 && data[1] & 0x7F == 0
    }
}

/// Whether an SEI payload carries GA94 `cc_data()`.
pub fn is_cea608_payload(payload_type: u32, payload: &[u8]) -> bool {
    if payload_type != SEI_TYPE_USER_DATA_REGISTERED || payload.len() < SIGNATURE_LEN {
        return false;
    }

    payload[0] == COUNTRY_CODE_USA
        && u16::from_be_bytes([payload[1], payload[2]]) == PROVIDER_CODE_ATSC
        && u32::from_be_bytes([payload[3], payload[4], payload[5], payload[6]])
            == USER_IDENTIFIER_GA94
        && payload[7] == USER_DATA_TYPE_CC
}

/// Valid, non-padding byte pairs of a GA94 payload in bitstream order.
///
/// The caller is expected to have checked [`is_cea608_payload`]. A payload
/// that ends before its declared `cc_count` yields the pairs read so far.
pub fn extract_byte_pairs(payload: &[u8]) -> Vec<CcBytePair> {
    let mut pairs = Vec::new();
    let Some(cc_data) = payload.get(SIGNATURE_LEN..) else {
        return pairs;
    };

    // The reader only fails on end of input, which ends the payload.
    let _ = read_cc_data(cc_data, &mut pairs);
    pairs
}

fn read_cc_data(cc_data: &[u8], pairs: &mut Vec<CcBytePair>) -> std::io::Result<()> {
    let mut reader = BitReader::endian(cc_data, BigEndian);

    reader.skip(3)?; // process_em_data, process_cc_data, additional_data flags
    let cc_count = reader.read::<u8>(5)?;
    reader.skip(8)?; // em_data

    for _ in 0..cc_count {
        reader.skip(5)?; // marker_bits
        let cc_valid = reader.read_bit()?;
        let cc_type = reader.read::<u8>(2)?;
        let data = [reader.read::<u8>(8)?, reader.read::<u8>(8)?];

        if !cc_valid || CcBytePair::is_padding(data) {
            continue;
        }
        if let Some(field) = Field::from_cc_type(cc_type) {
            pairs.push(CcBytePair { field, data });
        }
    }
    Ok(())
}

/// Builder for a GA94 `cc_data()` SEI payload
#[derive(Debug, Clone, Default)]
pub struct CcDataWriter {
    entries: Vec<(bool, u8, [u8; 2])>,
    declared_count: Option<u8>,
}

impl CcDataWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a valid pair for `field`
    pub fn pair(self, field: Field, data: [u8; 2]) -> Self {
        self.entry(true, field.index() as u8, data)
    }

    /// Append a raw construct with explicit validity and `cc_type`
    pub fn entry(mut self, valid: bool, cc_type: u8, data: [u8; 2]) -> Self {
        self.entries.push((valid, cc_type & 0x03, data));
        self
    }

    /// Declare a `cc_count` different from the number of entries written
    pub fn declared_count(mut self, count: u8) -> Self {
        self.declared_count = Some(count);
        self
    }

    /// Serialize signature and `cc_data()`
    pub fn build(self) -> Vec<u8> {
        let count = self.declared_count.unwrap_or(self.entries.len() as u8) & 0x1F;
        let mut buf = BytesMut::with_capacity(SIGNATURE_LEN + 3 + self.entries.len() * 3);

        buf.put_u8(COUNTRY_CODE_USA);
        buf.put_u16(PROVIDER_CODE_ATSC);
        buf.put_u32(USER_IDENTIFIER_GA94);
        buf.put_u8(USER_DATA_TYPE_CC);

        buf.put_u8(0x40 | count); // process_cc_data_flag set
        buf.put_u8(0xFF); // em_data
        for (valid, cc_type, data) in &self.entries {
            buf.put_u8(0xF8 | ((*valid as u8) << 2) | cc_type);
            buf.put_slice(data);
        }
        buf.put_u8(0xFF); // marker_bits

        buf.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_check() {
        let payload = CcDataWriter::new().pair(Field::One, [0x94, 0x20]).build();
        assert!(is_cea608_payload(4, &payload));
        assert!(!is_cea608_payload(5, &payload));
        assert!(!is_cea608_payload(4, &payload[..7]));

        let mut wrong_provider = payload.clone();
        wrong_provider[2] = 0x2F;
        assert!(!is_cea608_payload(4, &wrong_provider));

        let mut dtg = payload.clone();
        dtg[3..7].copy_from_slice(b"DTG1");
        assert!(!is_cea608_payload(4, &dtg));

        let mut bar_data = payload;
        bar_data[7] = 0x06;
        assert!(!is_cea608_payload(4, &bar_data));
    }

    #[test]
    fn test_pairs_routed_by_cc_type() {
        let payload = CcDataWriter::new()
            .pair(Field::One, [0x94, 0x2C])
            .pair(Field::Two, [0x15, 0x2C])
            .entry(true, 2, [0x01, 0x02])
            .entry(true, 3, [0x03, 0x04])
            .build();

        let pairs = extract_byte_pairs(&payload);
        assert_eq!(
            pairs,
            vec![
                CcBytePair {
                    field: Field::One,
                    data: [0x94, 0x2C]
                },
                CcBytePair {
                    field: Field::Two,
                    data: [0x15, 0x2C]
                },
            ]
        );
    }

    #[test]
    fn test_invalid_pairs_dropped() {
        let payload = CcDataWriter::new()
            .entry(false, 0, [0x94, 0x2C])
            .entry(true, 0, [0x80, 0x80])
            .entry(true, 0, [0x00, 0x00])
            .build();
        assert!(extract_byte_pairs(&payload).is_empty());
    }

    #[test]
    fn test_parity_bits_kept() {
        let payload = CcDataWriter::new().pair(Field::One, [0xC1, 0x80]).build();
        let pairs = extract_byte_pairs(&payload);
        assert_eq!(pairs[0].data, [0xC1, 0x80]);
    }

    #[test]
    fn test_short_payload_yields_prefix() {
        let payload = CcDataWriter::new()
            .pair(Field::One, [0x41, 0x42])
            .declared_count(5)
            .build();
        let pairs = extract_byte_pairs(&payload);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].data, [0x41, 0x42]);

        assert!(extract_byte_pairs(&payload[..9]).is_empty());
        assert!(extract_byte_pairs(&[]).is_empty());
    }

    #[test]
    fn test_field_helpers() {
        assert_eq!(Field::from_cc_type(1), Some(Field::Two));
        assert_eq!(Field::Two.index(), 1);
        assert_eq!(Field::One.to_string(), "field 1");
    }
}
