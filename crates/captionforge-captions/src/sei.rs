//! SEI (Supplemental Enhancement Information) payload headers

use bytes::{BufMut, BytesMut};

/// user_data_registered_itu_t_t35, the carrier of GA94 caption data
pub const SEI_TYPE_USER_DATA_REGISTERED: u32 = 4;

/// rbsp_trailing_bits: stop bit followed by alignment zeros
const RBSP_TRAILING_BITS: u8 = 0x80;

/// Location of one SEI payload inside a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeiPayload {
    /// Offset of the payload body, relative to the start of the sample
    pub offset: usize,
    /// Payload body size in bytes
    pub size: usize,
    /// SEI payload type
    pub payload_type: u32,
}

impl SeiPayload {
    /// The payload body within the sample it was found in
    pub fn bytes<'a>(&self, sample: &'a [u8]) -> &'a [u8] {
        sample
            .get(self.offset..self.offset + self.size)
            .unwrap_or(&[])
    }
}

/// Decode an SEI payload type or size.
///
/// Every `0xFF` byte adds 255 and the first other byte is added and ends the
/// value. Returns the value and the number of bytes consumed, or `None` if the
/// input ends before a terminating byte.
pub fn decode_sei_value(data: &[u8]) -> Option<(u32, usize)> {
    let mut value = 0u32;
    for (i, &byte) in data.iter().enumerate() {
        value = value.saturating_add(byte as u32);
        if byte != 0xFF {
            return Some((value, i + 1));
        }
    }
    None
}

/// Encode an SEI payload type or size
pub fn encode_sei_value(mut value: u32, buf: &mut BytesMut) {
    while value >= 0xFF {
        buf.put_u8(0xFF);
        value -= 0xFF;
    }
    buf.put_u8(value as u8);
}

/// Builder for a length-prefixed H.264 SEI NAL unit
#[derive(Debug, Clone, Default)]
pub struct SeiWriter {
    payloads: Vec<(u32, Vec<u8>)>,
}

impl SeiWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an SEI message
    pub fn payload(mut self, payload_type: u32, body: Vec<u8>) -> Self {
        self.payloads.push((payload_type, body));
        self
    }

    /// Serialize as a 4-byte length prefix followed by the NAL unit
    pub fn build(self) -> Vec<u8> {
        let mut body = BytesMut::new();
        for (payload_type, payload) in &self.payloads {
            encode_sei_value(*payload_type, &mut body);
            encode_sei_value(payload.len() as u32, &mut body);
            body.put_slice(payload);
        }
        body.put_u8(RBSP_TRAILING_BITS);

        length_prefixed_nal(crate::nal::NalUnitType::Sei.header_byte(), &body)
    }
}

/// Serialize one NAL unit (header byte + body) with a 4-byte length prefix
pub fn length_prefixed_nal(header: u8, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(5 + body.len());
    buf.put_u32(body.len() as u32 + 1);
    buf.put_u8(header);
    buf.put_slice(body);
    buf.to_vec()
}
