//! Protobuf key/varint primitives
//!
//! Format: [KEY:varint][VALUE], KEY = (field << 3) | wire_type

use bytes::BufMut;
use rayo_core::DecodeError;

/// Longest legal varint (64 bits in 7-bit groups)
pub const MAX_VARINT_LEN: usize = 10;

/// Protobuf wire types
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            // 3 and 4 are the deprecated group markers
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Decoded field value, borrowing length-delimited payloads
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

impl FieldValue<'_> {
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldValue::Varint(_) => WireType::Varint,
            FieldValue::Fixed64(_) => WireType::Fixed64,
            FieldValue::Bytes(_) => WireType::LengthDelimited,
            FieldValue::Fixed32(_) => WireType::Fixed32,
        }
    }
}

/// Number of bytes `value` occupies as a varint
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

pub fn put_varint(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

pub fn put_key(buf: &mut impl BufMut, field: u32, wire_type: WireType) {
    put_varint(buf, ((field as u64) << 3) | wire_type.to_byte() as u64);
}

/// Sequential field reader over an encoded message
pub struct FieldReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        FieldReader { buf, offset: 0 }
    }

    /// Current position in the buffer
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Read the next `(field, value)` pair, `None` at end of input
    pub fn next_field(&mut self) -> Result<Option<(u32, FieldValue<'a>)>, DecodeError> {
        if self.offset >= self.buf.len() {
            return Ok(None);
        }

        let key = self.read_varint()?;
        let wire_type = (key & 0x07) as u8;
        let field = u32::try_from(key >> 3).unwrap_or(u32::MAX);
        if field == 0 {
            return Err(DecodeError::ZeroField);
        }

        let value = match WireType::from_byte(wire_type) {
            Some(WireType::Varint) => FieldValue::Varint(self.read_varint()?),
            Some(WireType::Fixed64) => {
                let bytes = self.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                FieldValue::Fixed64(u64::from_le_bytes(raw))
            }
            Some(WireType::LengthDelimited) => {
                let start = self.offset;
                let len = self.read_varint()?;
                let len = usize::try_from(len)
                    .map_err(|_| DecodeError::Truncated { offset: start })?;
                FieldValue::Bytes(self.take(len)?)
            }
            Some(WireType::Fixed32) => {
                let bytes = self.take(4)?;
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                FieldValue::Fixed32(u32::from_le_bytes(raw))
            }
            None => return Err(DecodeError::InvalidWireType(wire_type)),
        };

        Ok(Some((field, value)))
    }

    fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.offset;
        let mut value = 0u64;

        for i in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.buf.get(self.offset) else {
                return Err(DecodeError::Truncated { offset: self.offset });
            };
            self.offset += 1;

            // The tenth byte may only carry the top bit of a u64
            if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
                return Err(DecodeError::VarintOverflow { offset: start });
            }

            value |= ((byte & 0x7F) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }

        Err(DecodeError::VarintOverflow { offset: start })
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::Truncated { offset: self.buf.len() })?;
        let slice = &self.buf[self.offset..end];
        self.offset = end;
        Ok(slice)
    }
}
