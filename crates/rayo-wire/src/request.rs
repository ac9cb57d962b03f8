//! Seed-only `Request` message
//!
//! ```text
//! message Request {
//!   required int64 updatedSeed = 2;
//! }
//! ```
//!
//! Field 2 is what every deployed peer parses; it must never be renumbered.
//! Decoding is strict: the field is required, appears once, and no other
//! field is accepted.

use bytes::{Bytes, BytesMut};
use rayo_core::DecodeError;

use crate::varint::{put_key, put_varint, varint_len, FieldReader, FieldValue, WireType};
use crate::MAX_MESSAGE_SIZE;

/// Field number of `updatedSeed`
pub const SEED_FIELD: u32 = 2;

/// Seed update broadcast on the topic
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Request {
    pub updated_seed: i64,
}

impl Request {
    pub fn new(updated_seed: i64) -> Self {
        Request { updated_seed }
    }

    /// Size of the encoded message in bytes
    pub fn encoded_len(&self) -> usize {
        varint_len(((SEED_FIELD as u64) << 3) | WireType::Varint.to_byte() as u64)
            + varint_len(self.updated_seed as u64)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        put_key(&mut buf, SEED_FIELD, WireType::Varint);
        // int64 keeps two's complement, so negatives take ten bytes
        put_varint(&mut buf, self.updated_seed as u64);
        buf.freeze()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(DecodeError::Oversized {
                size: buf.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut reader = FieldReader::new(buf);
        let mut seed = None;

        while let Some((field, value)) = reader.next_field()? {
            if field != SEED_FIELD {
                return Err(DecodeError::UnexpectedField {
                    field,
                    wire_type: value.wire_type().to_byte(),
                });
            }
            let FieldValue::Varint(raw) = value else {
                return Err(DecodeError::WireTypeMismatch {
                    field,
                    expected: WireType::Varint.to_byte(),
                    actual: value.wire_type().to_byte(),
                });
            };
            if seed.replace(raw as i64).is_some() {
                return Err(DecodeError::DuplicateField(field));
            }
        }

        seed.map(Request::new)
            .ok_or(DecodeError::MissingField(SEED_FIELD))
    }
}

/// Encode a seed as a `Request`
pub fn encode_seed(seed: i64) -> Bytes {
    Request::new(seed).encode()
}

/// Decode a `Request` and return its seed
pub fn decode_seed(buf: &[u8]) -> Result<i64, DecodeError> {
    Request::decode(buf).map(|req| req.updated_seed)
}
