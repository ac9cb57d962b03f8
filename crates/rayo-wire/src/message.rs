//! Messages carried on the Rayo topic
//!
//! ```text
//! message ChatMessage {
//!   oneof body {
//!     int64 updatedSeed = 2;
//!     string text = 3;
//!   }
//! }
//! ```
//!
//! A seed message is byte-identical to a `Request`, so seed-only peers keep
//! understanding seed traffic. Text messages fail their decoder and are
//! dropped on their side.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use rayo_core::{DecodeError, RayoError, RayoResult};

use crate::request::{Request, SEED_FIELD};
use crate::varint::{put_key, put_varint, varint_len, FieldReader, FieldValue, WireType};
use crate::MAX_MESSAGE_SIZE;

/// Field number of the chat text body
pub const TEXT_FIELD: u32 = 3;

/// Message kinds exchanged on the topic
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatMessage {
    /// Shared seed update
    Seed(i64),
    /// Free-form chat text
    Text(String),
}

impl ChatMessage {
    pub fn encoded_len(&self) -> usize {
        match self {
            ChatMessage::Seed(seed) => Request::new(*seed).encoded_len(),
            ChatMessage::Text(text) => {
                varint_len(((TEXT_FIELD as u64) << 3) | WireType::LengthDelimited.to_byte() as u64)
                    + varint_len(text.len() as u64)
                    + text.len()
            }
        }
    }

    pub fn encode(&self) -> RayoResult<Bytes> {
        let size = self.encoded_len();
        if size > MAX_MESSAGE_SIZE {
            return Err(RayoError::MessageTooLarge {
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }

        match self {
            ChatMessage::Seed(seed) => Ok(Request::new(*seed).encode()),
            ChatMessage::Text(text) => {
                let mut buf = BytesMut::with_capacity(size);
                put_key(&mut buf, TEXT_FIELD, WireType::LengthDelimited);
                put_varint(&mut buf, text.len() as u64);
                buf.put_slice(text.as_bytes());
                Ok(buf.freeze())
            }
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(DecodeError::Oversized {
                size: buf.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut reader = FieldReader::new(buf);
        let mut body: Option<ChatMessage> = None;

        while let Some((field, value)) = reader.next_field()? {
            let decoded = match (field, value) {
                (SEED_FIELD, FieldValue::Varint(raw)) => ChatMessage::Seed(raw as i64),
                (TEXT_FIELD, FieldValue::Bytes(raw)) => {
                    let text = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)?;
                    ChatMessage::Text(text.to_owned())
                }
                (SEED_FIELD, other) => {
                    return Err(DecodeError::WireTypeMismatch {
                        field,
                        expected: WireType::Varint.to_byte(),
                        actual: other.wire_type().to_byte(),
                    })
                }
                (TEXT_FIELD, other) => {
                    return Err(DecodeError::WireTypeMismatch {
                        field,
                        expected: WireType::LengthDelimited.to_byte(),
                        actual: other.wire_type().to_byte(),
                    })
                }
                (_, other) => {
                    return Err(DecodeError::UnexpectedField {
                        field,
                        wire_type: other.wire_type().to_byte(),
                    })
                }
            };

            if let Some(existing) = &body {
                return Err(if existing.is_seed() == decoded.is_seed() {
                    DecodeError::DuplicateField(field)
                } else {
                    DecodeError::ConflictingFields
                });
            }
            body = Some(decoded);
        }

        // A message with no body cannot be told apart from a seed-only
        // Request missing its required field.
        body.ok_or(DecodeError::MissingField(SEED_FIELD))
    }

    pub fn is_seed(&self) -> bool {
        matches!(self, ChatMessage::Seed(_))
    }

    pub fn seed(&self) -> Option<i64> {
        match self {
            ChatMessage::Seed(seed) => Some(*seed),
            ChatMessage::Text(_) => None,
        }
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatMessage::Seed(seed) => write!(f, "{}", seed),
            ChatMessage::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for ChatMessage {
    fn from(seed: i64) -> Self {
        ChatMessage::Seed(seed)
    }
}

impl From<String> for ChatMessage {
    fn from(text: String) -> Self {
        ChatMessage::Text(text)
    }
}

impl From<&str> for ChatMessage {
    fn from(text: &str) -> Self {
        ChatMessage::Text(text.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{decode_seed, encode_seed};
    use proptest::prelude::*;

    #[test]
    fn test_seed_matches_request_bytes() {
        let msg = ChatMessage::Seed(42).encode().unwrap();
        assert_eq!(msg, encode_seed(42));
        assert_eq!(decode_seed(&msg).unwrap(), 42);
    }

    #[test]
    fn test_legacy_request_decodes_as_seed() {
        let bytes = encode_seed(-9000);
        assert_eq!(ChatMessage::decode(&bytes).unwrap(), ChatMessage::Seed(-9000));
    }

    #[test]
    fn test_text_roundtrip() {
        let msg = ChatMessage::from("Checking in");
        let bytes = msg.encode().unwrap();
        assert_eq!(bytes[0], 0x1A);
        assert_eq!(bytes.len(), msg.encoded_len());
        assert_eq!(ChatMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_text_rejected_by_seed_decoder() {
        let bytes = ChatMessage::from("hello").encode().unwrap();
        assert!(matches!(
            decode_seed(&bytes),
            Err(DecodeError::UnexpectedField { field: 3, .. })
        ));
    }

    #[test]
    fn test_empty_text_allowed() {
        let bytes = ChatMessage::from("").encode().unwrap();
        assert_eq!(bytes.as_ref(), &[0x1A, 0x00]);
        assert_eq!(ChatMessage::decode(&bytes).unwrap(), ChatMessage::Text(String::new()));
    }

    #[test]
    fn test_both_bodies_conflict() {
        let mut bytes = encode_seed(1).to_vec();
        bytes.extend_from_slice(&ChatMessage::from("x").encode().unwrap());
        assert_eq!(ChatMessage::decode(&bytes), Err(DecodeError::ConflictingFields));
    }

    #[test]
    fn test_duplicate_text_rejected() {
        let one = ChatMessage::from("a").encode().unwrap();
        let mut bytes = one.to_vec();
        bytes.extend_from_slice(&one);
        assert_eq!(ChatMessage::decode(&bytes), Err(DecodeError::DuplicateField(TEXT_FIELD)));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        assert_eq!(
            ChatMessage::decode(&[0x1A, 0x02, 0xC3, 0x28]),
            Err(DecodeError::InvalidUtf8)
        );
    }

    #[test]
    fn test_empty_input_rejected() {
        assert_eq!(ChatMessage::decode(&[]), Err(DecodeError::MissingField(SEED_FIELD)));
    }

    #[test]
    fn test_text_wire_type_mismatch() {
        // field 3 as varint
        assert_eq!(
            ChatMessage::decode(&[0x18, 0x01]),
            Err(DecodeError::WireTypeMismatch { field: 3, expected: 2, actual: 0 })
        );
    }

    #[test]
    fn test_oversized_text_refused() {
        let text = "a".repeat(MAX_MESSAGE_SIZE);
        let err = ChatMessage::Text(text).encode().unwrap_err();
        assert!(matches!(err, RayoError::MessageTooLarge { .. }));
    }

    #[test]
    fn test_display() {
        assert_eq!(ChatMessage::Seed(42).to_string(), "42");
        assert_eq!(ChatMessage::from("hi").to_string(), "hi");
    }

    proptest! {
        #[test]
        fn prop_text_roundtrip(text in ".{0,256}") {
            let msg = ChatMessage::Text(text);
            let bytes = msg.encode().unwrap();
            prop_assert_eq!(ChatMessage::decode(&bytes), Ok(msg));
        }

        #[test]
        fn prop_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = ChatMessage::decode(&bytes);
        }
    }
}
