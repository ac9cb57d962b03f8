//! Rayo Wire Protocol - Binary message format
//!
//! Messages use the protobuf wire encoding so they stay compatible with
//! peers built on the seed-only schema:
//!
//! ```text
//! message Request {
//!   required int64 updatedSeed = 2;
//! }
//! ```
//!
//! - `varint` - low-level key/varint reader and writer
//! - `request` - the seed-only `Request` message
//! - `message` - `ChatMessage`, the seed | text union carried on the topic

pub mod message;
pub mod request;
pub mod varint;

pub use message::*;
pub use request::*;
pub use varint::{FieldReader, FieldValue, WireType};

/// Largest encoded message accepted in either direction
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
