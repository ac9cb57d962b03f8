//! Error types for Rayo

use thiserror::Error;

/// Failures while decoding an inbound pubsub message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Truncated input at offset {offset}")]
    Truncated { offset: usize },

    #[error("Varint longer than 10 bytes at offset {offset}")]
    VarintOverflow { offset: usize },

    #[error("Invalid wire type {0}")]
    InvalidWireType(u8),

    #[error("Field number 0 is reserved")]
    ZeroField,

    #[error("Unexpected field {field} (wire type {wire_type})")]
    UnexpectedField { field: u32, wire_type: u8 },

    #[error("Field {field} has wire type {actual}, expected {expected}")]
    WireTypeMismatch { field: u32, expected: u8, actual: u8 },

    #[error("Field {0} appears more than once")]
    DuplicateField(u32),

    #[error("Required field {0} is missing")]
    MissingField(u32),

    #[error("Message carries both a seed and a text body")]
    ConflictingFields,

    #[error("Text field is not valid UTF-8")]
    InvalidUtf8,

    #[error("Message too large: {size} > {max}")]
    Oversized { size: usize, max: usize },
}

/// Core Rayo errors
#[derive(Error, Debug)]
pub enum RayoError {
    // Wire errors
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    // Topic errors
    #[error("Not joined to topic {topic}")]
    NotJoined { topic: String },

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    // Overlay errors
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Publish failed: no subscribed peers reachable")]
    InsufficientPeers,

    // Session errors
    #[error("Session closed")]
    SessionClosed,

    #[error("Handle already set for peer {0}")]
    HandleExists(String),

    // Configuration errors
    #[error("Invalid config value for {key}: {message}")]
    Config { key: String, message: String },
}

impl RayoError {
    /// Whether the error came from the overlay's publish primitive
    pub fn is_publish_failure(&self) -> bool {
        matches!(self, RayoError::Publish(_) | RayoError::InsufficientPeers)
    }
}

/// Result type for Rayo operations
pub type RayoResult<T> = Result<T, RayoError>;
