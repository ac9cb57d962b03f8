//! Rayo Core - Fundamental types shared by every Rayo crate
//!
//! This crate defines:
//! - Peer identifiers (PeerId)
//! - Pubsub topics (Topic, RAYO_TOPIC)
//! - The error taxonomy (RayoError, DecodeError)

pub mod error;
pub mod id;
pub mod topic;

pub use error::*;
pub use id::*;
pub use topic::*;
