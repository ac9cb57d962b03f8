//! Rayo Overlay - the peer-to-peer substrate seen from the session layer
//!
//! This crate provides:
//! - The `Overlay` trait (subscribe, unsubscribe, publish, identity)
//! - `OverlayEvent`, the connect/disconnect/message/lifecycle stream
//! - `MemoryMesh`, an in-process overlay for tests and scenarios

pub mod memory;
pub mod overlay;

pub use memory::*;
pub use overlay::*;
