//! Rayo Runtime - pubsub chat session
//!
//! A session ties together:
//! 1. Peer tracking (connected peer set, deduplicated)
//! 2. Topic channel (join/leave, decode inbound, publish outbound)
//! 3. Handle directory (peer id -> display name)
//! 4. Shared seed state
//! 5. The driver task that owns all of the above and runs the heartbeat

pub mod channel;
pub mod config;
pub mod display;
pub mod driver;
pub mod handles;
pub mod session;
pub mod telemetry;
pub mod tracker;

pub use channel::*;
pub use config::*;
pub use display::*;
pub use driver::*;
pub use handles::*;
pub use session::*;
pub use telemetry::*;
pub use tracker::*;
