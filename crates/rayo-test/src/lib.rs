//! Rayo Test Harness - multi-node scenarios and hostile input
//!
//! This crate provides:
//! - `MeshScenario`, a set of session drivers over one `MemoryMesh`
//! - Hostile payload generation for decoder and session robustness
//! - End-to-end scenarios returning a `ScenarioReport`

pub mod hostile;
pub mod integration;
pub mod scenario;

pub use hostile::*;
pub use integration::*;
pub use scenario::*;
