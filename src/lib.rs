//! rigid2d - 2D rigid-body physics
//!
//! Application layer over the physics crates: configuration loading, preset
//! scenes and the fixed-step simulation driver used by the `rigid2d` binary.

pub mod config;
pub mod scene;
pub mod systems;
