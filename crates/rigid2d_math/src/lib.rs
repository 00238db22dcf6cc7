//! 2D Mathematics Library
//!
//! Vector, rotation and transform types used by the rigid2d physics crate.
//!
//! ## Core Types
//!
//! - [`Vec2`] - 2D vector with x, y components
//! - [`Rot`] - rotation stored as sine/cosine
//! - [`Mat22`] - 2x2 matrix for effective-mass blocks
//! - [`Transform`] - rigid transform (translation + rotation)
//! - [`Sweep`] - center-of-mass motion over a step, used by continuous collision

mod vec2;
mod rot;
pub mod mat22;
pub mod transform;

pub use vec2::Vec2;
pub use rot::Rot;
pub use mat22::Mat22;
pub use transform::{Sweep, Transform};
