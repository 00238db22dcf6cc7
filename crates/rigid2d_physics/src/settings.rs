//! Global tuning constants for the simulation
//!
//! Lengths are in meters, times in seconds and angles in radians.

use std::f32::consts::PI;

/// Machine epsilon used for degenerate-case guards
pub const EPSILON: f32 = f32::EPSILON;

/// Maximum number of contact points between two convex shapes
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum number of vertices on a convex polygon
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Margin added to fixture AABBs stored in the broad-phase tree
pub const AABB_EXTENSION: f32 = 0.1;

/// Scale applied to a proxy's displacement when predicting its fat AABB
pub const AABB_MULTIPLIER: f32 = 2.0;

/// Collision and constraint tolerance
pub const LINEAR_SLOP: f32 = 0.005;

/// Angular collision and constraint tolerance
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * PI;

/// Skin radius around polygons
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// Contact capacity of a time-of-impact island
pub const MAX_TOI_CONTACTS_PER_ISLAND: usize = 32;

/// Joint capacity of a time-of-impact island
pub const MAX_TOI_JOINTS_PER_ISLAND: usize = 32;

/// Conservative advancement iteration cap
pub const MAX_TOI_ITERATIONS: usize = 50;

/// Relative normal speed below which collisions are inelastic
pub const VELOCITY_THRESHOLD: f32 = 1.0;

/// Largest position correction applied in one position iteration
pub const MAX_LINEAR_CORRECTION: f32 = 0.2;

/// Largest angular correction applied in one position iteration
pub const MAX_ANGULAR_CORRECTION: f32 = 8.0 / 180.0 * PI;

/// Largest translation of a body in one step
pub const MAX_TRANSLATION: f32 = 2.0;
pub const MAX_TRANSLATION_SQUARED: f32 = MAX_TRANSLATION * MAX_TRANSLATION;

/// Largest rotation of a body in one step
pub const MAX_ROTATION: f32 = 0.5 * PI;
pub const MAX_ROTATION_SQUARED: f32 = MAX_ROTATION * MAX_ROTATION;

/// Fraction of overlap resolved per position iteration
pub const BAUMGARTE: f32 = 0.2;

/// Baumgarte factor used inside time-of-impact sub-steps
pub const TOI_BAUMGARTE: f32 = 0.75;

/// Time-of-impact sub-steps one contact may take per step
pub const MAX_SUB_STEPS: u32 = 8;

/// Time a body must be still before it may sleep
pub const TIME_TO_SLEEP: f32 = 0.5;

/// Linear speed below which a body counts as still
pub const LINEAR_SLEEP_TOLERANCE: f32 = 0.01;

/// Angular speed below which a body counts as still
pub const ANGULAR_SLEEP_TOLERANCE: f32 = 2.0 / 180.0 * PI;

/// Default number of TOI events handled per step before the pass gives up
pub const DEFAULT_MAX_TOI_EVENTS: usize = 64;
