//! 2D rigid-body physics for rigid2d
//!
//! This crate provides a deterministic, single-threaded rigid-body simulator:
//! - Circle and convex polygon shapes with density, friction and restitution
//! - Dynamic AABB tree broad-phase with fattened proxies
//! - Contact manifolds with persistent, warm-started impulses
//! - Island-based sequential impulse solver with sleeping
//! - Continuous collision for fast bodies through a time-of-impact pass
//! - Revolute, slider, distance and pulley joints with breakpoints

pub mod body;
pub mod broad_phase;
pub mod collision;
pub mod contact;
mod contact_manager;
mod contact_solver;
pub mod distance;
pub mod dynamic_tree;
pub mod error;
pub mod events;
pub mod fixture;
mod island;
pub mod joints;
pub mod material;
pub mod settings;
pub mod shapes;
pub mod toi;
pub mod world;

// Re-export commonly used types
pub use body::{Body, BodyDef, BodyKey, BodyType, ContactEdge, JointEdge};
pub use collision::{CollisionFilter, CollisionLayer, Manifold, ManifoldPoint, ManifoldType, WorldManifold};
pub use contact::{Contact, ContactKey};
pub use error::PhysicsError;
pub use events::WorldEvent;
pub use fixture::{Fixture, FixtureDef, FixtureKey};
pub use joints::{
    DistanceJoint, Joint, JointDef, JointDefKind, JointKey, JointKind, JointParams, PulleyJoint, RevoluteJoint,
    SliderJoint,
};
pub use material::PhysicsMaterial;
pub use shapes::{Aabb, CircleShape, MassData, PolygonShape, RayCastInput, RayCastOutput, Shape};
pub use world::{PhysicsConfig, StepStats, World};
