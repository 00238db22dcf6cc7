//! Rigid bodies
//!
//! A body owns the motion state of one rigid object. Its fixtures, contacts
//! and joints live in the world's arenas; the body only keeps keys to them
//! (edges), never ownership.

use bitflags::bitflags;
use rigid2d_math::{Rot, Sweep, Transform, Vec2};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::contact::ContactKey;
use crate::fixture::FixtureKey;
use crate::joints::JointKey;

// Define generational key type for rigid bodies
new_key_type! {
    /// Key to a rigid body in the physics world
    ///
    /// Uses generational indexing to prevent the ABA problem where a handle
    /// could point to a reused slot. If a body is removed and its slot reused,
    /// old keys will return None instead of pointing to the wrong body.
    pub struct BodyKey;
}

/// How a body participates in the simulation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    /// Zero velocity, infinite mass; moved only by the user
    #[default]
    Static,
    /// Moves with a user-set velocity, infinite mass
    Kinematic,
    /// Fully simulated
    Dynamic,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct BodyFlags: u16 {
        const ISLAND = 1 << 0;
        const AWAKE = 1 << 1;
        const AUTO_SLEEP = 1 << 2;
        const BULLET = 1 << 3;
        const FIXED_ROTATION = 1 << 4;
        const ACTIVE = 1 << 5;
    }
}

/// Link from a body to one of its contacts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContactEdge {
    pub other: BodyKey,
    pub contact: ContactKey,
}

/// Link from a body to one of its joints
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JointEdge {
    pub other: BodyKey,
    pub joint: JointKey,
    /// Mirrors the joint's flag so pair filtering needs no joint lookup
    pub collide_connected: bool,
}

/// Construction parameters for a body
#[derive(Clone, Debug, PartialEq)]
pub struct BodyDef {
    pub body_type: BodyType,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub allow_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    pub bullet: bool,
    pub active: bool,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            active: true,
        }
    }
}

impl BodyDef {
    /// A dynamic body at `position`
    pub fn dynamic(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position,
            ..Default::default()
        }
    }

    /// A static body at `position`
    pub fn fixed(position: Vec2) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// A kinematic body at `position`
    pub fn kinematic(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Kinematic,
            position,
            ..Default::default()
        }
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_linear_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, omega: f32) -> Self {
        self.angular_velocity = omega;
        self
    }

    /// Set linear and angular damping
    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear.max(0.0);
        self.angular_damping = angular.max(0.0);
        self
    }

    pub fn with_allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn with_awake(mut self, awake: bool) -> Self {
        self.awake = awake;
        self
    }

    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    /// Mark the body for continuous collision against other dynamic bodies
    pub fn with_bullet(mut self, bullet: bool) -> Self {
        self.bullet = bullet;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// A rigid body
#[derive(Clone, Debug)]
pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) flags: BodyFlags,
    /// Transform of the body origin
    pub(crate) xf: Transform,
    /// Center-of-mass motion for continuous collision
    pub(crate) sweep: Sweep,
    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,
    pub(crate) force: Vec2,
    pub(crate) torque: f32,
    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,
    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) sleep_time: f32,
    pub(crate) fixtures: Vec<FixtureKey>,
    pub(crate) contact_edges: Vec<ContactEdge>,
    pub(crate) joint_edges: Vec<JointEdge>,
    /// Position in the current island's solver arrays
    pub(crate) island_index: usize,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let mut flags = BodyFlags::empty();
        if def.bullet {
            flags |= BodyFlags::BULLET;
        }
        if def.fixed_rotation {
            flags |= BodyFlags::FIXED_ROTATION;
        }
        if def.allow_sleep {
            flags |= BodyFlags::AUTO_SLEEP;
        }
        if def.awake && def.body_type != BodyType::Static {
            flags |= BodyFlags::AWAKE;
        }
        if def.active {
            flags |= BodyFlags::ACTIVE;
        }

        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: xf.p,
            c: xf.p,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };

        let (mass, inv_mass) = match def.body_type {
            BodyType::Dynamic => (1.0, 1.0),
            _ => (0.0, 0.0),
        };
        let moving = def.body_type != BodyType::Static;

        Self {
            body_type: def.body_type,
            flags,
            xf,
            sweep,
            linear_velocity: if moving { def.linear_velocity } else { Vec2::ZERO },
            angular_velocity: if moving { def.angular_velocity } else { 0.0 },
            force: Vec2::ZERO,
            torque: 0.0,
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            sleep_time: 0.0,
            fixtures: Vec::new(),
            contact_edges: Vec::new(),
            joint_edges: Vec::new(),
            island_index: 0,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// Transform of the body origin
    pub fn transform(&self) -> &Transform {
        &self.xf
    }

    /// World position of the body origin
    pub fn position(&self) -> Vec2 {
        self.xf.p
    }

    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    /// World position of the center of mass
    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    /// Center of mass relative to the body origin
    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Rotational inertia about the center of mass
    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    pub fn force(&self) -> Vec2 {
        self.force
    }

    pub fn torque(&self) -> f32 {
        self.torque
    }

    pub fn fixtures(&self) -> &[FixtureKey] {
        &self.fixtures
    }

    pub fn contact_edges(&self) -> &[ContactEdge] {
        &self.contact_edges
    }

    pub fn joint_edges(&self) -> &[JointEdge] {
        &self.joint_edges
    }

    pub fn is_awake(&self) -> bool {
        self.flags.contains(BodyFlags::AWAKE)
    }

    pub fn is_active(&self) -> bool {
        self.flags.contains(BodyFlags::ACTIVE)
    }

    pub fn is_bullet(&self) -> bool {
        self.flags.contains(BodyFlags::BULLET)
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.flags.contains(BodyFlags::FIXED_ROTATION)
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.flags.contains(BodyFlags::AUTO_SLEEP)
    }

    pub fn sleep_time(&self) -> f32 {
        self.sleep_time
    }

    /// Wake the body or put it to sleep
    ///
    /// Sleeping clears velocity and accumulated force. Static bodies never
    /// wake. Waking an awake body keeps its sleep timer running.
    pub fn set_awake(&mut self, awake: bool) {
        if awake {
            if self.body_type == BodyType::Static || self.flags.contains(BodyFlags::AWAKE) {
                return;
            }
            self.flags |= BodyFlags::AWAKE;
            self.sleep_time = 0.0;
        } else {
            self.flags -= BodyFlags::AWAKE;
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    /// Allow or forbid automatic sleeping; forbidding wakes the body
    pub fn set_sleeping_allowed(&mut self, allowed: bool) {
        if allowed {
            self.flags |= BodyFlags::AUTO_SLEEP;
        } else {
            self.flags -= BodyFlags::AUTO_SLEEP;
            self.set_awake(true);
        }
    }

    /// Ignored for static bodies; a non-zero velocity wakes the body
    pub fn set_linear_velocity(&mut self, v: Vec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if v.length_squared() > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    /// Ignored for static bodies; a non-zero velocity wakes the body
    pub fn set_angular_velocity(&mut self, w: f32) {
        if self.body_type == BodyType::Static {
            return;
        }
        if w * w > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    pub fn set_damping(&mut self, linear: f32, angular: f32) {
        self.linear_damping = linear.max(0.0);
        self.angular_damping = angular.max(0.0);
    }

    /// Apply a force at a world point, waking the body
    pub fn apply_force(&mut self, force: Vec2, point: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.force += force;
        self.torque += (point - self.sweep.c).cross(force);
    }

    /// Apply a force through the center of mass, waking the body
    pub fn apply_force_to_center(&mut self, force: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.force += force;
    }

    pub fn apply_torque(&mut self, torque: f32) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.torque += torque;
    }

    /// Apply an impulse at a world point, changing velocity immediately
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * (point - self.sweep.c).cross(impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f32) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.angular_velocity += self.inv_inertia * impulse;
    }

    /// Local point to world coordinates
    pub fn world_point(&self, local_point: Vec2) -> Vec2 {
        self.xf.apply(local_point)
    }

    /// Local vector to world coordinates (rotation only)
    pub fn world_vector(&self, local_vector: Vec2) -> Vec2 {
        self.xf.q.rotate(local_vector)
    }

    /// World point to local coordinates
    pub fn local_point(&self, world_point: Vec2) -> Vec2 {
        self.xf.apply_inverse(world_point)
    }

    /// World vector to local coordinates (rotation only)
    pub fn local_vector(&self, world_vector: Vec2) -> Vec2 {
        self.xf.q.inv_rotate(world_vector)
    }

    /// Velocity of the material point at a world position
    pub fn linear_velocity_from_world_point(&self, world_point: Vec2) -> Vec2 {
        self.linear_velocity + Vec2::scalar_cross(self.angular_velocity, world_point - self.sweep.c)
    }

    /// Velocity of the material point at a local position
    pub fn linear_velocity_from_local_point(&self, local_point: Vec2) -> Vec2 {
        self.linear_velocity_from_world_point(self.world_point(local_point))
    }

    /// Recompute the origin transform from the end of the sweep
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf.q = Rot::from_angle(self.sweep.a);
        self.xf.p = self.sweep.c - self.xf.q.rotate(self.sweep.local_center);
    }

    /// Move the body to its pose at `alpha` along the current sweep
    pub(crate) fn advance(&mut self, alpha: f32) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    /// Transform at the start of the sweep
    pub(crate) fn start_transform(&self) -> Transform {
        self.sweep.get_transform(0.0)
    }

    /// Pair filter at the body level: at least one body must be dynamic
    /// and no joint between them may forbid the contact
    pub(crate) fn should_collide(&self, other_key: BodyKey, other: &Body) -> bool {
        if self.body_type != BodyType::Dynamic && other.body_type != BodyType::Dynamic {
            return false;
        }
        !self
            .joint_edges
            .iter()
            .any(|edge| edge.other == other_key && !edge.collide_connected)
    }

    /// Place the body, keeping the center of mass consistent
    pub(crate) fn set_transform_internal(&mut self, position: Vec2, angle: f32) {
        self.xf = Transform::new(position, angle);
        self.sweep.c = self.xf.apply(self.sweep.local_center);
        self.sweep.c0 = self.sweep.c;
        self.sweep.a = angle;
        self.sweep.a0 = angle;
    }

    /// Apply mass properties accumulated from the fixtures
    ///
    /// `mass`, `center` and `inertia_about_origin` are the sums over all
    /// fixtures. Dynamic bodies without mass fall back to unit mass; fixed
    /// rotation zeroes the rotational inertia. The velocity of the new
    /// center of mass is kept consistent with the old motion.
    pub(crate) fn apply_mass_data(&mut self, mass: f32, center: Vec2, inertia_about_origin: f32) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;

        if self.body_type != BodyType::Dynamic {
            self.sweep.local_center = Vec2::ZERO;
            self.sweep.c0 = self.xf.p;
            self.sweep.c = self.xf.p;
            return;
        }

        let mut local_center = Vec2::ZERO;
        if mass > 0.0 {
            self.mass = mass;
            self.inv_mass = 1.0 / mass;
            local_center = center * self.inv_mass;
        } else {
            // Force all dynamic bodies to have a positive mass
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        if inertia_about_origin > 0.0 && !self.is_fixed_rotation() {
            // Center the inertia about the center of mass
            self.inertia = inertia_about_origin - self.mass * local_center.length_squared();
            if self.inertia > 0.0 {
                self.inv_inertia = 1.0 / self.inertia;
            } else {
                self.inertia = 0.0;
            }
        }

        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.xf.apply(local_center);
        self.sweep.c0 = self.sweep.c;

        // Update center of mass velocity
        self.linear_velocity += Vec2::scalar_cross(self.angular_velocity, self.sweep.c - old_center);
    }
}
