//! Joints: user constraints between two bodies
//!
//! Every joint kind builds its effective mass and velocity bias at the
//! start of the island solve, warm starts from the impulse accumulated in
//! the previous step, applies clamped impulses during the velocity
//! iterations and corrects drift during the position iterations.
//!
//! Velocity bias follows `bias = bias_factor * inv_dt * error`. Softness is
//! added to the effective-mass denominator and damps the impulse by the
//! accumulated impulse, the usual soft-constraint trick.

mod distance;
mod pulley;
mod revolute;
mod slider;

pub use distance::DistanceJoint;
pub use pulley::PulleyJoint;
pub use revolute::RevoluteJoint;
pub use slider::SliderJoint;

use rigid2d_math::{Rot, Vec2};
use slotmap::new_key_type;

use crate::body::{Body, BodyKey};
use crate::island::{pair_mut, SolverBody, TimeStep};

new_key_type! {
    /// Key to a joint in the physics world
    pub struct JointKey;
}

/// Default Baumgarte factor for joint drift correction
pub const DEFAULT_BIAS_FACTOR: f32 = 0.2;

/// Tuning shared by all joint kinds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointParams {
    pub bias_factor: f32,
    pub softness: f32,
}

impl Default for JointParams {
    fn default() -> Self {
        Self {
            bias_factor: DEFAULT_BIAS_FACTOR,
            softness: 0.0,
        }
    }
}

/// Kind-specific joint parameters; all anchors are world points at creation
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JointDefKind {
    /// Both bodies pinned at a shared point
    Revolute { anchor: Vec2 },
    /// Anchor distance kept within `[min_distance, max_distance]`
    Slider {
        anchor_a: Vec2,
        anchor_b: Vec2,
        min_distance: f32,
        max_distance: f32,
    },
    /// Anchor distance held at its initial length
    Distance { anchor_a: Vec2, anchor_b: Vec2 },
    /// Rope over two fixed ground points
    Pulley {
        ground_a: Vec2,
        ground_b: Vec2,
        anchor_a: Vec2,
        anchor_b: Vec2,
        ratio: f32,
    },
}

/// Construction parameters for a joint
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointDef {
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub kind: JointDefKind,
    /// Whether the two bodies still collide with each other
    pub collide_connected: bool,
    pub params: JointParams,
    /// Error magnitude above which the joint breaks
    pub breakpoint: f32,
}

impl JointDef {
    pub fn new(body_a: BodyKey, body_b: BodyKey, kind: JointDefKind) -> Self {
        Self {
            body_a,
            body_b,
            kind,
            collide_connected: false,
            params: JointParams::default(),
            breakpoint: f32::MAX,
        }
    }

    pub fn revolute(body_a: BodyKey, body_b: BodyKey, anchor: Vec2) -> Self {
        Self::new(body_a, body_b, JointDefKind::Revolute { anchor })
    }

    pub fn slider(
        body_a: BodyKey,
        body_b: BodyKey,
        anchor_a: Vec2,
        anchor_b: Vec2,
        min_distance: f32,
        max_distance: f32,
    ) -> Self {
        Self::new(
            body_a,
            body_b,
            JointDefKind::Slider {
                anchor_a,
                anchor_b,
                min_distance,
                max_distance,
            },
        )
    }

    pub fn distance(body_a: BodyKey, body_b: BodyKey, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        Self::new(body_a, body_b, JointDefKind::Distance { anchor_a, anchor_b })
    }

    pub fn pulley(
        body_a: BodyKey,
        body_b: BodyKey,
        ground_a: Vec2,
        ground_b: Vec2,
        anchor_a: Vec2,
        anchor_b: Vec2,
        ratio: f32,
    ) -> Self {
        Self::new(
            body_a,
            body_b,
            JointDefKind::Pulley {
                ground_a,
                ground_b,
                anchor_a,
                anchor_b,
                ratio,
            },
        )
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }

    pub fn with_bias_factor(mut self, bias_factor: f32) -> Self {
        self.params.bias_factor = bias_factor;
        self
    }

    pub fn with_softness(mut self, softness: f32) -> Self {
        self.params.softness = softness.max(0.0);
        self
    }

    pub fn with_breakpoint(mut self, breakpoint: f32) -> Self {
        self.breakpoint = breakpoint;
        self
    }
}

/// Per-kind solver state
#[derive(Clone, Debug, PartialEq)]
pub enum JointKind {
    Revolute(RevoluteJoint),
    Slider(SliderJoint),
    Distance(DistanceJoint),
    Pulley(PulleyJoint),
}

/// A constraint between two bodies
#[derive(Clone, Debug)]
pub struct Joint {
    pub(crate) body_a: BodyKey,
    pub(crate) body_b: BodyKey,
    pub(crate) kind: JointKind,
    pub(crate) enabled: bool,
    pub(crate) collide_connected: bool,
    /// Member of the island being built
    pub(crate) island: bool,
    pub(crate) params: JointParams,
    pub(crate) breakpoint: f32,
    /// Constraint error measured at the last velocity initialization
    pub(crate) error: f32,
    pub(crate) index_a: usize,
    pub(crate) index_b: usize,
}

impl Joint {
    pub(crate) fn new(def: &JointDef, body_a: &Body, body_b: &Body) -> Self {
        let kind = match def.kind {
            JointDefKind::Revolute { anchor } => JointKind::Revolute(RevoluteJoint::new(
                body_a.local_point(anchor),
                body_b.local_point(anchor),
            )),
            JointDefKind::Slider {
                anchor_a,
                anchor_b,
                min_distance,
                max_distance,
            } => JointKind::Slider(SliderJoint::new(
                body_a.local_point(anchor_a),
                body_b.local_point(anchor_b),
                min_distance,
                max_distance,
            )),
            JointDefKind::Distance { anchor_a, anchor_b } => JointKind::Distance(DistanceJoint::new(
                body_a.local_point(anchor_a),
                body_b.local_point(anchor_b),
                anchor_a.distance(anchor_b),
            )),
            JointDefKind::Pulley {
                ground_a,
                ground_b,
                anchor_a,
                anchor_b,
                ratio,
            } => JointKind::Pulley(PulleyJoint::new(
                ground_a,
                ground_b,
                body_a.local_point(anchor_a),
                body_b.local_point(anchor_b),
                anchor_a.distance(ground_a),
                anchor_b.distance(ground_b),
                ratio,
            )),
        };

        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            kind,
            enabled: true,
            collide_connected: def.collide_connected,
            island: false,
            params: def.params,
            breakpoint: def.breakpoint,
            error: 0.0,
            index_a: 0,
            index_b: 0,
        }
    }

    pub fn body_a(&self) -> BodyKey {
        self.body_a
    }

    pub fn body_b(&self) -> BodyKey {
        self.body_b
    }

    /// The body on the other end of the joint
    pub fn other_body(&self, body: BodyKey) -> BodyKey {
        if body == self.body_a {
            self.body_b
        } else {
            self.body_a
        }
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    /// Disabled joints are skipped by island building and solving
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    pub fn params(&self) -> JointParams {
        self.params
    }

    pub fn set_params(&mut self, params: JointParams) {
        self.params = params;
    }

    pub fn breakpoint(&self) -> f32 {
        self.breakpoint
    }

    pub fn set_breakpoint(&mut self, breakpoint: f32) {
        self.breakpoint = breakpoint;
    }

    /// Constraint error measured during the last solve
    pub fn error(&self) -> f32 {
        self.error
    }

    /// Anchors in the local frames of body A and body B
    pub fn local_anchors(&self) -> (Vec2, Vec2) {
        match &self.kind {
            JointKind::Revolute(j) => (j.local_anchor_a, j.local_anchor_b),
            JointKind::Slider(j) => (j.local_anchor_a, j.local_anchor_b),
            JointKind::Distance(j) => (j.local_anchor_a, j.local_anchor_b),
            JointKind::Pulley(j) => (j.local_anchor_a, j.local_anchor_b),
        }
    }

    /// Build effective masses and biases; returns the current error
    pub(crate) fn init_velocity_constraints(&mut self, step: &TimeStep, bodies: &[SolverBody]) -> f32 {
        let a = &bodies[self.index_a];
        let b = &bodies[self.index_b];
        let params = self.params;
        self.error = match &mut self.kind {
            JointKind::Revolute(j) => j.init_velocity(params, step, a, b),
            JointKind::Slider(j) => j.init_velocity(params, step, a, b),
            JointKind::Distance(j) => j.init_velocity(params, step, a, b),
            JointKind::Pulley(j) => j.init_velocity(params, step, a, b),
        };
        self.error
    }

    pub(crate) fn warm_start(&mut self, step: &TimeStep, bodies: &mut [SolverBody]) {
        let (a, b) = pair_mut(bodies, self.index_a, self.index_b);
        match &mut self.kind {
            JointKind::Revolute(j) => j.warm_start(step, a, b),
            JointKind::Slider(j) => j.warm_start(step, a, b),
            JointKind::Distance(j) => j.warm_start(step, a, b),
            JointKind::Pulley(j) => j.warm_start(step, a, b),
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, bodies: &mut [SolverBody]) {
        let (a, b) = pair_mut(bodies, self.index_a, self.index_b);
        let params = self.params;
        match &mut self.kind {
            JointKind::Revolute(j) => j.solve_velocity(params, a, b),
            JointKind::Slider(j) => j.solve_velocity(params, a, b),
            JointKind::Distance(j) => j.solve_velocity(params, a, b),
            JointKind::Pulley(j) => j.solve_velocity(params, a, b),
        }
    }

    /// Returns true when the joint is within tolerance
    pub(crate) fn solve_position_constraints(&mut self, bodies: &mut [SolverBody]) -> bool {
        let (a, b) = pair_mut(bodies, self.index_a, self.index_b);
        match &self.kind {
            JointKind::Revolute(j) => j.solve_position(a, b),
            JointKind::Slider(j) => j.solve_position(a, b),
            JointKind::Distance(j) => j.solve_position(a, b),
            JointKind::Pulley(j) => j.solve_position(a, b),
        }
    }
}

/// Anchor offset from the center of mass in world orientation
fn anchor_arm(body: &SolverBody, local_anchor: Vec2) -> Vec2 {
    Rot::from_angle(body.a).rotate(local_anchor - body.local_center)
}

/// World velocity of an anchor
fn anchor_velocity(body: &SolverBody, r: Vec2) -> Vec2 {
    body.v + Vec2::scalar_cross(body.w, r)
}

/// Apply `p` to B and `-p` to A at their anchors
fn apply_velocity_impulse(a: &mut SolverBody, b: &mut SolverBody, r_a: Vec2, r_b: Vec2, p: Vec2) {
    a.v -= p * a.inv_mass;
    a.w -= a.inv_i * r_a.cross(p);
    b.v += p * b.inv_mass;
    b.w += b.inv_i * r_b.cross(p);
}

/// Positional counterpart of [`apply_velocity_impulse`]
fn apply_position_impulse(a: &mut SolverBody, b: &mut SolverBody, r_a: Vec2, r_b: Vec2, p: Vec2) {
    a.c -= p * a.inv_mass;
    a.a -= a.inv_i * r_a.cross(p);
    b.c += p * b.inv_mass;
    b.a += b.inv_i * r_b.cross(p);
}

/// Scalar effective mass along `u`
fn effective_mass(a: &SolverBody, b: &SolverBody, r_a: Vec2, r_b: Vec2, u: Vec2) -> f32 {
    let cr_a = r_a.cross(u);
    let cr_b = r_b.cross(u);
    a.inv_mass + a.inv_i * cr_a * cr_a + b.inv_mass + b.inv_i * cr_b * cr_b
}

/// Inverse of `k + softness`, zero when degenerate
fn soft_inverse(k: f32, softness: f32) -> f32 {
    let denominator = k + softness;
    if denominator > 0.0 {
        1.0 / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;

    #[test]
    fn test_def_builders() {
        let def = JointDef::revolute(BodyKey::default(), BodyKey::default(), Vec2::ZERO)
            .with_collide_connected(true)
            .with_softness(-1.0)
            .with_bias_factor(0.5)
            .with_breakpoint(3.0);
        assert!(def.collide_connected);
        assert_eq!(def.params.softness, 0.0);
        assert_eq!(def.params.bias_factor, 0.5);
        assert_eq!(def.breakpoint, 3.0);
    }

    #[test]
    fn test_world_anchors_become_local() {
        let a = Body::new(&BodyDef::dynamic(Vec2::new(-1.0, 0.0)));
        let b = Body::new(&BodyDef::dynamic(Vec2::new(1.0, 0.0)));
        let def = JointDef::revolute(BodyKey::default(), BodyKey::default(), Vec2::new(0.0, 0.0));
        let joint = Joint::new(&def, &a, &b);
        let (local_a, local_b) = joint.local_anchors();
        assert_eq!(local_a, Vec2::new(1.0, 0.0));
        assert_eq!(local_b, Vec2::new(-1.0, 0.0));
        assert!(joint.is_enabled());
        assert_eq!(joint.breakpoint(), f32::MAX);
    }

    #[test]
    fn test_distance_length_from_anchors() {
        let a = Body::new(&BodyDef::fixed(Vec2::ZERO));
        let b = Body::new(&BodyDef::dynamic(Vec2::new(3.0, 4.0)));
        let def = JointDef::distance(BodyKey::default(), BodyKey::default(), Vec2::ZERO, Vec2::new(3.0, 4.0));
        match Joint::new(&def, &a, &b).kind() {
            JointKind::Distance(j) => assert!((j.length() - 5.0).abs() < 0.0001),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_soft_inverse_guards_zero() {
        assert_eq!(soft_inverse(0.0, 0.0), 0.0);
        assert_eq!(soft_inverse(1.0, 1.0), 0.5);
    }
}
