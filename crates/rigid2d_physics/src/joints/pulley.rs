//! Pulley joint: a rope of fixed total length over two ground points
//!
//! `length_a + ratio * length_b <= constant`, with the constant taken from
//! the configuration at creation. The rope can go slack; it only pulls.

use rigid2d_math::Vec2;

use super::{anchor_arm, anchor_velocity, soft_inverse, JointParams};
use crate::island::{SolverBody, TimeStep};
use crate::settings::{EPSILON, LINEAR_SLOP, MAX_LINEAR_CORRECTION};

#[derive(Clone, Debug, PartialEq)]
pub struct PulleyJoint {
    ground_a: Vec2,
    ground_b: Vec2,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    ratio: f32,
    constant: f32,
    /// Rope is taut this step
    active: bool,
    impulse: f32,
    u_a: Vec2,
    u_b: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
    bias: f32,
}

/// Rope axes from the ground points to the anchors, and their lengths
struct RopeGeometry {
    u_a: Vec2,
    u_b: Vec2,
    length_a: f32,
    length_b: f32,
}

impl PulleyJoint {
    pub(crate) fn new(
        ground_a: Vec2,
        ground_b: Vec2,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        length_a: f32,
        length_b: f32,
        ratio: f32,
    ) -> Self {
        let ratio = ratio.max(EPSILON);
        Self {
            ground_a,
            ground_b,
            local_anchor_a,
            local_anchor_b,
            ratio,
            constant: length_a + ratio * length_b,
            active: false,
            impulse: 0.0,
            u_a: Vec2::ZERO,
            u_b: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
            bias: 0.0,
        }
    }

    pub fn ground_anchor_a(&self) -> Vec2 {
        self.ground_a
    }

    pub fn ground_anchor_b(&self) -> Vec2 {
        self.ground_b
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Total rope length, `length_a + ratio * length_b`
    pub fn total_length(&self) -> f32 {
        self.constant
    }

    pub fn impulse(&self) -> f32 {
        self.impulse
    }

    pub fn is_taut(&self) -> bool {
        self.active
    }

    fn geometry(&self, a: &SolverBody, b: &SolverBody, r_a: Vec2, r_b: Vec2) -> RopeGeometry {
        let d_a = a.c + r_a - self.ground_a;
        let d_b = b.c + r_b - self.ground_b;
        let length_a = d_a.length();
        let length_b = d_b.length();
        RopeGeometry {
            u_a: if length_a > LINEAR_SLOP { d_a * (1.0 / length_a) } else { Vec2::ZERO },
            u_b: if length_b > LINEAR_SLOP { d_b * (1.0 / length_b) } else { Vec2::ZERO },
            length_a,
            length_b,
        }
    }

    fn effective_mass(&self, a: &SolverBody, b: &SolverBody, r_a: Vec2, r_b: Vec2, u_a: Vec2, u_b: Vec2) -> f32 {
        let cr_a = r_a.cross(u_a);
        let cr_b = r_b.cross(u_b);
        a.inv_mass + a.inv_i * cr_a * cr_a + self.ratio * self.ratio * (b.inv_mass + b.inv_i * cr_b * cr_b)
    }

    /// Both bodies receive their impulse with a positive sign
    fn apply(&self, a: &mut SolverBody, b: &mut SolverBody, impulse: f32) {
        let p_a = self.u_a * -impulse;
        let p_b = self.u_b * (-self.ratio * impulse);
        a.v += p_a * a.inv_mass;
        a.w += a.inv_i * self.r_a.cross(p_a);
        b.v += p_b * b.inv_mass;
        b.w += b.inv_i * self.r_b.cross(p_b);
    }

    pub(crate) fn init_velocity(&mut self, params: JointParams, step: &TimeStep, a: &SolverBody, b: &SolverBody) -> f32 {
        self.r_a = anchor_arm(a, self.local_anchor_a);
        self.r_b = anchor_arm(b, self.local_anchor_b);
        let rope = self.geometry(a, b, self.r_a, self.r_b);
        self.u_a = rope.u_a;
        self.u_b = rope.u_b;

        let c = self.constant - rope.length_a - self.ratio * rope.length_b;
        self.active = c <= 0.0;
        if !self.active {
            self.impulse = 0.0;
            self.bias = 0.0;
            return 0.0;
        }

        let k = self.effective_mass(a, b, self.r_a, self.r_b, self.u_a, self.u_b);
        self.mass = soft_inverse(k, params.softness);
        self.bias = params.bias_factor * step.inv_dt * c;
        c
    }

    pub(crate) fn warm_start(&mut self, step: &TimeStep, a: &mut SolverBody, b: &mut SolverBody) {
        if self.active && step.warm_starting {
            self.impulse *= step.dt_ratio;
            self.apply(a, b, self.impulse);
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity(&mut self, params: JointParams, a: &mut SolverBody, b: &mut SolverBody) {
        if !self.active {
            return;
        }

        let cdot = -self.u_a.dot(anchor_velocity(a, self.r_a)) - self.ratio * self.u_b.dot(anchor_velocity(b, self.r_b));
        let impulse = -self.mass * (cdot + self.bias + params.softness * self.impulse);

        let old_impulse = self.impulse;
        self.impulse = (old_impulse + impulse).max(0.0);
        self.apply(a, b, self.impulse - old_impulse);
    }

    pub(crate) fn solve_position(&self, a: &mut SolverBody, b: &mut SolverBody) -> bool {
        let r_a = anchor_arm(a, self.local_anchor_a);
        let r_b = anchor_arm(b, self.local_anchor_b);
        let rope = self.geometry(a, b, r_a, r_b);

        let c = self.constant - rope.length_a - self.ratio * rope.length_b;
        let linear_error = (-c).max(0.0);
        let c = (c + LINEAR_SLOP).clamp(-MAX_LINEAR_CORRECTION, 0.0);

        let k = self.effective_mass(a, b, r_a, r_b, rope.u_a, rope.u_b);
        let impulse = if k > 0.0 { -c / k } else { 0.0 };

        let p_a = rope.u_a * -impulse;
        let p_b = rope.u_b * (-self.ratio * impulse);
        a.c += p_a * a.inv_mass;
        a.a += a.inv_i * r_a.cross(p_a);
        b.c += p_b * b.inv_mass;
        b.a += b.inv_i * r_b.cross(p_b);

        // The correction leaves up to one slop of stretch
        linear_error < 1.5 * LINEAR_SLOP
    }
}
