//! Revolute joint: two bodies share an anchor point

use rigid2d_math::{Mat22, Vec2};

use super::{anchor_arm, anchor_velocity, apply_position_impulse, apply_velocity_impulse, JointParams};
use crate::island::{SolverBody, TimeStep};
use crate::settings::LINEAR_SLOP;

#[derive(Clone, Debug, PartialEq)]
pub struct RevoluteJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    impulse: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    /// Point-to-point mass matrix with softness on the diagonal
    k: Mat22,
    bias: Vec2,
}

/// Point constraint mass matrix for arms `r_a` and `r_b`
fn point_mass(a: &SolverBody, b: &SolverBody, r_a: Vec2, r_b: Vec2) -> Mat22 {
    let m = a.inv_mass + b.inv_mass;
    let (i_a, i_b) = (a.inv_i, b.inv_i);
    let off = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
    Mat22::new(
        m + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
        off,
        off,
        m + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
    )
}

impl RevoluteJoint {
    pub(crate) fn new(local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            impulse: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            k: Mat22::ZERO,
            bias: Vec2::ZERO,
        }
    }

    /// Accumulated impulse from the last step
    pub fn impulse(&self) -> Vec2 {
        self.impulse
    }

    pub(crate) fn init_velocity(&mut self, params: JointParams, step: &TimeStep, a: &SolverBody, b: &SolverBody) -> f32 {
        self.r_a = anchor_arm(a, self.local_anchor_a);
        self.r_b = anchor_arm(b, self.local_anchor_b);
        self.k = point_mass(a, b, self.r_a, self.r_b) + Mat22::new(params.softness, 0.0, 0.0, params.softness);

        let error = b.c + self.r_b - a.c - self.r_a;
        self.bias = error * (params.bias_factor * step.inv_dt);
        error.length()
    }

    pub(crate) fn warm_start(&mut self, step: &TimeStep, a: &mut SolverBody, b: &mut SolverBody) {
        if step.warm_starting {
            self.impulse *= step.dt_ratio;
            apply_velocity_impulse(a, b, self.r_a, self.r_b, self.impulse);
        } else {
            self.impulse = Vec2::ZERO;
        }
    }

    pub(crate) fn solve_velocity(&mut self, params: JointParams, a: &mut SolverBody, b: &mut SolverBody) {
        let cdot = anchor_velocity(b, self.r_b) - anchor_velocity(a, self.r_a);
        let impulse = self.k.solve(-(cdot + self.bias + self.impulse * params.softness));
        self.impulse += impulse;
        apply_velocity_impulse(a, b, self.r_a, self.r_b, impulse);
    }

    pub(crate) fn solve_position(&self, a: &mut SolverBody, b: &mut SolverBody) -> bool {
        let r_a = anchor_arm(a, self.local_anchor_a);
        let r_b = anchor_arm(b, self.local_anchor_b);
        let c = b.c + r_b - a.c - r_a;

        let impulse = -point_mass(a, b, r_a, r_b).solve(c);
        apply_position_impulse(a, b, r_a, r_b, impulse);
        c.length() <= LINEAR_SLOP
    }
}
