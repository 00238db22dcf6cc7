//! Distance joint: anchor points held at a fixed separation

use rigid2d_math::Vec2;

use super::{
    anchor_arm, anchor_velocity, apply_position_impulse, apply_velocity_impulse, effective_mass, soft_inverse,
    JointParams,
};
use crate::island::{SolverBody, TimeStep};
use crate::settings::{LINEAR_SLOP, MAX_LINEAR_CORRECTION};

#[derive(Clone, Debug, PartialEq)]
pub struct DistanceJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    length: f32,
    impulse: f32,
    /// Unit axis from anchor A to anchor B
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
    bias: f32,
}

impl DistanceJoint {
    pub(crate) fn new(local_anchor_a: Vec2, local_anchor_b: Vec2, length: f32) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            length: length.max(LINEAR_SLOP),
            impulse: 0.0,
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
            bias: 0.0,
        }
    }

    /// Rest length between the anchors
    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length.max(LINEAR_SLOP);
    }

    pub fn impulse(&self) -> f32 {
        self.impulse
    }

    pub(crate) fn init_velocity(&mut self, params: JointParams, step: &TimeStep, a: &SolverBody, b: &SolverBody) -> f32 {
        self.r_a = anchor_arm(a, self.local_anchor_a);
        self.r_b = anchor_arm(b, self.local_anchor_b);
        let d = b.c + self.r_b - a.c - self.r_a;

        // Handle singularity
        let current = d.length();
        self.u = if current > LINEAR_SLOP {
            d * (1.0 / current)
        } else {
            Vec2::ZERO
        };

        let k = effective_mass(a, b, self.r_a, self.r_b, self.u);
        self.mass = soft_inverse(k, params.softness);

        let error = current - self.length;
        self.bias = params.bias_factor * step.inv_dt * error;
        error
    }

    pub(crate) fn warm_start(&mut self, step: &TimeStep, a: &mut SolverBody, b: &mut SolverBody) {
        if step.warm_starting {
            self.impulse *= step.dt_ratio;
            apply_velocity_impulse(a, b, self.r_a, self.r_b, self.u * self.impulse);
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity(&mut self, params: JointParams, a: &mut SolverBody, b: &mut SolverBody) {
        let cdot = self.u.dot(anchor_velocity(b, self.r_b) - anchor_velocity(a, self.r_a));
        let impulse = -self.mass * (cdot + self.bias + params.softness * self.impulse);
        self.impulse += impulse;
        apply_velocity_impulse(a, b, self.r_a, self.r_b, self.u * impulse);
    }

    pub(crate) fn solve_position(&self, a: &mut SolverBody, b: &mut SolverBody) -> bool {
        let r_a = anchor_arm(a, self.local_anchor_a);
        let r_b = anchor_arm(b, self.local_anchor_b);
        let d = b.c + r_b - a.c - r_a;
        let Some((u, current)) = d.try_normalize() else {
            return true;
        };

        let error = current - self.length;
        let c = error.clamp(-MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);
        let k = effective_mass(a, b, r_a, r_b, u);
        let impulse = if k > 0.0 { -c / k } else { 0.0 };
        apply_position_impulse(a, b, r_a, r_b, u * impulse);

        error.abs() < LINEAR_SLOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.0001;

    fn body(c: Vec2, v: Vec2) -> SolverBody {
        SolverBody {
            c,
            v,
            inv_mass: 1.0,
            inv_i: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_relative_axial_velocity_removed() {
        let mut joint = DistanceJoint::new(Vec2::ZERO, Vec2::ZERO, 2.0);
        let mut a = body(Vec2::ZERO, Vec2::ZERO);
        let mut b = body(Vec2::new(2.0, 0.0), Vec2::new(1.0, 0.5));
        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        let params = JointParams::default();

        assert!(joint.init_velocity(params, &step, &a, &b).abs() < EPSILON);
        joint.warm_start(&step, &mut a, &mut b);
        joint.solve_velocity(params, &mut a, &mut b);

        // Axial speed shared, tangential speed untouched
        assert!((b.v.x - a.v.x).abs() < EPSILON);
        assert!((a.v.x - 0.5).abs() < EPSILON);
        assert!((b.v.y - 0.5).abs() < EPSILON);
        assert!((joint.impulse() + 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_stretched_joint_is_pulled_back() {
        let joint = DistanceJoint::new(Vec2::ZERO, Vec2::ZERO, 1.0);
        let mut a = body(Vec2::ZERO, Vec2::ZERO);
        let mut b = body(Vec2::new(1.3, 0.0), Vec2::ZERO);

        let mut ok = false;
        for _ in 0..10 {
            if joint.solve_position(&mut a, &mut b) {
                ok = true;
                break;
            }
        }
        assert!(ok);
        assert!(((b.c - a.c).length() - 1.0).abs() < LINEAR_SLOP);
    }

    #[test]
    fn test_softness_reduces_impulse() {
        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        let mut stiff = DistanceJoint::new(Vec2::ZERO, Vec2::ZERO, 2.0);
        let mut soft = stiff.clone();
        let soft_params = JointParams {
            softness: 2.0,
            ..Default::default()
        };

        let (mut a1, mut b1) = (body(Vec2::ZERO, Vec2::ZERO), body(Vec2::new(2.0, 0.0), Vec2::new(1.0, 0.0)));
        let (mut a2, mut b2) = (a1, b1);
        stiff.init_velocity(JointParams::default(), &step, &a1, &b1);
        soft.init_velocity(soft_params, &step, &a2, &b2);
        stiff.solve_velocity(JointParams::default(), &mut a1, &mut b1);
        soft.solve_velocity(soft_params, &mut a2, &mut b2);

        assert!(soft.impulse().abs() < stiff.impulse().abs());
    }
}
