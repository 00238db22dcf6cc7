//! Slider joint: anchor distance limited to a range
//!
//! Between the limits the joint applies nothing. Past a limit it acts as a
//! one-sided distance constraint: pulling back at the upper limit, pushing
//! apart at the lower one. The accumulated impulse is dropped whenever the
//! violated side changes or the joint returns inside the range.

use rigid2d_math::Vec2;

use super::{
    anchor_arm, anchor_velocity, apply_position_impulse, apply_velocity_impulse, effective_mass, soft_inverse,
    JointParams,
};
use crate::island::{SolverBody, TimeStep};
use crate::settings::{EPSILON, MAX_LINEAR_CORRECTION};

/// Default tolerance past a limit before any error is reported
pub const DEFAULT_SLIDER_SLOP: f32 = 0.01;

#[derive(Clone, Debug, PartialEq)]
pub struct SliderJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    min_distance: f32,
    max_distance: f32,
    slop: f32,
    lower_violated: bool,
    upper_violated: bool,
    impulse: f32,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
    bias: f32,
}

impl SliderJoint {
    pub(crate) fn new(local_anchor_a: Vec2, local_anchor_b: Vec2, min_distance: f32, max_distance: f32) -> Self {
        let min_distance = min_distance.max(0.0);
        Self {
            local_anchor_a,
            local_anchor_b,
            min_distance,
            max_distance: max_distance.max(min_distance),
            slop: DEFAULT_SLIDER_SLOP,
            lower_violated: false,
            upper_violated: false,
            impulse: 0.0,
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
            bias: 0.0,
        }
    }

    pub fn min_distance(&self) -> f32 {
        self.min_distance
    }

    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    /// Set both limits; `max` is raised to `min` if needed
    pub fn set_limits(&mut self, min: f32, max: f32) {
        self.min_distance = min.max(0.0);
        self.max_distance = max.max(self.min_distance);
    }

    pub fn slop(&self) -> f32 {
        self.slop
    }

    pub fn set_slop(&mut self, slop: f32) {
        self.slop = slop.max(0.0);
    }

    pub fn impulse(&self) -> f32 {
        self.impulse
    }

    pub fn is_upper_limit_violated(&self) -> bool {
        self.upper_violated
    }

    pub fn is_lower_limit_violated(&self) -> bool {
        self.lower_violated
    }

    pub(crate) fn init_velocity(&mut self, params: JointParams, step: &TimeStep, a: &SolverBody, b: &SolverBody) -> f32 {
        self.r_a = anchor_arm(a, self.local_anchor_a);
        self.r_b = anchor_arm(b, self.local_anchor_b);
        let d = b.c + self.r_b - a.c - self.r_a;
        let distance = d.length();

        let error = if distance > self.max_distance {
            if self.lower_violated {
                self.impulse = 0.0;
                self.lower_violated = false;
            }
            self.upper_violated = true;
            if distance < self.max_distance + self.slop {
                0.0
            } else {
                distance - self.max_distance
            }
        } else if distance < self.min_distance {
            if self.upper_violated {
                self.impulse = 0.0;
                self.upper_violated = false;
            }
            self.lower_violated = true;
            if distance > self.min_distance - self.slop {
                0.0
            } else {
                distance - self.min_distance
            }
        } else {
            self.upper_violated = false;
            self.lower_violated = false;
            self.impulse = 0.0;
            0.0
        };

        self.u = if distance > EPSILON { d * (1.0 / distance) } else { Vec2::ZERO };
        self.bias = params.bias_factor * step.inv_dt * error;
        let k = effective_mass(a, b, self.r_a, self.r_b, self.u);
        self.mass = soft_inverse(k, params.softness);
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
        if !self.upper_violated && !self.lower_violated {
            return;
        }

        let cdot = self.u.dot(anchor_velocity(b, self.r_b) - anchor_velocity(a, self.r_a));
        let impulse = -self.mass * (cdot + self.bias + params.softness * self.impulse);

        let old_impulse = self.impulse;
        self.impulse = if self.upper_violated {
            (old_impulse + impulse).min(0.0)
        } else {
            (old_impulse + impulse).max(0.0)
        };
        let impulse = self.impulse - old_impulse;

        apply_velocity_impulse(a, b, self.r_a, self.r_b, self.u * impulse);
    }

    pub(crate) fn solve_position(&self, a: &mut SolverBody, b: &mut SolverBody) -> bool {
        let r_a = anchor_arm(a, self.local_anchor_a);
        let r_b = anchor_arm(b, self.local_anchor_b);
        let d = b.c + r_b - a.c - r_a;
        let Some((u, distance)) = d.try_normalize() else {
            return true;
        };

        let c = if distance > self.max_distance {
            (distance - self.max_distance).min(MAX_LINEAR_CORRECTION)
        } else if distance < self.min_distance {
            (distance - self.min_distance).max(-MAX_LINEAR_CORRECTION)
        } else {
            return true;
        };

        let k = effective_mass(a, b, r_a, r_b, u);
        let impulse = if k > 0.0 { -c / k } else { 0.0 };
        apply_position_impulse(a, b, r_a, r_b, u * impulse);

        c.abs() <= self.slop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.0001;

    fn body(x: f32, vx: f32) -> SolverBody {
        SolverBody {
            c: Vec2::new(x, 0.0),
            v: Vec2::new(vx, 0.0),
            inv_mass: 1.0,
            ..Default::default()
        }
    }

    fn run(joint: &mut SliderJoint, a: &mut SolverBody, b: &mut SolverBody) -> f32 {
        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        let params = JointParams::default();
        let error = joint.init_velocity(params, &step, a, b);
        joint.warm_start(&step, a, b);
        for _ in 0..8 {
            joint.solve_velocity(params, a, b);
        }
        error
    }

    #[test]
    fn test_free_between_limits() {
        let mut joint = SliderJoint::new(Vec2::ZERO, Vec2::ZERO, 1.0, 3.0);
        let (mut a, mut b) = (body(0.0, 0.0), body(2.0, 5.0));
        assert_eq!(run(&mut joint, &mut a, &mut b), 0.0);
        assert_eq!(b.v.x, 5.0);
        assert_eq!(joint.impulse(), 0.0);
    }

    #[test]
    fn test_upper_limit_pulls_only() {
        let mut joint = SliderJoint::new(Vec2::ZERO, Vec2::ZERO, 1.0, 3.0);
        let (mut a, mut b) = (body(0.0, 0.0), body(3.5, 1.0));
        let error = run(&mut joint, &mut a, &mut b);
        assert!((error - 0.5).abs() < EPSILON);
        assert!(joint.is_upper_limit_violated());
        assert!(joint.impulse() <= 0.0);
        // Separation speed removed, plus the bias pulling back
        assert!(b.v.x - a.v.x < 0.0);

        // Moving inwards past the limit gets no push
        let mut joint = SliderJoint::new(Vec2::ZERO, Vec2::ZERO, 1.0, 3.0);
        let (mut a, mut b) = (body(0.0, 0.0), body(3.005, -100.0));
        run(&mut joint, &mut a, &mut b);
        assert_eq!(joint.impulse(), 0.0);
        assert_eq!(b.v.x, -100.0);
    }

    #[test]
    fn test_lower_limit_pushes_only() {
        let mut joint = SliderJoint::new(Vec2::ZERO, Vec2::ZERO, 1.0, 3.0);
        let (mut a, mut b) = (body(0.0, 0.0), body(0.5, -1.0));
        let error = run(&mut joint, &mut a, &mut b);
        assert!((error + 0.5).abs() < EPSILON);
        assert!(joint.is_lower_limit_violated());
        assert!(joint.impulse() >= 0.0);
        assert!(b.v.x - a.v.x > 0.0);
    }

    #[test]
    fn test_error_zero_within_slop() {
        let mut joint = SliderJoint::new(Vec2::ZERO, Vec2::ZERO, 1.0, 3.0);
        let (mut a, mut b) = (body(0.0, 0.0), body(3.005, 0.0));
        assert_eq!(run(&mut joint, &mut a, &mut b), 0.0);
        assert!(joint.is_upper_limit_violated());
    }

    #[test]
    fn test_side_switch_resets_impulse() {
        let mut joint = SliderJoint::new(Vec2::ZERO, Vec2::ZERO, 1.0, 3.0);
        let (mut a, mut b) = (body(0.0, 0.0), body(3.5, 1.0));
        run(&mut joint, &mut a, &mut b);
        assert!(joint.impulse() < 0.0);

        let (mut a, mut b) = (body(0.0, 0.0), body(0.5, 0.0));
        let step = TimeStep::new(1.0 / 60.0, 8, 3);
        joint.init_velocity(JointParams::default(), &step, &a, &b);
        assert_eq!(joint.impulse(), 0.0);
        joint.warm_start(&step, &mut a, &mut b);
        assert_eq!(b.v.x, 0.0);
    }

    #[test]
    fn test_position_correction_reaches_limit() {
        let joint = SliderJoint::new(Vec2::ZERO, Vec2::ZERO, 1.0, 3.0);
        let (mut a, mut b) = (body(0.0, 0.0), body(3.4, 0.0));
        let mut ok = false;
        for _ in 0..10 {
            if joint.solve_position(&mut a, &mut b) {
                ok = true;
                break;
            }
        }
        assert!(ok);
        assert!((b.c - a.c).length() <= 3.0 + joint.slop());
    }
}
