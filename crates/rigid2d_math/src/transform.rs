//! Rigid transforms and motion sweeps

use crate::{Rot, Vec2};
use serde::{Deserialize, Serialize};

/// A rigid transform: translation followed by rotation
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub p: Vec2,
    pub q: Rot,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    #[inline]
    pub fn new(p: Vec2, angle: f32) -> Self {
        Self {
            p,
            q: Rot::from_angle(angle),
        }
    }

    /// Transform a local point into world space
    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        self.q.rotate(v) + self.p
    }

    /// Transform a world point into local space
    #[inline]
    pub fn apply_inverse(&self, v: Vec2) -> Vec2 {
        self.q.inv_rotate(v - self.p)
    }

    /// Compose: `self * other`
    #[inline]
    pub fn mul(&self, other: &Transform) -> Transform {
        Transform {
            q: self.q.mul(other.q),
            p: self.q.rotate(other.p) + self.p,
        }
    }

    /// `self^-1 * other`
    #[inline]
    pub fn mul_t(&self, other: &Transform) -> Transform {
        Transform {
            q: self.q.mul_t(other.q),
            p: self.q.inv_rotate(other.p - self.p),
        }
    }
}

/// Motion of a body's center of mass over one step
///
/// `c0`/`a0` is the pose at time `alpha0` inside the step and `c`/`a` the
/// pose at the end of the step. The body origin is recovered from the
/// center of mass through `local_center`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub local_center: Vec2,
    pub c0: Vec2,
    pub c: Vec2,
    pub a0: f32,
    pub a: f32,
    pub alpha0: f32,
}

impl Sweep {
    /// Interpolated transform at `beta` in `[0, 1]`
    pub fn get_transform(&self, beta: f32) -> Transform {
        let c = self.c0 * (1.0 - beta) + self.c * beta;
        let a = (1.0 - beta) * self.a0 + beta * self.a;
        let q = Rot::from_angle(a);
        Transform {
            p: c - q.rotate(self.local_center),
            q,
        }
    }

    /// Move the start of the sweep forward to `alpha`
    pub fn advance(&mut self, alpha: f32) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Wrap angles so `a0` lies in `(-2pi, 2pi)`
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * std::f32::consts::PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPSILON: f32 = 0.0001;

    fn approx_eq(a: Vec2, b: Vec2) -> bool {
        (a.x - b.x).abs() < EPSILON && (a.y - b.y).abs() < EPSILON
    }

    #[test]
    fn test_apply_and_inverse() {
        let xf = Transform::new(Vec2::new(1.0, 2.0), FRAC_PI_2);
        let world = xf.apply(Vec2::new(1.0, 0.0));
        assert!(approx_eq(world, Vec2::new(1.0, 3.0)));
        assert!(approx_eq(xf.apply_inverse(world), Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn test_mul_t_is_relative() {
        let a = Transform::new(Vec2::new(1.0, 0.0), 0.4);
        let b = Transform::new(Vec2::new(-2.0, 3.0), 1.1);
        let rel = a.mul_t(&b);
        let p = Vec2::new(0.5, -0.25);
        assert!(approx_eq(a.apply(rel.apply(p)), b.apply(p)));
        assert!(approx_eq(a.mul(&rel).p, b.p));
    }

    #[test]
    fn test_sweep_interpolation() {
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: Vec2::ZERO,
            c: Vec2::new(10.0, 0.0),
            a0: 0.0,
            a: 1.0,
            alpha0: 0.0,
        };
        let xf = sweep.get_transform(0.5);
        assert!(approx_eq(xf.p, Vec2::new(5.0, 0.0)));
        assert!((xf.q.angle() - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_sweep_local_center_offset() {
        let sweep = Sweep {
            local_center: Vec2::new(1.0, 0.0),
            c0: Vec2::new(1.0, 0.0),
            c: Vec2::new(1.0, 0.0),
            a0: FRAC_PI_2,
            a: FRAC_PI_2,
            alpha0: 0.0,
        };
        // The origin sits one unit "behind" the center along the rotated x axis
        let xf = sweep.get_transform(1.0);
        assert!(approx_eq(xf.p, Vec2::new(1.0, -1.0)));
    }

    #[test]
    fn test_sweep_advance() {
        let mut sweep = Sweep {
            c: Vec2::new(4.0, 0.0),
            a: 2.0,
            ..Default::default()
        };
        sweep.advance(0.5);
        assert!(approx_eq(sweep.c0, Vec2::new(2.0, 0.0)));
        assert!((sweep.a0 - 1.0).abs() < EPSILON);
        assert_eq!(sweep.alpha0, 0.5);

        // A second advance is relative to the remaining interval
        sweep.advance(0.75);
        assert!(approx_eq(sweep.c0, Vec2::new(3.0, 0.0)));
    }

    #[test]
    fn test_sweep_normalize() {
        let mut sweep = Sweep {
            a0: 7.0,
            a: 7.5,
            ..Default::default()
        };
        sweep.normalize();
        assert!(sweep.a0 >= 0.0 && sweep.a0 < 2.0 * std::f32::consts::PI);
        assert!((sweep.a - sweep.a0 - 0.5).abs() < EPSILON);
    }
}
