//! 2D rotation stored as sine/cosine

use crate::Vec2;
use serde::{Deserialize, Serialize};

/// A rotation in the plane, stored as `(sin, cos)` of the angle
///
/// Composition and vector rotation only need the pair, so the angle is
/// recovered with `atan2` on demand.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rot {
    pub s: f32,
    pub c: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Self = Self { s: 0.0, c: 1.0 };

    /// Create a rotation from an angle in radians
    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        Self {
            s: angle.sin(),
            c: angle.cos(),
        }
    }

    /// Angle in radians, in `(-pi, pi]`
    #[inline]
    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    /// Local x axis in world space
    #[inline]
    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    /// Local y axis in world space
    #[inline]
    pub fn y_axis(&self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Rotate a vector
    #[inline]
    pub fn rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse-rotate a vector
    #[inline]
    pub fn inv_rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// Compose rotations: `self * other` applies `other` first
    #[inline]
    pub fn mul(&self, other: Rot) -> Rot {
        Rot {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// `self^T * other`, the rotation of `other` relative to `self`
    #[inline]
    pub fn mul_t(&self, other: Rot) -> Rot {
        Rot {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }

    /// Inverse rotation
    #[inline]
    pub fn inverse(&self) -> Rot {
        Rot {
            s: -self.s,
            c: self.c,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    const EPSILON: f32 = 0.0001;

    fn approx_eq(a: Vec2, b: Vec2) -> bool {
        (a.x - b.x).abs() < EPSILON && (a.y - b.y).abs() < EPSILON
    }

    #[test]
    fn test_identity() {
        let v = Vec2::new(1.0, 2.0);
        assert!(approx_eq(Rot::IDENTITY.rotate(v), v));
        assert_eq!(Rot::default(), Rot::IDENTITY);
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let r = Rot::from_angle(FRAC_PI_2);
        assert!(approx_eq(r.rotate(Vec2::X), Vec2::Y));
        assert!(approx_eq(r.inv_rotate(Vec2::Y), Vec2::X));
    }

    #[test]
    fn test_angle_round_trip() {
        let r = Rot::from_angle(1.2);
        assert!((r.angle() - 1.2).abs() < EPSILON);

        let r = Rot::from_angle(PI);
        assert!((r.angle().abs() - PI).abs() < EPSILON);
    }

    #[test]
    fn test_composition() {
        let a = Rot::from_angle(0.3);
        let b = Rot::from_angle(0.5);
        assert!((a.mul(b).angle() - 0.8).abs() < EPSILON);
        assert!((a.mul_t(b).angle() - 0.2).abs() < EPSILON);
        assert!((a.mul(a.inverse()).angle()).abs() < EPSILON);
    }

    #[test]
    fn test_axes() {
        let r = Rot::from_angle(FRAC_PI_2);
        assert!(approx_eq(r.x_axis(), Vec2::Y));
        assert!(approx_eq(r.y_axis(), -Vec2::X));
    }
}
