//! 2x2 matrix used for effective-mass blocks

use crate::Vec2;
use serde::{Deserialize, Serialize};

/// Column-major 2x2 matrix
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mat22 {
    pub ex: Vec2,
    pub ey: Vec2,
}

impl Mat22 {
    pub const ZERO: Self = Self {
        ex: Vec2::ZERO,
        ey: Vec2::ZERO,
    };

    pub const IDENTITY: Self = Self {
        ex: Vec2::X,
        ey: Vec2::Y,
    };

    /// Build from two columns
    #[inline]
    pub const fn from_cols(ex: Vec2, ey: Vec2) -> Self {
        Self { ex, ey }
    }

    /// Build from row-major scalars `[a11 a12; a21 a22]`
    #[inline]
    pub const fn new(a11: f32, a12: f32, a21: f32, a22: f32) -> Self {
        Self {
            ex: Vec2::new(a11, a21),
            ey: Vec2::new(a12, a22),
        }
    }

    #[inline]
    pub fn determinant(&self) -> f32 {
        self.ex.x * self.ey.y - self.ey.x * self.ex.y
    }

    /// Inverse, or the zero matrix when singular
    pub fn inverse(&self) -> Mat22 {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a * d - b * c;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Mat22::new(det * d, -det * b, -det * c, det * a)
    }

    /// Solve `A * x = b` without forming the inverse
    ///
    /// A singular matrix yields the zero vector.
    pub fn solve(&self, b: Vec2) -> Vec2 {
        let mut det = self.determinant();
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(
            det * (self.ey.y * b.x - self.ey.x * b.y),
            det * (self.ex.x * b.y - self.ex.y * b.x),
        )
    }

    /// Matrix-vector product
    #[inline]
    pub fn mul_vec(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }
}

impl std::ops::Add for Mat22 {
    type Output = Self;
    #[inline]
    fn add(self, other: Self) -> Self {
        Self::from_cols(self.ex + other.ex, self.ey + other.ey)
    }
}

impl std::ops::Mul<Vec2> for Mat22 {
    type Output = Vec2;
    #[inline]
    fn mul(self, v: Vec2) -> Vec2 {
        self.mul_vec(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.0001;

    #[test]
    fn test_identity_mul() {
        let v = Vec2::new(3.0, -2.0);
        assert_eq!(Mat22::IDENTITY * v, v);
    }

    #[test]
    fn test_solve() {
        let m = Mat22::new(2.0, 1.0, 1.0, 3.0);
        let b = Vec2::new(5.0, 10.0);
        let x = m.solve(b);
        let back = m * x;
        assert!((back.x - b.x).abs() < EPSILON);
        assert!((back.y - b.y).abs() < EPSILON);
    }

    #[test]
    fn test_inverse() {
        let m = Mat22::new(4.0, 7.0, 2.0, 6.0);
        let inv = m.inverse();
        let v = Vec2::new(1.0, 1.0);
        let r = inv * (m * v);
        assert!((r.x - 1.0).abs() < EPSILON);
        assert!((r.y - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_singular_is_guarded() {
        let m = Mat22::new(1.0, 2.0, 2.0, 4.0);
        assert_eq!(m.determinant(), 0.0);
        assert_eq!(m.solve(Vec2::new(1.0, 1.0)), Vec2::ZERO);
        assert_eq!(m.inverse(), Mat22::ZERO);
    }

    #[test]
    fn test_add() {
        let m = Mat22::IDENTITY + Mat22::IDENTITY;
        assert_eq!(m, Mat22::new(2.0, 0.0, 0.0, 2.0));
    }
}
