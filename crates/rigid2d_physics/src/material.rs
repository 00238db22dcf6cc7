//! Physical material properties for fixtures

use serde::{Deserialize, Serialize};

/// Physical material properties of a fixture
///
/// Density drives the body's mass properties; friction and restitution are
/// mixed between the two fixtures of a contact.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicsMaterial {
    /// Friction coefficient (0.0 = ice, 1.0 = rubber)
    pub friction: f32,
    /// Restitution/bounciness (0.0 = no bounce, 1.0 = perfect bounce)
    pub restitution: f32,
    /// Mass per unit area, kg/m^2
    pub density: f32,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            friction: 0.2,
            restitution: 0.0,
            density: 1.0,
        }
    }
}

impl PhysicsMaterial {
    /// Ice-like material: very low friction, slight bounce
    pub const ICE: Self = Self {
        friction: 0.05,
        restitution: 0.1,
        density: 0.9,
    };

    /// Rubber-like material: high friction, very bouncy
    pub const RUBBER: Self = Self {
        friction: 0.9,
        restitution: 0.8,
        density: 1.1,
    };

    /// Metal-like material: moderate friction and bounce
    pub const METAL: Self = Self {
        friction: 0.3,
        restitution: 0.3,
        density: 7.8,
    };

    /// Wood-like material: moderate friction, low bounce
    pub const WOOD: Self = Self {
        friction: 0.5,
        restitution: 0.2,
        density: 0.6,
    };

    /// Concrete-like material: high friction, very low bounce
    pub const CONCRETE: Self = Self {
        friction: 0.7,
        restitution: 0.1,
        density: 2.4,
    };

    /// Create a new physics material
    ///
    /// Friction and restitution are clamped to [0.0, 1.0]; density is
    /// clamped to be non-negative.
    pub fn new(friction: f32, restitution: f32, density: f32) -> Self {
        Self {
            friction: friction.clamp(0.0, 1.0),
            restitution: restitution.clamp(0.0, 1.0),
            density: density.max(0.0),
        }
    }

    /// Same material with a different density
    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density.max(0.0);
        self
    }

    /// Mixed friction of two materials (geometric mean)
    pub fn mix_friction(&self, other: &Self) -> f32 {
        (self.friction * other.friction).sqrt()
    }

    /// Mixed restitution of two materials (most bouncy surface wins)
    pub fn mix_restitution(&self, other: &Self) -> f32 {
        self.restitution.max(other.restitution)
    }
}
