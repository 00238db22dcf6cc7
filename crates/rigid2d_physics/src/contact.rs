//! Contacts between fixture pairs
//!
//! A contact exists for every pair of fixtures whose fat AABBs overlap. It
//! keeps the manifold from the narrow phase, the touching state and the
//! cached time of impact used by the continuous pass.

use bitflags::bitflags;
use rigid2d_math::Transform;
use slotmap::new_key_type;

use crate::body::BodyKey;
use crate::collision::{
    collide_circles, collide_polygon_and_circle, collide_polygons, Manifold, WorldManifold,
};
use crate::distance::core_distance;
use crate::fixture::{Fixture, FixtureKey};
use crate::shapes::Shape;

new_key_type! {
    /// Key to a contact in the physics world
    ///
    /// Contacts come and go as fixtures move; a key may go stale after any
    /// step.
    pub struct ContactKey;
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct ContactFlags: u8 {
        /// Member of the island being built
        const ISLAND = 1 << 0;
        const TOUCHING = 1 << 1;
        /// Cleared by the user to ignore the contact
        const ENABLED = 1 << 2;
        /// Pair must be re-filtered before the next update
        const FILTER = 1 << 3;
        /// `toi` holds a valid value for this pass
        const TOI = 1 << 4;
        const SENSOR = 1 << 5;
        /// Takes part in the time-of-impact pass
        const CONTINUOUS = 1 << 6;
    }
}

/// Narrow-phase manifold for two shapes
///
/// The polygon and circle routine expects the polygon first; a circle
/// against a polygon runs it swapped and flips the result back.
pub fn evaluate(shape_a: &Shape, xf_a: &Transform, shape_b: &Shape, xf_b: &Transform) -> Manifold {
    match (shape_a, shape_b) {
        (Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Circle(b)) => collide_polygon_and_circle(a, xf_a, b, xf_b),
        (Shape::Circle(a), Shape::Polygon(b)) => collide_polygon_and_circle(b, xf_b, a, xf_a).flipped(),
        (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
    }
}

/// Overlap test for sensors; no manifold is produced
pub fn test_overlap(shape_a: &Shape, xf_a: &Transform, shape_b: &Shape, xf_b: &Transform) -> bool {
    let out = core_distance(shape_a, xf_a, shape_b, xf_b);
    out.distance < shape_a.radius() + shape_b.radius()
}

/// Result of a manifold refresh
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ContactUpdate {
    pub was_touching: bool,
    pub touching: bool,
}

impl ContactUpdate {
    pub fn began(&self) -> bool {
        !self.was_touching && self.touching
    }

    pub fn ended(&self) -> bool {
        self.was_touching && !self.touching
    }
}

/// Contact between two fixtures
#[derive(Clone, Debug)]
pub struct Contact {
    pub(crate) flags: ContactFlags,
    pub(crate) fixture_a: FixtureKey,
    pub(crate) fixture_b: FixtureKey,
    pub(crate) body_a: BodyKey,
    pub(crate) body_b: BodyKey,
    pub(crate) manifold: Manifold,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    /// Skin radii of the two shapes, cached for the solver
    pub(crate) radius_a: f32,
    pub(crate) radius_b: f32,
    pub(crate) toi: f32,
    /// Time-of-impact sub-steps taken this step
    pub(crate) toi_count: u32,
}

impl Contact {
    pub(crate) fn new(
        fixture_a_key: FixtureKey,
        fixture_a: &Fixture,
        fixture_b_key: FixtureKey,
        fixture_b: &Fixture,
    ) -> Self {
        let mut flags = ContactFlags::ENABLED;
        if fixture_a.is_sensor || fixture_b.is_sensor {
            flags |= ContactFlags::SENSOR;
        }
        Self {
            flags,
            fixture_a: fixture_a_key,
            fixture_b: fixture_b_key,
            body_a: fixture_a.body,
            body_b: fixture_b.body,
            manifold: Manifold::default(),
            friction: fixture_a.material.mix_friction(&fixture_b.material),
            restitution: fixture_a.material.mix_restitution(&fixture_b.material),
            radius_a: fixture_a.shape.radius(),
            radius_b: fixture_b.shape.radius(),
            toi: 1.0,
            toi_count: 0,
        }
    }

    pub fn fixture_a(&self) -> FixtureKey {
        self.fixture_a
    }

    pub fn fixture_b(&self) -> FixtureKey {
        self.fixture_b
    }

    pub fn body_a(&self) -> BodyKey {
        self.body_a
    }

    pub fn body_b(&self) -> BodyKey {
        self.body_b
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// World-space normal, points and separations for the given body transforms
    pub fn world_manifold(&self, xf_a: &Transform, xf_b: &Transform) -> WorldManifold {
        WorldManifold::new(&self.manifold, xf_a, self.radius_a, xf_b, self.radius_b)
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn is_touching(&self) -> bool {
        self.flags.contains(ContactFlags::TOUCHING)
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.contains(ContactFlags::ENABLED)
    }

    pub fn is_sensor(&self) -> bool {
        self.flags.contains(ContactFlags::SENSOR)
    }

    pub fn is_continuous(&self) -> bool {
        self.flags.contains(ContactFlags::CONTINUOUS)
    }

    /// Whether the contact takes part in solving: touching, enabled, not a sensor
    pub(crate) fn is_solid(&self) -> bool {
        self.flags.contains(ContactFlags::TOUCHING | ContactFlags::ENABLED)
            && !self.flags.contains(ContactFlags::SENSOR)
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.flags.set(ContactFlags::ENABLED, enabled);
    }

    /// Mark the pair for re-filtering on the next collide
    pub(crate) fn flag_for_filtering(&mut self) {
        self.flags |= ContactFlags::FILTER;
    }

    /// The fixture on the other side of the contact
    pub fn other_fixture(&self, fixture: FixtureKey) -> FixtureKey {
        if fixture == self.fixture_a {
            self.fixture_b
        } else {
            self.fixture_a
        }
    }

    /// Refresh the manifold for the current body transforms
    ///
    /// Impulses of points that persist (same id) are carried over for warm
    /// starting. The enabled flag is left as the user set it.
    pub(crate) fn update(
        &mut self,
        shape_a: &Shape,
        xf_a: &Transform,
        shape_b: &Shape,
        xf_b: &Transform,
    ) -> ContactUpdate {
        let old_manifold = self.manifold;
        let was_touching = self.is_touching();

        let touching = if self.is_sensor() {
            self.manifold.point_count = 0;
            test_overlap(shape_a, xf_a, shape_b, xf_b)
        } else {
            self.manifold = evaluate(shape_a, xf_a, shape_b, xf_b);
            for point in self.manifold.points.iter_mut().take(self.manifold.point_count) {
                point.normal_impulse = 0.0;
                point.tangent_impulse = 0.0;
                if let Some(old) = old_manifold.points().iter().find(|old| old.id == point.id) {
                    point.normal_impulse = old.normal_impulse;
                    point.tangent_impulse = old.tangent_impulse;
                }
            }
            self.manifold.point_count > 0
        };

        self.flags.set(ContactFlags::TOUCHING, touching);
        ContactUpdate { was_touching, touching }
    }
}
