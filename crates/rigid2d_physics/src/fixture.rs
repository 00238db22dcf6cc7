//! Fixtures attach shapes to bodies
//!
//! A fixture carries the shape, its material and collision filter, and the
//! broad-phase proxy that tracks it.

use rigid2d_math::{Transform, Vec2};
use slotmap::new_key_type;

use crate::body::BodyKey;
use crate::broad_phase::BroadPhase;
use crate::collision::CollisionFilter;
use crate::dynamic_tree::ProxyId;
use crate::material::PhysicsMaterial;
use crate::shapes::{Aabb, MassData, RayCastInput, RayCastOutput, Shape};

new_key_type! {
    /// Key to a fixture in the physics world
    pub struct FixtureKey;
}

/// Construction parameters for a fixture
#[derive(Clone, Debug, PartialEq)]
pub struct FixtureDef {
    pub shape: Shape,
    pub material: PhysicsMaterial,
    pub filter: CollisionFilter,
    /// Sensors report overlaps but produce no collision response
    pub is_sensor: bool,
}

impl FixtureDef {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            material: PhysicsMaterial::default(),
            filter: CollisionFilter::default(),
            is_sensor: false,
        }
    }

    pub fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.material.density = density.max(0.0);
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.material.friction = friction.max(0.0);
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.material.restitution = restitution.clamp(0.0, 1.0);
        self
    }

    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }
}

/// A shape attached to a body
#[derive(Clone, Debug)]
pub struct Fixture {
    pub(crate) body: BodyKey,
    pub(crate) shape: Shape,
    pub(crate) material: PhysicsMaterial,
    pub(crate) filter: CollisionFilter,
    pub(crate) is_sensor: bool,
    pub(crate) proxy: Option<ProxyId>,
    /// Swept world AABB from the last synchronization
    pub(crate) aabb: Aabb,
}

impl Fixture {
    pub(crate) fn new(body: BodyKey, def: &FixtureDef) -> Self {
        Self {
            body,
            shape: def.shape.clone(),
            material: def.material,
            filter: def.filter,
            is_sensor: def.is_sensor,
            proxy: None,
            aabb: Aabb::default(),
        }
    }

    /// The body this fixture is attached to
    pub fn body(&self) -> BodyKey {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn material(&self) -> &PhysicsMaterial {
        &self.material
    }

    pub fn friction(&self) -> f32 {
        self.material.friction
    }

    pub fn restitution(&self) -> f32 {
        self.material.restitution
    }

    pub fn density(&self) -> f32 {
        self.material.density
    }

    pub fn filter(&self) -> &CollisionFilter {
        &self.filter
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    /// World AABB covering the fixture's motion over the last step
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Broad-phase proxy, absent while the body is inactive
    pub fn proxy_id(&self) -> Option<ProxyId> {
        self.proxy
    }

    /// Mass properties of the shape relative to the body origin
    pub fn mass_data(&self) -> MassData {
        self.shape.compute_mass(self.material.density)
    }

    /// Whether a world point lies inside the fixture
    pub fn test_point(&self, xf: &Transform, point: Vec2) -> bool {
        self.shape.test_point(xf, point)
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        self.shape.ray_cast(input, xf)
    }

    pub(crate) fn create_proxy(&mut self, broad_phase: &mut BroadPhase<FixtureKey>, xf: &Transform, key: FixtureKey) {
        debug_assert!(self.proxy.is_none());
        self.aabb = self.shape.compute_aabb(xf);
        self.proxy = Some(broad_phase.create_proxy(&self.aabb, key));
    }

    pub(crate) fn destroy_proxy(&mut self, broad_phase: &mut BroadPhase<FixtureKey>) {
        if let Some(proxy) = self.proxy.take() {
            broad_phase.destroy_proxy(proxy);
        }
    }

    /// Refresh the proxy with the AABB swept from `xf1` to `xf2`
    pub(crate) fn synchronize(&mut self, broad_phase: &mut BroadPhase<FixtureKey>, xf1: &Transform, xf2: &Transform) {
        let Some(proxy) = self.proxy else {
            return;
        };
        let aabb1 = self.shape.compute_aabb(xf1);
        let aabb2 = self.shape.compute_aabb(xf2);
        self.aabb = aabb1.union(&aabb2);
        broad_phase.move_proxy(proxy, &self.aabb, xf2.p - xf1.p);
    }
}
