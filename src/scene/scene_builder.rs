//! SceneBuilder - Declarative scene construction
//!
//! Provides a fluent API for populating a physics world.

use rigid2d_math::Vec2;
use rigid2d_physics::{
    BodyDef, BodyKey, FixtureDef, JointDef, PhysicsConfig, PhysicsError, PhysicsMaterial, Shape, World,
};

use super::Scene;

/// Thickness of the ground slab below its top surface
const GROUND_HALF_THICKNESS: f32 = 0.5;

/// Builder for constructing physics scenes
///
/// # Example
/// ```ignore
/// let scene = SceneBuilder::new(PhysicsConfig::default())
///     .add_ground(0.0, 20.0, PhysicsMaterial::CONCRETE)?
///     .add_box(Vec2::new(0.0, 0.5), 0.5, PhysicsMaterial::WOOD)?
///     .build();
/// ```
pub struct SceneBuilder {
    world: World,
    focus: Option<BodyKey>,
}

impl SceneBuilder {
    /// Create a new scene builder with the given world options
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            world: World::with_config(config),
            focus: None,
        }
    }

    /// Add a static ground slab whose top surface sits at `y`
    pub fn add_ground(self, y: f32, half_width: f32, material: PhysicsMaterial) -> Result<Self, PhysicsError> {
        let center = Vec2::new(0.0, y - GROUND_HALF_THICKNESS);
        self.add_wall(center, half_width, GROUND_HALF_THICKNESS, material)
    }

    /// Add a static box centered at `center`
    pub fn add_wall(
        mut self,
        center: Vec2,
        half_width: f32,
        half_height: f32,
        material: PhysicsMaterial,
    ) -> Result<Self, PhysicsError> {
        let body = self.world.create_body(&BodyDef::fixed(center))?;
        let fixture = FixtureDef::new(Shape::rect(half_width, half_height)).with_material(material);
        self.world.create_fixture(body, &fixture)?;
        Ok(self)
    }

    /// Add a dynamic square box
    pub fn add_box(mut self, position: Vec2, half_extent: f32, material: PhysicsMaterial) -> Result<Self, PhysicsError> {
        let body = self.world.create_body(&BodyDef::dynamic(position))?;
        let fixture = FixtureDef::new(Shape::rect(half_extent, half_extent)).with_material(material);
        self.world.create_fixture(body, &fixture)?;
        Ok(self)
    }

    /// Add a fast circle with continuous collision against everything
    ///
    /// The first bullet added becomes the scene's focus body.
    pub fn add_bullet(
        mut self,
        position: Vec2,
        radius: f32,
        velocity: Vec2,
        material: PhysicsMaterial,
    ) -> Result<Self, PhysicsError> {
        let def = BodyDef::dynamic(position)
            .with_linear_velocity(velocity)
            .with_bullet(true);
        let body = self.world.create_body(&def)?;
        self.world
            .create_fixture(body, &FixtureDef::new(Shape::circle(radius)).with_material(material))?;
        self.focus.get_or_insert(body);
        Ok(self)
    }

    /// Add a hanging chain of `links` boxes pinned to a fixed pivot
    ///
    /// Links extend horizontally to the right of `pivot`, each `link_length`
    /// long, and are joined end to end by revolute joints. The last link
    /// becomes the scene's focus body.
    pub fn add_chain(
        mut self,
        pivot: Vec2,
        links: usize,
        link_length: f32,
        material: PhysicsMaterial,
    ) -> Result<Self, PhysicsError> {
        let anchor = self.world.create_body(&BodyDef::fixed(pivot))?;
        let half_length = link_length * 0.5;
        let link_shape = Shape::rect(half_length, link_length * 0.125);

        let mut previous = anchor;
        for i in 0..links {
            let center = pivot + Vec2::new(half_length + i as f32 * link_length, 0.0);
            let link = self.world.create_body(&BodyDef::dynamic(center))?;
            self.world
                .create_fixture(link, &FixtureDef::new(link_shape.clone()).with_material(material))?;

            let joint_anchor = center - Vec2::new(half_length, 0.0);
            self.world
                .create_joint(&JointDef::revolute(previous, link, joint_anchor))?;
            previous = link;
        }

        if previous != anchor {
            self.focus = Some(previous);
        }
        Ok(self)
    }

    /// Body the runner reports on, if one was marked
    pub fn focus(&self) -> Option<BodyKey> {
        self.focus
    }

    /// Build the scene
    pub fn build(self) -> Scene {
        Scene {
            world: self.world,
            focus: self.focus,
        }
    }
}

impl Default for SceneBuilder {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.0001;

    #[test]
    fn test_empty_scene() {
        let scene = SceneBuilder::default().build();
        assert_eq!(scene.world.body_count(), 0);
        assert!(scene.focus.is_none());
    }

    #[test]
    fn test_scene_with_ground() {
        let scene = SceneBuilder::default()
            .add_ground(0.0, 10.0, PhysicsMaterial::CONCRETE)
            .unwrap()
            .build();

        assert_eq!(scene.world.body_count(), 1);
        assert_eq!(scene.world.fixture_count(), 1);

        let (_, ground) = scene.world.bodies().next().unwrap();
        assert!(ground.is_static());
        assert!((ground.position().y + GROUND_HALF_THICKNESS).abs() < EPSILON);
    }

    #[test]
    fn test_box_gets_mass_from_material() {
        let scene = SceneBuilder::default()
            .add_box(Vec2::new(0.0, 1.0), 0.5, PhysicsMaterial::WOOD)
            .unwrap()
            .build();

        let (_, body) = scene.world.bodies().next().unwrap();
        assert!(body.is_dynamic());
        assert!((body.mass() - PhysicsMaterial::WOOD.density).abs() < EPSILON);
    }

    #[test]
    fn test_first_bullet_is_focus() {
        let builder = SceneBuilder::default()
            .add_bullet(Vec2::new(-5.0, 1.0), 0.1, Vec2::new(100.0, 0.0), PhysicsMaterial::METAL)
            .unwrap();
        let first = builder.focus().unwrap();
        let scene = builder
            .add_bullet(Vec2::new(-5.0, 2.0), 0.1, Vec2::new(100.0, 0.0), PhysicsMaterial::METAL)
            .unwrap()
            .build();

        assert_eq!(scene.focus, Some(first));
        let bullet = scene.world.get_body(first).unwrap();
        assert!(bullet.is_bullet());
        assert_eq!(bullet.linear_velocity(), Vec2::new(100.0, 0.0));
    }

    #[test]
    fn test_chain_links_and_joints() {
        let scene = SceneBuilder::default()
            .add_chain(Vec2::new(0.0, 10.0), 4, 1.0, PhysicsMaterial::WOOD)
            .unwrap()
            .build();

        // Pivot plus four links, one joint per link
        assert_eq!(scene.world.body_count(), 5);
        assert_eq!(scene.world.joint_count(), 4);

        let last = scene.world.get_body(scene.focus.unwrap()).unwrap();
        assert!((last.position().x - 3.5).abs() < EPSILON);
        assert_eq!(last.joint_edges().len(), 1);
    }

    #[test]
    fn test_empty_chain_has_no_focus() {
        let scene = SceneBuilder::default()
            .add_chain(Vec2::ZERO, 0, 1.0, PhysicsMaterial::WOOD)
            .unwrap()
            .build();
        assert_eq!(scene.world.body_count(), 1);
        assert!(scene.focus.is_none());
    }
}
