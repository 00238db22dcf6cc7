//! Scene construction utilities
//!
//! This module provides a declarative API for building physics scenes and
//! the preset scenes the headless runner can load.

mod scene_builder;

pub use scene_builder::SceneBuilder;

use rigid2d_math::Vec2;
use rigid2d_physics::{BodyKey, PhysicsConfig, PhysicsError, PhysicsMaterial, World};
use serde::{Deserialize, Serialize};

/// A populated world, plus the body worth watching
pub struct Scene {
    pub world: World,
    pub focus: Option<BodyKey>,
}

/// Built-in scenes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenePreset {
    /// Boxes stacked in a triangle on the ground
    Pyramid,
    /// Fast circles fired at a thin wall
    Bullet,
    /// A chain of boxes swinging from a pivot
    PendulumChain,
}

impl ScenePreset {
    /// Build this preset; `size` is the pyramid's base row, the bullet
    /// count or the number of chain links
    pub fn build(self, size: usize, config: PhysicsConfig) -> Result<Scene, PhysicsError> {
        let builder = SceneBuilder::new(config).add_ground(0.0, 40.0, PhysicsMaterial::CONCRETE)?;

        let builder = match self {
            ScenePreset::Pyramid => {
                let half = 0.5;
                let spacing = 1.125;
                let mut builder = builder;
                for row in 0..size {
                    let start = -(size.saturating_sub(1) as f32) * spacing * 0.5 + row as f32 * spacing * 0.5;
                    let y = half + row as f32 * 1.05;
                    for column in 0..size - row {
                        let x = start + column as f32 * spacing;
                        builder = builder.add_box(Vec2::new(x, y), half, PhysicsMaterial::WOOD)?;
                    }
                }
                builder
            }
            ScenePreset::Bullet => {
                let count = size.max(1);
                let wall_half_height = 0.2 * count as f32 + 0.5;
                let mut builder = builder.add_wall(
                    Vec2::new(0.0, wall_half_height),
                    0.1,
                    wall_half_height,
                    PhysicsMaterial::CONCRETE,
                )?;
                for i in 0..count {
                    let position = Vec2::new(-6.0, 0.3 + i as f32 * 0.4);
                    builder = builder.add_bullet(position, 0.1, Vec2::new(250.0, 0.0), PhysicsMaterial::METAL)?;
                }
                builder
            }
            ScenePreset::PendulumChain => {
                let links = size.max(1);
                builder.add_chain(Vec2::new(0.0, links as f32 + 2.0), links, 1.0, PhysicsMaterial::WOOD)?
            }
        };

        Ok(builder.build())
    }
}

impl std::fmt::Display for ScenePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScenePreset::Pyramid => "pyramid",
            ScenePreset::Bullet => "bullet",
            ScenePreset::PendulumChain => "pendulum_chain",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(world: &mut World, steps: usize) {
        for _ in 0..steps {
            world.step(1.0 / 60.0, 8, 3);
        }
    }

    #[test]
    fn test_pyramid_body_count() {
        let scene = ScenePreset::Pyramid.build(4, PhysicsConfig::default()).unwrap();
        // Ground plus 4 + 3 + 2 + 1 boxes
        assert_eq!(scene.world.body_count(), 11);
        assert!(scene.focus.is_none());
    }

    #[test]
    fn test_pyramid_stays_standing() {
        let mut scene = ScenePreset::Pyramid.build(3, PhysicsConfig::default()).unwrap();
        run(&mut scene.world, 120);

        let top = scene
            .world
            .bodies()
            .filter(|(_, body)| body.is_dynamic())
            .map(|(_, body)| body.position().y)
            .fold(f32::MIN, f32::max);
        // Three rows of unit boxes resting on the ground
        assert!((top - 2.5).abs() < 0.1, "top = {}", top);
    }

    #[test]
    fn test_bullets_stopped_by_wall() {
        let mut scene = ScenePreset::Bullet.build(3, PhysicsConfig::default()).unwrap();
        let bullets: Vec<BodyKey> = scene
            .world
            .bodies()
            .filter(|(_, body)| body.is_bullet())
            .map(|(key, _)| key)
            .collect();
        assert_eq!(bullets.len(), 3);
        assert_eq!(scene.focus, Some(bullets[0]));

        run(&mut scene.world, 30);
        for key in bullets {
            let x = scene.world.get_body(key).unwrap().position().x;
            assert!(x < 0.0, "bullet passed the wall at x = {}", x);
        }
    }

    #[test]
    fn test_chain_swings_down() {
        let mut scene = ScenePreset::PendulumChain.build(3, PhysicsConfig::default()).unwrap();
        let tip = scene.focus.unwrap();
        let start = scene.world.get_body(tip).unwrap().position();

        run(&mut scene.world, 60);
        let end = scene.world.get_body(tip).unwrap().position();
        assert!(end.y < start.y - 0.5);
        assert!(end.y > 0.0);
    }

    #[test]
    fn test_preset_names() {
        assert_eq!(ScenePreset::PendulumChain.to_string(), "pendulum_chain");
        assert_eq!(ScenePreset::Bullet.to_string(), "bullet");
    }
}
