//! Integration tests for whole-world simulation
//!
//! Scenes are built through the public API and stepped at 60 Hz.

use rigid2d_math::Vec2;
use rigid2d_physics::settings::LINEAR_SLOP;
use rigid2d_physics::{Aabb, BodyDef, BodyKey, FixtureDef, JointDef, PhysicsConfig, Shape, World, WorldEvent};

const DT: f32 = 1.0 / 60.0;
const VELOCITY_ITERATIONS: usize = 8;
const POSITION_ITERATIONS: usize = 3;

fn step(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step(DT, VELOCITY_ITERATIONS, POSITION_ITERATIONS);
    }
}

/// Static box 20 wide whose top face is at y = 0.5
fn add_ground(world: &mut World) -> BodyKey {
    let ground = world.create_body(&BodyDef::fixed(Vec2::ZERO)).unwrap();
    world
        .create_fixture(ground, &FixtureDef::new(Shape::rect(10.0, 0.5)).with_friction(0.6))
        .unwrap();
    ground
}

fn add_ball(world: &mut World, def: BodyDef, radius: f32) -> BodyKey {
    let key = world.create_body(&def).unwrap();
    world
        .create_fixture(key, &FixtureDef::new(Shape::circle(radius)).with_density(1.0))
        .unwrap();
    key
}

fn add_box(world: &mut World, position: Vec2, half: f32) -> BodyKey {
    let key = world.create_body(&BodyDef::dynamic(position)).unwrap();
    world
        .create_fixture(
            key,
            &FixtureDef::new(Shape::rect(half, half))
                .with_density(1.0)
                .with_friction(0.6),
        )
        .unwrap();
    key
}

#[test]
fn test_bodies_at_rest_stay_put() {
    let mut world = World::with_config(PhysicsConfig::new(Vec2::ZERO));
    let positions = [Vec2::new(-3.0, 0.0), Vec2::new(0.0, 2.0), Vec2::new(4.0, -1.0)];
    let keys: Vec<BodyKey> = positions
        .iter()
        .map(|&p| add_ball(&mut world, BodyDef::dynamic(p), 0.5))
        .collect();
    let boxed = add_box(&mut world, Vec2::new(0.0, -4.0), 0.5);

    step(&mut world, 120);

    for (key, expected) in keys.iter().zip(positions) {
        let position = world.get_body(*key).unwrap().position();
        assert!((position - expected).length() < 1e-5);
    }
    let position = world.get_body(boxed).unwrap().position();
    assert!((position - Vec2::new(0.0, -4.0)).length() < 1e-5);
    assert_eq!(world.contact_count(), 0);
}

#[test]
fn test_falling_circle_settles_on_ground() {
    let mut world = World::new();
    add_ground(&mut world);
    let ball = add_ball(&mut world, BodyDef::dynamic(Vec2::new(0.0, 3.0)), 0.5);

    step(&mut world, 300);

    let body = world.get_body(ball).unwrap();
    // Ground top plus radius, within solver tolerance
    assert!((body.position().y - 1.0).abs() < 0.03, "y = {}", body.position().y);
    assert!(body.position().x.abs() < 0.01);
    assert!(body.linear_velocity().length() < 0.05);
}

#[test]
fn test_resting_body_falls_asleep_and_wakes() {
    let mut world = World::new();
    add_ground(&mut world);
    let ball = add_ball(&mut world, BodyDef::dynamic(Vec2::new(0.0, 1.2)), 0.5);

    step(&mut world, 240);
    assert!(!world.get_body(ball).unwrap().is_awake());
    assert_eq!(world.awake_body_count(), 0);

    world
        .get_body_mut(ball)
        .unwrap()
        .apply_linear_impulse(Vec2::new(0.0, 5.0), Vec2::new(0.0, 1.0));
    assert!(world.get_body(ball).unwrap().is_awake());
    step(&mut world, 1);
    assert!(world.get_body(ball).unwrap().position().y > 1.0);
}

#[test]
fn test_sleep_disabled_keeps_bodies_awake() {
    let mut world = World::with_config(PhysicsConfig {
        allow_sleep: false,
        ..Default::default()
    });
    add_ground(&mut world);
    let ball = add_ball(&mut world, BodyDef::dynamic(Vec2::new(0.0, 1.2)), 0.5);

    step(&mut world, 240);
    assert!(world.get_body(ball).unwrap().is_awake());
}

/// Small fast circle aimed at a 0.1 thick wall: crosses it in one step
fn bullet_scene(continuous: bool) -> (World, BodyKey) {
    let mut world = World::with_config(PhysicsConfig {
        gravity: Vec2::ZERO,
        continuous_physics: continuous,
        ..Default::default()
    });
    let wall = world.create_body(&BodyDef::fixed(Vec2::ZERO)).unwrap();
    world
        .create_fixture(wall, &FixtureDef::new(Shape::rect(0.05, 2.0)))
        .unwrap();
    let bullet = add_ball(
        &mut world,
        BodyDef::dynamic(Vec2::new(-1.0, 0.0))
            .with_linear_velocity(Vec2::new(100.0, 0.0))
            .with_bullet(true),
        0.1,
    );
    (world, bullet)
}

#[test]
fn test_bullet_stopped_with_continuous_physics() {
    let (mut world, bullet) = bullet_scene(true);
    step(&mut world, 1);

    let body = world.get_body(bullet).unwrap();
    assert!(body.position().x < -0.05, "x = {}", body.position().x);
    assert!(body.linear_velocity().x < 1.0);
    assert!(world.last_step_stats().toi_events >= 1);

    let began = world
        .drain_events()
        .filter(|e| matches!(e, WorldEvent::BeginContact { .. }))
        .count();
    assert_eq!(began, 1);
}

#[test]
fn test_bullet_tunnels_without_continuous_physics() {
    let (mut world, bullet) = bullet_scene(false);
    step(&mut world, 1);

    let body = world.get_body(bullet).unwrap();
    assert!(body.position().x > 0.05, "x = {}", body.position().x);
    assert_eq!(world.last_step_stats().toi_events, 0);
}

#[test]
fn test_box_stack_stays_upright() {
    let mut world = World::new();
    add_ground(&mut world);
    let boxes: Vec<BodyKey> = (0..3)
        .map(|i| add_box(&mut world, Vec2::new(0.0, 1.0 + 1.0 * i as f32), 0.5))
        .collect();

    step(&mut world, 240);

    for (i, key) in boxes.iter().enumerate() {
        let body = world.get_body(*key).unwrap();
        let expected_y = 1.0 + i as f32;
        assert!(body.position().x.abs() < 0.1, "box {} x = {}", i, body.position().x);
        assert!((body.position().y - expected_y).abs() < 0.1, "box {} y = {}", i, body.position().y);
        assert!(body.angle().abs() < 0.1);
    }
}

#[test]
fn test_destroying_body_mid_simulation() {
    let mut world = World::new();
    add_ground(&mut world);
    let bottom = add_box(&mut world, Vec2::new(0.0, 1.0), 0.5);
    let middle = add_box(&mut world, Vec2::new(0.0, 2.0), 0.5);
    let top = add_box(&mut world, Vec2::new(0.0, 3.0), 0.5);
    step(&mut world, 30);
    world.drain_events().count();

    world.destroy_body(middle).unwrap();
    assert_eq!(world.body_count(), 3);
    assert_eq!(world.fixture_count(), 3);
    assert_eq!(world.proxy_count(), 3);
    for (_, contact) in world.contacts() {
        assert_ne!(contact.body_a(), middle);
        assert_ne!(contact.body_b(), middle);
    }
    let ended = world
        .drain_events()
        .filter(|e| matches!(e, WorldEvent::EndContact { .. }))
        .count();
    assert_eq!(ended, 2);

    // The top box drops onto the bottom one
    step(&mut world, 120);
    let top_y = world.get_body(top).unwrap().position().y;
    assert!((top_y - 2.0).abs() < 0.1, "top y = {}", top_y);
    assert!(world.get_body(bottom).is_some());
}

#[test]
fn test_joint_breaks_exactly_once() {
    let mut world = World::new();
    let anchor = world.create_body(&BodyDef::fixed(Vec2::new(0.0, 10.0))).unwrap();
    let bob = add_ball(&mut world, BodyDef::dynamic(Vec2::new(0.0, 8.0)), 0.25);
    let joint = world
        .create_joint(&JointDef::distance(anchor, bob, Vec2::new(0.0, 10.0), Vec2::new(0.0, 8.0)).with_breakpoint(0.5))
        .unwrap();

    step(&mut world, 10);
    assert!(world.get_joint(joint).unwrap().is_enabled());
    assert_eq!(world.drain_events().count(), 0);

    // Yank the bob well past the breakpoint
    world.set_transform(bob, Vec2::new(0.0, 6.0), 0.0).unwrap();
    step(&mut world, 30);

    let broke: Vec<WorldEvent> = world
        .drain_events()
        .filter(|e| matches!(e, WorldEvent::JointBroke { .. }))
        .collect();
    assert_eq!(broke, vec![WorldEvent::JointBroke { joint }]);
    assert!(!world.get_joint(joint).unwrap().is_enabled());
    assert_eq!(world.joint_count(), 1);
    // Free fall from here on
    assert!(world.get_body(bob).unwrap().position().y < 6.0);
}

#[test]
fn test_pendulum_keeps_rope_length() {
    let mut world = World::new();
    let pivot = world.create_body(&BodyDef::fixed(Vec2::new(0.0, 10.0))).unwrap();
    let bob = add_ball(&mut world, BodyDef::dynamic(Vec2::new(2.0, 10.0)), 0.25);
    world
        .create_joint(&JointDef::distance(pivot, bob, Vec2::new(0.0, 10.0), Vec2::new(2.0, 10.0)))
        .unwrap();

    for _ in 0..120 {
        step(&mut world, 1);
        let length = (world.get_body(bob).unwrap().position() - Vec2::new(0.0, 10.0)).length();
        assert!((length - 2.0).abs() < 0.05, "length = {}", length);
    }
    // Swung down past the start height
    assert!(world.get_body(bob).unwrap().position().y < 10.0);
}

#[test]
fn test_revolute_chain_hangs_from_pivot() {
    let mut world = World::new();
    let pivot = world.create_body(&BodyDef::fixed(Vec2::new(0.0, 10.0))).unwrap();
    let mut previous = pivot;
    let mut links = Vec::new();
    for i in 0..4 {
        let x = 0.5 + i as f32;
        let link = world.create_body(&BodyDef::dynamic(Vec2::new(x, 10.0))).unwrap();
        world
            .create_fixture(link, &FixtureDef::new(Shape::rect(0.5, 0.1)).with_density(1.0))
            .unwrap();
        world
            .create_joint(&JointDef::revolute(previous, link, Vec2::new(x - 0.5, 10.0)))
            .unwrap();
        links.push(link);
        previous = link;
    }

    step(&mut world, 180);

    // Neighbouring links stay joined and no link drifts beyond the chain length
    let first = world.get_body(links[0]).unwrap();
    let joint_point = first.world_point(Vec2::new(-0.5, 0.0));
    assert!((joint_point - Vec2::new(0.0, 10.0)).length() < 0.1);
    for link in &links {
        let p = world.get_body(*link).unwrap().position();
        assert!((p - Vec2::new(0.0, 10.0)).length() < 4.0 + 0.1);
    }
}

#[test]
fn test_contact_events_begin_and_end() {
    let mut world = World::new();
    add_ground(&mut world);
    let ball = add_ball(&mut world, BodyDef::dynamic(Vec2::new(0.0, 2.0)), 0.5);

    step(&mut world, 120);
    let began = world
        .drain_events()
        .filter(|e| matches!(e, WorldEvent::BeginContact { .. }))
        .count();
    assert_eq!(began, 1);

    world.set_transform(ball, Vec2::new(0.0, 20.0), 0.0).unwrap();
    step(&mut world, 1);
    let events: Vec<WorldEvent> = world.drain_events().collect();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], WorldEvent::EndContact { .. }));
    assert_eq!(world.contact_count(), 0);
}

#[test]
fn test_queries_find_fixtures() {
    let mut world = World::with_config(PhysicsConfig::new(Vec2::ZERO));
    let keys: Vec<BodyKey> = (0..5)
        .map(|i| add_box(&mut world, Vec2::new(3.0 * i as f32, 0.0), 0.5))
        .collect();

    let mut found = Vec::new();
    world.query_aabb(&Aabb::new(Vec2::new(2.0, -1.0), Vec2::new(7.0, 1.0)), |fixture| {
        found.push(world.get_fixture(fixture).unwrap().body());
        true
    });
    found.sort();
    let mut expected = vec![keys[1], keys[2]];
    expected.sort();
    assert_eq!(found, expected);

    // A ray returning 1 sees every fixture along its path
    let mut hits = Vec::new();
    world.ray_cast(Vec2::new(-2.0, 0.0), Vec2::new(20.0, 0.0), |_, point, normal, _| {
        hits.push((point, normal));
        1.0
    });
    assert_eq!(hits.len(), 5);
    for (point, normal) in hits {
        assert!((normal.x + 1.0).abs() < 0.0001);
        assert!(point.y.abs() < 0.0001);
    }

    // Early out on the first reported fixture
    let mut calls = 0;
    world.ray_cast(Vec2::new(-2.0, 0.0), Vec2::new(20.0, 0.0), |_, _, _, _| {
        calls += 1;
        0.0
    });
    assert_eq!(calls, 1);
}

#[test]
fn test_kinematic_body_ignores_gravity() {
    let mut world = World::new();
    let platform = world
        .create_body(&BodyDef::kinematic(Vec2::ZERO).with_linear_velocity(Vec2::new(1.0, 0.0)))
        .unwrap();
    world
        .create_fixture(platform, &FixtureDef::new(Shape::rect(1.0, 0.1)))
        .unwrap();

    step(&mut world, 60);

    let body = world.get_body(platform).unwrap();
    assert!((body.position().x - 1.0).abs() < 0.001);
    assert!(body.position().y.abs() < 0.0001);
    assert_eq!(body.linear_velocity(), Vec2::new(1.0, 0.0));
}

#[test]
fn test_overlapping_bodies_are_pushed_apart() {
    let mut world = World::with_config(PhysicsConfig::new(Vec2::ZERO));
    let a = add_ball(&mut world, BodyDef::dynamic(Vec2::ZERO), 0.5);
    let b = add_ball(&mut world, BodyDef::dynamic(Vec2::new(0.6, 0.0)), 0.5);

    step(&mut world, 60);

    let distance = (world.get_body(b).unwrap().position() - world.get_body(a).unwrap().position()).length();
    assert!(distance > 1.0 - 3.0 * LINEAR_SLOP, "distance = {}", distance);
}

#[test]
fn test_sleeping_stack_wakes_when_support_removed() {
    let mut world = World::new();
    add_ground(&mut world);
    let bottom = add_box(&mut world, Vec2::new(0.0, 1.0), 0.5);
    let top = add_box(&mut world, Vec2::new(0.0, 2.0), 0.5);

    step(&mut world, 300);
    assert!(!world.get_body(bottom).unwrap().is_awake());
    assert!(!world.get_body(top).unwrap().is_awake());
    assert_eq!(world.awake_body_count(), 0);

    world.destroy_body(bottom).unwrap();
    assert!(world.get_body(top).unwrap().is_awake());

    step(&mut world, 60);
    let body = world.get_body(top).unwrap();
    assert!((body.position().y - 1.0).abs() < 0.05, "y = {}", body.position().y);
}

#[test]
fn test_spinning_box_stopped_by_thin_slab() {
    let mut world = World::new();
    let slab = world.create_body(&BodyDef::fixed(Vec2::new(0.0, -0.2))).unwrap();
    world
        .create_fixture(slab, &FixtureDef::new(Shape::rect(5.0, 0.1)))
        .unwrap();

    // Reaches the slab on the eleventh step, moving far more than the slab
    // thickness per step while the far end swings down
    let plank = world
        .create_body(
            &BodyDef::dynamic(Vec2::new(0.0, 20.0))
                .with_linear_velocity(Vec2::new(0.0, -100.0))
                .with_angular_velocity(-30.669577)
                .with_bullet(true),
        )
        .unwrap();
    world
        .create_fixture(plank, &FixtureDef::new(Shape::rect(1.0, 0.05)).with_density(1.0))
        .unwrap();

    for i in 0..90 {
        step(&mut world, 1);
        let y = world.get_body(plank).unwrap().position().y;
        assert!(y > -0.2, "step {} y = {}", i, y);
    }
    let body = world.get_body(plank).unwrap();
    assert!(body.position().y > -0.1, "y = {}", body.position().y);
}

#[test]
fn test_spinning_body_angle_stays_wrapped() {
    let mut world = World::with_config(PhysicsConfig::new(Vec2::ZERO));
    let wall = world.create_body(&BodyDef::fixed(Vec2::new(1.05, 0.0))).unwrap();
    world
        .create_fixture(wall, &FixtureDef::new(Shape::rect(0.5, 0.5)))
        .unwrap();
    let ball = add_ball(
        &mut world,
        BodyDef::dynamic(Vec2::ZERO).with_angular_velocity(50.0).with_bullet(true),
        0.5,
    );

    // Ten seconds at 50 rad/s is about 80 turns
    step(&mut world, 600);
    assert_eq!(world.contact_count(), 1);

    let body = world.get_body(ball).unwrap();
    assert!(body.angle() >= 0.0 && body.angle() < 2.0 * std::f32::consts::PI + 1.0, "angle = {}", body.angle());
    assert!((body.angular_velocity() - 50.0).abs() < 0.1);
    assert!(body.position().length() < 0.01);
}
