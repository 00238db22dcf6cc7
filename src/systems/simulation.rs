//! Fixed-step simulation system
//!
//! Drives a physics world at a fixed time step:
//! - Fixed-step accumulation of variable frame time
//! - Event draining and tallying
//! - Periodic statistics reports

use log::{debug, info};
use rigid2d_physics::{World, WorldEvent};

use crate::config::SimulationConfig;

/// Longest frame time fed to the accumulator in one call
const MAX_FRAME_TIME: f32 = 0.25;

/// Running totals of drained world events
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventTotals {
    pub begin_contacts: usize,
    pub end_contacts: usize,
    pub joints_broken: usize,
}

/// Result of a simulation update
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimulationResult {
    /// Fixed steps taken during this update
    pub steps: usize,
    /// Events drained during this update
    pub events: EventTotals,
}

/// Steps a world at a fixed rate and reports on it
pub struct SimulationSystem {
    dt: f32,
    velocity_iterations: usize,
    position_iterations: usize,
    report_interval: usize,
    log_events: bool,
    accumulator: f32,
    step_count: usize,
    totals: EventTotals,
}

impl SimulationSystem {
    /// Create a simulation system from the simulation settings
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            dt: config.dt,
            velocity_iterations: config.velocity_iterations,
            position_iterations: config.position_iterations,
            report_interval: config.report_interval,
            log_events: false,
            accumulator: 0.0,
            step_count: 0,
            totals: EventTotals::default(),
        }
    }

    /// Log every drained event at debug level
    pub fn with_event_logging(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    /// Take exactly one fixed step
    pub fn step(&mut self, world: &mut World) -> SimulationResult {
        world.step(self.dt, self.velocity_iterations, self.position_iterations);
        self.step_count += 1;

        let events = self.drain(world);

        if self.report_interval > 0 && self.step_count % self.report_interval == 0 {
            self.report(world);
        }

        SimulationResult { steps: 1, events }
    }

    /// Run as many fixed steps as `elapsed` seconds of frame time cover
    ///
    /// Leftover time carries over to the next call. Frame time is capped so a
    /// long stall does not trigger a burst of catch-up steps.
    pub fn advance(&mut self, world: &mut World, elapsed: f32) -> SimulationResult {
        self.accumulator += elapsed.clamp(0.0, MAX_FRAME_TIME);

        let mut result = SimulationResult::default();
        if self.dt <= 0.0 {
            return result;
        }

        while self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            let step = self.step(world);
            result.steps += step.steps;
            result.events.begin_contacts += step.events.begin_contacts;
            result.events.end_contacts += step.events.end_contacts;
            result.events.joints_broken += step.events.joints_broken;
        }
        result
    }

    /// Fixed steps taken so far
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Events seen since creation
    pub fn totals(&self) -> EventTotals {
        self.totals
    }

    /// Simulated time so far in seconds
    pub fn elapsed(&self) -> f32 {
        self.step_count as f32 * self.dt
    }

    fn drain(&mut self, world: &mut World) -> EventTotals {
        let mut events = EventTotals::default();
        for event in world.drain_events() {
            match event {
                WorldEvent::BeginContact { .. } => events.begin_contacts += 1,
                WorldEvent::EndContact { .. } => events.end_contacts += 1,
                WorldEvent::JointBroke { .. } => events.joints_broken += 1,
                WorldEvent::JointRemoved { .. } | WorldEvent::FixtureRemoved { .. } => {}
            }
            if self.log_events {
                debug!("step {}: {:?}", self.step_count, event);
            }
        }

        self.totals.begin_contacts += events.begin_contacts;
        self.totals.end_contacts += events.end_contacts;
        self.totals.joints_broken += events.joints_broken;
        events
    }

    fn report(&self, world: &World) {
        let stats = world.last_step_stats();
        info!(
            "t = {:.2}s (step {}): {} bodies ({} awake), {} contacts, {} joints, {} islands, {} TOI events",
            self.elapsed(),
            self.step_count,
            world.body_count(),
            world.awake_body_count(),
            world.contact_count(),
            world.joint_count(),
            stats.islands,
            stats.toi_events,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigid2d_math::Vec2;
    use rigid2d_physics::{BodyDef, FixtureDef, Shape};

    const EPSILON: f32 = 0.0001;

    fn config(dt: f32) -> SimulationConfig {
        SimulationConfig {
            dt,
            report_interval: 0,
            ..SimulationConfig::default()
        }
    }

    fn drop_ball(world: &mut World) {
        let ground = world.create_body(&BodyDef::fixed(Vec2::new(0.0, -0.5))).unwrap();
        world.create_fixture(ground, &FixtureDef::new(Shape::rect(10.0, 0.5))).unwrap();
        let ball = world.create_body(&BodyDef::dynamic(Vec2::new(0.0, 2.0))).unwrap();
        world.create_fixture(ball, &FixtureDef::new(Shape::circle(0.5))).unwrap();
    }

    #[test]
    fn test_step_counts_and_time() {
        let mut world = World::new();
        let mut sim = SimulationSystem::new(&config(0.02));
        for _ in 0..10 {
            assert_eq!(sim.step(&mut world).steps, 1);
        }
        assert_eq!(sim.step_count(), 10);
        assert!((sim.elapsed() - 0.2).abs() < EPSILON);
    }

    #[test]
    fn test_advance_carries_remainder() {
        let mut world = World::new();
        let mut sim = SimulationSystem::new(&config(0.02));

        assert_eq!(sim.advance(&mut world, 0.11).steps, 5);
        // 0.01 left over plus 0.015 covers one more step
        assert_eq!(sim.advance(&mut world, 0.015).steps, 1);
        assert_eq!(sim.step_count(), 6);
    }

    #[test]
    fn test_advance_caps_frame_time() {
        let mut world = World::new();
        let mut sim = SimulationSystem::new(&config(0.02));
        assert_eq!(sim.advance(&mut world, 1.0).steps, 12);
        assert_eq!(sim.advance(&mut world, -1.0).steps, 0);
    }

    #[test]
    fn test_events_are_tallied() {
        let mut world = World::new();
        drop_ball(&mut world);
        let mut sim = SimulationSystem::new(&config(1.0 / 60.0)).with_event_logging(true);

        let mut begins = 0;
        for _ in 0..60 {
            begins += sim.step(&mut world).events.begin_contacts;
        }

        assert_eq!(begins, 1);
        assert_eq!(sim.totals().begin_contacts, 1);
        assert_eq!(sim.totals().end_contacts, 0);
        assert_eq!(world.drain_events().count(), 0);
    }
}
