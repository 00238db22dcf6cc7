//! Physics world and simulation
//!
//! The world owns every body, fixture, joint and contact. A step runs the
//! narrow phase, solves islands of awake bodies, then sweeps fast pairs
//! through the time-of-impact pass.

use std::collections::VecDeque;

use bitflags::bitflags;
use log::{debug, trace, warn};
use rigid2d_math::Vec2;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::body::{Body, BodyDef, BodyFlags, BodyKey, JointEdge};
use crate::broad_phase::BroadPhase;
use crate::collision::CollisionFilter;
use crate::contact::{Contact, ContactFlags, ContactKey};
use crate::contact_manager::ContactManager;
use crate::error::PhysicsError;
use crate::events::WorldEvent;
use crate::fixture::{Fixture, FixtureDef, FixtureKey};
use crate::island::{Island, SolverWorkspace, TimeStep};
use crate::joints::{Joint, JointDef, JointKey};
use crate::settings::{
    DEFAULT_MAX_TOI_EVENTS, EPSILON, MAX_SUB_STEPS, MAX_TOI_CONTACTS_PER_ISLAND, MAX_TOI_JOINTS_PER_ISLAND,
};
use crate::shapes::{Aabb, RayCastInput};
use crate::toi::{time_of_impact, ToiInput, ToiState};

/// Configuration for the physics simulation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity acceleration in m/s²
    pub gravity: Vec2,
    /// Let resting islands go to sleep
    pub allow_sleep: bool,
    /// Seed each step's impulses with those of the previous step
    pub warm_starting: bool,
    /// Run the time-of-impact pass after the discrete solve
    pub continuous_physics: bool,
    /// Zero accumulated forces and torques after every step
    pub auto_clear_forces: bool,
    /// Time-of-impact sub-steps allowed per step
    pub max_toi_events: usize,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -10.0),
            allow_sleep: true,
            warm_starting: true,
            continuous_physics: true,
            auto_clear_forces: true,
            max_toi_events: DEFAULT_MAX_TOI_EVENTS,
        }
    }
}

impl PhysicsConfig {
    /// Create a new physics config with the given gravity
    pub fn new(gravity: Vec2) -> Self {
        Self {
            gravity,
            ..Default::default()
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    struct WorldFlags: u8 {
        /// Fixtures were added since the last pair search
        const NEW_FIXTURE = 1 << 0;
        /// A step is in progress
        const LOCKED = 1 << 1;
    }
}

/// Counters from the most recent step
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Islands solved by the discrete pass
    pub islands: usize,
    /// Sub-steps taken by the time-of-impact pass
    pub toi_events: usize,
}

/// The physics world containing all bodies, fixtures, joints and contacts
pub struct World {
    /// All bodies in the world (using generational keys)
    bodies: SlotMap<BodyKey, Body>,
    fixtures: SlotMap<FixtureKey, Fixture>,
    joints: SlotMap<JointKey, Joint>,
    /// Broad-phase and live contacts
    contact_manager: ContactManager,
    /// Scratch buffers reused by every step
    workspace: SolverWorkspace,
    /// Notifications waiting for `drain_events`
    events: Vec<WorldEvent>,
    flags: WorldFlags,
    /// Inverse of the previous non-zero step, for warm-start scaling
    inv_dt0: f32,
    stats: StepStats,
    /// Physics configuration
    config: PhysicsConfig,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Move a body's proxies along the sweep of the last step
fn synchronize_fixtures(body: &Body, fixtures: &mut SlotMap<FixtureKey, Fixture>, broad_phase: &mut BroadPhase<FixtureKey>) {
    let xf1 = body.start_transform();
    for &key in &body.fixtures {
        if let Some(fixture) = fixtures.get_mut(key) {
            fixture.synchronize(broad_phase, &xf1, &body.xf);
        }
    }
}

/// Pull a neighbour into a time-of-impact island at the impact time
fn add_toi_body(
    key: BodyKey,
    alpha: f32,
    bodies: &mut SlotMap<BodyKey, Body>,
    island: &mut Island,
    queue: &mut VecDeque<BodyKey>,
) {
    let Some(body) = bodies.get_mut(key) else {
        return;
    };
    if body.flags.contains(BodyFlags::ISLAND) {
        return;
    }
    if !body.is_static() {
        body.advance(alpha);
        body.set_awake(true);
    }
    body.flags |= BodyFlags::ISLAND;
    island.add_body(key, body);
    queue.push_back(key);
}

impl World {
    /// Create a new physics world with default configuration
    pub fn new() -> Self {
        Self::with_config(PhysicsConfig::default())
    }

    /// Create a new physics world with custom configuration
    pub fn with_config(config: PhysicsConfig) -> Self {
        Self {
            bodies: SlotMap::with_key(),
            fixtures: SlotMap::with_key(),
            joints: SlotMap::with_key(),
            contact_manager: ContactManager::new(),
            workspace: SolverWorkspace::default(),
            events: Vec::new(),
            flags: WorldFlags::empty(),
            inv_dt0: 0.0,
            stats: StepStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn gravity(&self) -> Vec2 {
        self.config.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.config.gravity = gravity;
    }

    /// Enable or disable sleeping; disabling wakes every body
    pub fn set_allow_sleep(&mut self, allow: bool) {
        if allow == self.config.allow_sleep {
            return;
        }
        self.config.allow_sleep = allow;
        if !allow {
            for body in self.bodies.values_mut() {
                body.set_awake(true);
            }
        }
    }

    pub fn set_warm_starting(&mut self, enabled: bool) {
        self.config.warm_starting = enabled;
    }

    pub fn set_continuous_physics(&mut self, enabled: bool) {
        self.config.continuous_physics = enabled;
    }

    pub fn set_auto_clear_forces(&mut self, enabled: bool) {
        self.config.auto_clear_forces = enabled;
    }

    /// Whether a step is in progress
    pub fn is_locked(&self) -> bool {
        self.flags.contains(WorldFlags::LOCKED)
    }

    fn check_unlocked(&self) -> Result<(), PhysicsError> {
        if self.is_locked() {
            Err(PhysicsError::WorldLocked)
        } else {
            Ok(())
        }
    }

    /// Add a body to the world and return its key
    pub fn create_body(&mut self, def: &BodyDef) -> Result<BodyKey, PhysicsError> {
        self.check_unlocked()?;
        let key = self.bodies.insert(Body::new(def));
        debug!("created {:?} body {:?}", def.body_type, key);
        Ok(key)
    }

    /// Remove a body with its joints, contacts and fixtures
    ///
    /// Queues `JointRemoved` and `FixtureRemoved` for the implicitly
    /// destroyed joints and fixtures, and `EndContact` for touching contacts.
    pub fn destroy_body(&mut self, key: BodyKey) -> Result<(), PhysicsError> {
        self.check_unlocked()?;
        let body = self.bodies.get(key).ok_or(PhysicsError::InvalidBody(key))?;
        let joint_keys: Vec<JointKey> = body.joint_edges.iter().map(|edge| edge.joint).collect();
        let fixture_keys = body.fixtures.clone();

        for joint in joint_keys {
            self.events.push(WorldEvent::JointRemoved { joint });
            self.remove_joint(joint);
        }

        self.contact_manager
            .destroy_body_contacts(key, &mut self.bodies, &mut self.events);

        for fixture_key in fixture_keys {
            if let Some(mut fixture) = self.fixtures.remove(fixture_key) {
                fixture.destroy_proxy(&mut self.contact_manager.broad_phase);
                self.events.push(WorldEvent::FixtureRemoved { fixture: fixture_key });
            }
        }

        self.bodies.remove(key);
        debug!("destroyed body {:?}", key);
        Ok(())
    }

    /// Attach a fixture to a body
    ///
    /// The body's mass is recomputed when the fixture has density. Contacts
    /// for the new fixture appear at the start of the next step.
    pub fn create_fixture(&mut self, body_key: BodyKey, def: &FixtureDef) -> Result<FixtureKey, PhysicsError> {
        self.check_unlocked()?;
        let body = self
            .bodies
            .get_mut(body_key)
            .ok_or(PhysicsError::InvalidBody(body_key))?;

        let key = self.fixtures.insert(Fixture::new(body_key, def));
        if body.is_active() {
            self.fixtures[key].create_proxy(&mut self.contact_manager.broad_phase, &body.xf, key);
        }
        body.fixtures.push(key);

        if def.material.density > 0.0 {
            self.reset_body_mass(body_key);
        }
        self.flags |= WorldFlags::NEW_FIXTURE;
        Ok(key)
    }

    /// Detach a fixture, destroying its contacts and proxy
    pub fn destroy_fixture(&mut self, key: FixtureKey) -> Result<(), PhysicsError> {
        self.check_unlocked()?;
        let body_key = self
            .fixtures
            .get(key)
            .map(|fixture| fixture.body)
            .ok_or(PhysicsError::InvalidFixture(key))?;

        self.contact_manager
            .destroy_fixture_contacts(key, body_key, &mut self.bodies, &mut self.events);

        if let Some(mut fixture) = self.fixtures.remove(key) {
            fixture.destroy_proxy(&mut self.contact_manager.broad_phase);
        }
        if let Some(body) = self.bodies.get_mut(body_key) {
            body.fixtures.retain(|&fixture| fixture != key);
        }
        self.reset_body_mass(body_key);
        Ok(())
    }

    /// Recompute a body's mass, center of mass and inertia from its fixtures
    pub fn reset_mass_data(&mut self, key: BodyKey) -> Result<(), PhysicsError> {
        self.check_unlocked()?;
        if !self.bodies.contains_key(key) {
            return Err(PhysicsError::InvalidBody(key));
        }
        self.reset_body_mass(key);
        Ok(())
    }

    fn reset_body_mass(&mut self, key: BodyKey) {
        let Some(body) = self.bodies.get_mut(key) else {
            return;
        };

        let mut mass = 0.0;
        let mut center = Vec2::ZERO;
        let mut inertia = 0.0;
        if body.is_dynamic() {
            for fixture in body.fixtures.iter().filter_map(|&fk| self.fixtures.get(fk)) {
                if fixture.density() == 0.0 {
                    continue;
                }
                let mass_data = fixture.mass_data();
                mass += mass_data.mass;
                center += mass_data.center * mass_data.mass;
                inertia += mass_data.inertia;
            }
        }
        body.apply_mass_data(mass, center, inertia);
    }

    /// Connect two bodies with a joint
    ///
    /// Unless the joint allows it, existing contacts between the bodies are
    /// flagged and dropped at the next collide.
    pub fn create_joint(&mut self, def: &JointDef) -> Result<JointKey, PhysicsError> {
        self.check_unlocked()?;
        if def.body_a == def.body_b {
            return Err(PhysicsError::SameBody);
        }
        let body_a = self.bodies.get(def.body_a).ok_or(PhysicsError::InvalidBody(def.body_a))?;
        let body_b = self.bodies.get(def.body_b).ok_or(PhysicsError::InvalidBody(def.body_b))?;

        let key = self.joints.insert(Joint::new(def, body_a, body_b));
        let collide_connected = def.collide_connected;
        if let Some(body) = self.bodies.get_mut(def.body_a) {
            body.joint_edges.push(JointEdge {
                other: def.body_b,
                joint: key,
                collide_connected,
            });
        }
        if let Some(body) = self.bodies.get_mut(def.body_b) {
            body.joint_edges.push(JointEdge {
                other: def.body_a,
                joint: key,
                collide_connected,
            });
        }

        if !collide_connected {
            self.contact_manager
                .flag_pair_for_filtering(def.body_a, def.body_b, &self.bodies);
        }
        debug!("created joint {:?} between {:?} and {:?}", key, def.body_a, def.body_b);
        Ok(key)
    }

    /// Remove a joint and wake both of its bodies
    pub fn destroy_joint(&mut self, key: JointKey) -> Result<(), PhysicsError> {
        self.check_unlocked()?;
        self.remove_joint(key).ok_or(PhysicsError::InvalidJoint(key))?;
        debug!("destroyed joint {:?}", key);
        Ok(())
    }

    fn remove_joint(&mut self, key: JointKey) -> Option<Joint> {
        let joint = self.joints.remove(key)?;
        for body_key in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body_key) {
                body.joint_edges.retain(|edge| edge.joint != key);
                body.set_awake(true);
            }
        }

        // The pair may collide now: re-filter what exists and let the
        // broad-phase report the pair again
        if !joint.collide_connected {
            self.contact_manager
                .flag_pair_for_filtering(joint.body_a, joint.body_b, &self.bodies);
            self.touch_body_proxies(joint.body_a);
        }
        Some(joint)
    }

    fn touch_body_proxies(&mut self, key: BodyKey) {
        let Some(body) = self.bodies.get(key) else {
            return;
        };
        for fixture in body.fixtures.iter().filter_map(|&fk| self.fixtures.get(fk)) {
            if let Some(proxy) = fixture.proxy {
                self.contact_manager.broad_phase.touch_proxy(proxy);
            }
        }
        self.flags |= WorldFlags::NEW_FIXTURE;
    }

    /// Teleport a body, refreshing its proxies and finding new pairs
    ///
    /// The body is woken so its contacts are re-evaluated at the next step.
    pub fn set_transform(&mut self, key: BodyKey, position: Vec2, angle: f32) -> Result<(), PhysicsError> {
        self.check_unlocked()?;
        let body = self.bodies.get_mut(key).ok_or(PhysicsError::InvalidBody(key))?;
        body.set_transform_internal(position, angle);
        body.set_awake(true);

        let xf = body.xf;
        for &fixture_key in &body.fixtures {
            if let Some(fixture) = self.fixtures.get_mut(fixture_key) {
                fixture.synchronize(&mut self.contact_manager.broad_phase, &xf, &xf);
            }
        }
        self.contact_manager.find_new_contacts(&mut self.bodies, &self.fixtures);
        Ok(())
    }

    /// Add a body to or remove it from the simulation
    ///
    /// An inactive body keeps its fixtures and joints but has no proxies
    /// and no contacts.
    pub fn set_body_active(&mut self, key: BodyKey, active: bool) -> Result<(), PhysicsError> {
        self.check_unlocked()?;
        let body = self.bodies.get_mut(key).ok_or(PhysicsError::InvalidBody(key))?;
        if body.is_active() == active {
            return Ok(());
        }

        let broad_phase = &mut self.contact_manager.broad_phase;
        if active {
            body.flags |= BodyFlags::ACTIVE;
            let xf = body.xf;
            for &fixture_key in &body.fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_key) {
                    fixture.create_proxy(broad_phase, &xf, fixture_key);
                }
            }
            self.flags |= WorldFlags::NEW_FIXTURE;
        } else {
            body.flags -= BodyFlags::ACTIVE;
            for &fixture_key in &body.fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_key) {
                    fixture.destroy_proxy(broad_phase);
                }
            }
            self.contact_manager
                .destroy_body_contacts(key, &mut self.bodies, &mut self.events);
        }
        debug!("body {:?} active: {}", key, active);
        Ok(())
    }

    /// Replace a fixture's collision filter
    ///
    /// Existing contacts are re-filtered at the next collide and the
    /// broad-phase reports the fixture's pairs again.
    pub fn set_fixture_filter(&mut self, key: FixtureKey, filter: CollisionFilter) -> Result<(), PhysicsError> {
        self.check_unlocked()?;
        let fixture = self.fixtures.get_mut(key).ok_or(PhysicsError::InvalidFixture(key))?;
        fixture.filter = filter;
        let body_key = fixture.body;
        if let Some(proxy) = fixture.proxy {
            self.contact_manager.broad_phase.touch_proxy(proxy);
            self.flags |= WorldFlags::NEW_FIXTURE;
        }

        if let Some(body) = self.bodies.get(body_key) {
            for edge in &body.contact_edges {
                if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                    if contact.fixture_a == key || contact.fixture_b == key {
                        contact.flag_for_filtering();
                    }
                }
            }
        }
        Ok(())
    }

    /// Enable or disable a contact
    ///
    /// A disabled contact keeps its manifold but is skipped by the solvers.
    /// The setting persists until changed again or the contact is destroyed.
    pub fn set_contact_enabled(&mut self, key: ContactKey, enabled: bool) -> Result<(), PhysicsError> {
        let contact = self
            .contact_manager
            .contacts
            .get_mut(key)
            .ok_or(PhysicsError::InvalidContact(key))?;
        contact.set_enabled(enabled);
        Ok(())
    }

    /// Zero the accumulated force and torque on every body
    pub fn clear_forces(&mut self) {
        for body in self.bodies.values_mut() {
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
    }

    /// Take every queued event, oldest first
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, WorldEvent> {
        self.events.drain(..)
    }

    /// Step the physics simulation forward by dt seconds
    ///
    /// This performs:
    /// 1. Pair search for fixtures added since the last step
    /// 2. Narrow phase on every live contact
    /// 3. Island build and impulse solve, when `dt > 0`
    /// 4. Time-of-impact sub-stepping, when continuous physics is on
    pub fn step(&mut self, dt: f32, velocity_iterations: usize, position_iterations: usize) {
        if self.flags.contains(WorldFlags::NEW_FIXTURE) {
            self.contact_manager.find_new_contacts(&mut self.bodies, &self.fixtures);
            self.flags -= WorldFlags::NEW_FIXTURE;
        }

        self.flags |= WorldFlags::LOCKED;

        let mut step = TimeStep::new(dt, velocity_iterations, position_iterations);
        step.dt_ratio = self.inv_dt0 * dt;
        step.warm_starting = self.config.warm_starting;

        // Update contacts. This is where some contacts are destroyed.
        self.contact_manager
            .collide(&mut self.bodies, &self.fixtures, &mut self.events);

        self.stats = StepStats::default();
        if step.dt > 0.0 {
            self.solve(&step);
        }
        if self.config.continuous_physics && step.dt > 0.0 {
            self.solve_toi(&step);
        }
        if step.dt > 0.0 {
            self.inv_dt0 = step.inv_dt;
        }

        if self.config.auto_clear_forces {
            self.clear_forces();
        }

        self.flags -= WorldFlags::LOCKED;
        trace!(
            "step: {} islands, {} toi events, {} contacts",
            self.stats.islands,
            self.stats.toi_events,
            self.contact_manager.contacts.len()
        );
    }

    /// Discrete pass: build islands by depth-first search and solve each
    fn solve(&mut self, step: &TimeStep) {
        let World {
            bodies,
            fixtures,
            joints,
            contact_manager,
            workspace,
            events,
            config,
            stats,
            ..
        } = self;
        let SolverWorkspace {
            island, seeds, stack, ..
        } = workspace;

        for body in bodies.values_mut() {
            body.flags -= BodyFlags::ISLAND;
        }
        for contact in contact_manager.contacts.values_mut() {
            contact.flags -= ContactFlags::ISLAND;
        }
        for joint in joints.values_mut() {
            joint.island = false;
        }

        seeds.clear();
        seeds.extend(bodies.keys());
        for &seed in seeds.iter() {
            let body = &bodies[seed];
            if body.flags.contains(BodyFlags::ISLAND) || !body.is_awake() || !body.is_active() || body.is_static() {
                continue;
            }

            island.clear();
            stack.clear();
            stack.push(seed);
            bodies[seed].flags |= BodyFlags::ISLAND;

            while let Some(key) = stack.pop() {
                let body = &mut bodies[key];
                island.add_body(key, body);
                body.set_awake(true);

                // Don't propagate islands across static bodies
                if body.is_static() {
                    continue;
                }

                for i in 0..bodies[key].contact_edges.len() {
                    let edge = bodies[key].contact_edges[i];
                    let Some(contact) = contact_manager.contacts.get_mut(edge.contact) else {
                        continue;
                    };
                    if contact.flags.contains(ContactFlags::ISLAND) || !contact.is_solid() {
                        continue;
                    }
                    contact.flags |= ContactFlags::ISLAND;
                    island.contacts.push(edge.contact);

                    let other = &mut bodies[edge.other];
                    if other.flags.contains(BodyFlags::ISLAND) {
                        continue;
                    }
                    other.flags |= BodyFlags::ISLAND;
                    stack.push(edge.other);
                }

                for i in 0..bodies[key].joint_edges.len() {
                    let edge = bodies[key].joint_edges[i];
                    let Some(joint) = joints.get_mut(edge.joint) else {
                        continue;
                    };
                    if joint.island || !joint.enabled {
                        continue;
                    }
                    let other = &mut bodies[edge.other];
                    if !other.is_active() {
                        continue;
                    }
                    joint.island = true;
                    island.joints.push(edge.joint);

                    if other.flags.contains(BodyFlags::ISLAND) {
                        continue;
                    }
                    other.flags |= BodyFlags::ISLAND;
                    stack.push(edge.other);
                }
            }

            island.solve(
                step,
                config.gravity,
                config.allow_sleep,
                bodies,
                &mut contact_manager.contacts,
                joints,
                events,
            );
            stats.islands += 1;

            // Static bodies may take part in other islands
            for &key in &island.bodies {
                let body = &mut bodies[key];
                if body.is_static() {
                    body.flags -= BodyFlags::ISLAND;
                }
            }
        }

        for &key in seeds.iter() {
            let body = &bodies[key];
            if !body.flags.contains(BodyFlags::ISLAND) || body.is_static() {
                continue;
            }
            synchronize_fixtures(body, fixtures, &mut contact_manager.broad_phase);
        }

        contact_manager.find_new_contacts(bodies, fixtures);
    }

    /// Continuous pass: repeatedly advance the earliest impact pair and
    /// resolve it in a small sub-step island
    fn solve_toi(&mut self, step: &TimeStep) {
        let World {
            bodies,
            fixtures,
            joints,
            contact_manager,
            workspace,
            events,
            config,
            stats,
            ..
        } = self;
        let SolverWorkspace { island, queue, .. } = workspace;

        for body in bodies.values_mut() {
            body.flags -= BodyFlags::ISLAND;
            body.sweep.alpha0 = 0.0;
        }
        for contact in contact_manager.contacts.values_mut() {
            contact.flags -= ContactFlags::TOI | ContactFlags::ISLAND;
            contact.toi_count = 0;
        }
        for joint in joints.values_mut() {
            joint.island = false;
        }

        loop {
            // Find the first impact
            let mut min_contact = None;
            let mut min_alpha = 1.0;
            for (key, contact) in contact_manager.contacts.iter_mut() {
                if !contact.is_enabled() || contact.is_sensor() || !contact.is_continuous() {
                    continue;
                }
                // Too many sub-steps already, leave the rest to the next step
                if contact.toi_count >= MAX_SUB_STEPS {
                    continue;
                }

                let alpha = if contact.flags.contains(ContactFlags::TOI) {
                    contact.toi
                } else {
                    let (key_a, key_b) = (contact.body_a, contact.body_b);
                    let (Some(body_a), Some(body_b)) = (bodies.get(key_a), bodies.get(key_b)) else {
                        continue;
                    };
                    let active_a = body_a.is_awake() && !body_a.is_static();
                    let active_b = body_b.is_awake() && !body_b.is_static();
                    if !active_a && !active_b {
                        continue;
                    }

                    // Put the sweeps onto the same time interval
                    let (alpha0_a, alpha0_b) = (body_a.sweep.alpha0, body_b.sweep.alpha0);
                    let t0 = alpha0_a.max(alpha0_b);
                    if alpha0_a < t0 {
                        bodies[key_a].sweep.advance(t0);
                    } else if alpha0_b < t0 {
                        bodies[key_b].sweep.advance(t0);
                    }

                    let (Some(fixture_a), Some(fixture_b)) =
                        (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
                    else {
                        continue;
                    };
                    bodies[key_a].sweep.normalize();
                    bodies[key_b].sweep.normalize();
                    let output = time_of_impact(&ToiInput {
                        shape_a: &fixture_a.shape,
                        sweep_a: bodies[key_a].sweep,
                        shape_b: &fixture_b.shape,
                        sweep_b: bodies[key_b].sweep,
                        t_max: 1.0,
                    });

                    // Beta is a fraction of the remaining sweep. An overlapped
                    // pair gets an event at t0 so it can be pushed apart.
                    let alpha = match output.state {
                        ToiState::Touching | ToiState::Overlapped => (t0 + (1.0 - t0) * output.t).min(1.0),
                        ToiState::Failed | ToiState::Separated => 1.0,
                    };
                    contact.toi = alpha;
                    contact.flags |= ContactFlags::TOI;
                    alpha
                };

                if EPSILON < alpha && alpha < min_alpha {
                    min_contact = Some(key);
                    min_alpha = alpha;
                }
            }

            let Some(min_key) = min_contact else {
                break;
            };
            if 1.0 - 100.0 * EPSILON < min_alpha {
                break;
            }
            if stats.toi_events >= config.max_toi_events {
                warn!("time of impact budget of {} events exhausted", config.max_toi_events);
                break;
            }
            stats.toi_events += 1;

            // Advance the bodies to the impact
            let contact = &contact_manager.contacts[min_key];
            let (key_a, key_b) = (contact.body_a, contact.body_b);
            let backup_a = bodies[key_a].sweep;
            let backup_b = bodies[key_b].sweep;
            bodies[key_a].advance(min_alpha);
            bodies[key_b].advance(min_alpha);

            // The contact likely has new points at the impact pose
            contact_manager.update_contact(min_key, bodies, fixtures, events);
            let Some(contact) = contact_manager.contacts.get_mut(min_key) else {
                continue;
            };
            contact.flags -= ContactFlags::TOI;
            contact.toi_count += 1;

            if contact.is_sensor() || !contact.is_enabled() || !contact.is_touching() {
                // Nothing to resolve, restore the sweeps and skip the pair
                // until one of its bodies moves
                contact.toi = 1.0;
                contact.flags |= ContactFlags::TOI;
                bodies[key_a].sweep = backup_a;
                bodies[key_b].sweep = backup_b;
                bodies[key_a].synchronize_transform();
                bodies[key_b].synchronize_transform();
                continue;
            }

            // Breadth-first island from the dynamic body of the pair
            let seed = if bodies[key_a].is_dynamic() { key_a } else { key_b };
            island.clear();
            queue.clear();
            add_toi_body(seed, min_alpha, bodies, island, queue);

            while let Some(key) = queue.pop_front() {
                let body = &mut bodies[key];
                body.set_awake(true);

                // Don't propagate past non-dynamic bodies
                if !body.is_dynamic() {
                    continue;
                }

                for i in 0..bodies[key].contact_edges.len() {
                    if island.contacts.len() == MAX_TOI_CONTACTS_PER_ISLAND {
                        warn!("time of impact island truncated at {} contacts", MAX_TOI_CONTACTS_PER_ISLAND);
                        break;
                    }
                    let edge = bodies[key].contact_edges[i];
                    let Some(contact) = contact_manager.contacts.get_mut(edge.contact) else {
                        continue;
                    };
                    if contact.flags.contains(ContactFlags::ISLAND) || !contact.is_solid() {
                        continue;
                    }
                    contact.flags |= ContactFlags::ISLAND;
                    island.contacts.push(edge.contact);
                    add_toi_body(edge.other, min_alpha, bodies, island, queue);
                }

                for i in 0..bodies[key].joint_edges.len() {
                    if island.joints.len() == MAX_TOI_JOINTS_PER_ISLAND {
                        warn!("time of impact island truncated at {} joints", MAX_TOI_JOINTS_PER_ISLAND);
                        break;
                    }
                    let edge = bodies[key].joint_edges[i];
                    let Some(joint) = joints.get_mut(edge.joint) else {
                        continue;
                    };
                    if joint.island || !joint.enabled || !bodies[edge.other].is_active() {
                        continue;
                    }
                    joint.island = true;
                    island.joints.push(edge.joint);
                    add_toi_body(edge.other, min_alpha, bodies, island, queue);
                }
            }

            let mut sub_step = TimeStep::new(
                (1.0 - min_alpha) * step.dt,
                step.velocity_iterations,
                step.position_iterations,
            );
            sub_step.dt_ratio = 0.0;
            sub_step.warm_starting = false;

            // Only the impact pair moves in the position pre-solve
            let island_index = |key: BodyKey| {
                bodies
                    .get(key)
                    .filter(|body| body.flags.contains(BodyFlags::ISLAND))
                    .map(|body| body.island_index)
            };
            let (toi_a, toi_b) = (island_index(key_a), island_index(key_b));
            island.solve_toi(&sub_step, toi_a, toi_b, bodies, &contact_manager.contacts);

            // Reset island flags and synchronize broad-phase proxies
            for &key in &island.bodies {
                let body = &mut bodies[key];
                body.flags -= BodyFlags::ISLAND;
                if !body.is_awake() || body.is_static() {
                    continue;
                }
                synchronize_fixtures(body, fixtures, &mut contact_manager.broad_phase);

                // Invalidate every impact time involving the moved body
                for edge in &body.contact_edges {
                    if let Some(contact) = contact_manager.contacts.get_mut(edge.contact) {
                        contact.flags -= ContactFlags::TOI | ContactFlags::ISLAND;
                    }
                }
            }
            for &key in &island.joints {
                if let Some(joint) = joints.get_mut(key) {
                    joint.island = false;
                }
            }

            // Moved proxies may overlap new fixtures
            contact_manager.find_new_contacts(bodies, fixtures);
        }
    }

    /// Visit fixtures whose fat AABB overlaps `aabb`
    ///
    /// The callback returns `false` to stop the query.
    pub fn query_aabb<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(FixtureKey) -> bool,
    {
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.query(aabb, |proxy| match broad_phase.user_data(proxy) {
            Some(fixture) => callback(fixture),
            None => true,
        });
    }

    /// Visit fixtures containing `point`
    pub fn query_point<F>(&self, point: Vec2, mut callback: F)
    where
        F: FnMut(FixtureKey) -> bool,
    {
        let aabb = Aabb::new(point, point);
        self.query_aabb(&aabb, |key| {
            let Some(fixture) = self.fixtures.get(key) else {
                return true;
            };
            let Some(body) = self.bodies.get(fixture.body) else {
                return true;
            };
            if fixture.test_point(&body.xf, point) {
                callback(key)
            } else {
                true
            }
        });
    }

    /// Cast a segment from `p1` to `p2` against every fixture it may cross
    ///
    /// The callback receives the fixture, hit point, surface normal and
    /// fraction along the segment, and returns how to continue: `0` stops,
    /// a fraction clips the segment there (return the hit fraction to find
    /// the closest hit, `1` to see every hit), a negative value ignores the
    /// fixture.
    pub fn ray_cast<F>(&self, p1: Vec2, p2: Vec2, mut callback: F)
    where
        F: FnMut(FixtureKey, Vec2, Vec2, f32) -> f32,
    {
        let broad_phase = &self.contact_manager.broad_phase;
        let input = RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        };
        broad_phase.ray_cast(&input, |sub_input, proxy| {
            let Some(key) = broad_phase.user_data(proxy) else {
                return sub_input.max_fraction;
            };
            let Some(fixture) = self.fixtures.get(key) else {
                return sub_input.max_fraction;
            };
            let Some(body) = self.bodies.get(fixture.body) else {
                return sub_input.max_fraction;
            };
            match fixture.ray_cast(sub_input, &body.xf) {
                Some(output) => {
                    let point = p1 + (p2 - p1) * output.fraction;
                    callback(key, point, output.normal, output.fraction)
                }
                None => sub_input.max_fraction,
            }
        });
    }

    /// Get an immutable reference to a body by key
    pub fn get_body(&self, key: BodyKey) -> Option<&Body> {
        self.bodies.get(key)
    }

    /// Get a mutable reference to a body by key
    pub fn get_body_mut(&mut self, key: BodyKey) -> Option<&mut Body> {
        self.bodies.get_mut(key)
    }

    /// Get an immutable reference to a fixture by key
    pub fn get_fixture(&self, key: FixtureKey) -> Option<&Fixture> {
        self.fixtures.get(key)
    }

    /// Get an immutable reference to a joint by key
    pub fn get_joint(&self, key: JointKey) -> Option<&Joint> {
        self.joints.get(key)
    }

    /// Get a mutable reference to a joint by key
    pub fn get_joint_mut(&mut self, key: JointKey) -> Option<&mut Joint> {
        self.joints.get_mut(key)
    }

    /// Get an immutable reference to a contact by key
    pub fn get_contact(&self, key: ContactKey) -> Option<&Contact> {
        self.contact_manager.contacts.get(key)
    }

    /// Iterate over all bodies
    pub fn bodies(&self) -> impl Iterator<Item = (BodyKey, &Body)> + '_ {
        self.bodies.iter()
    }

    /// Iterate over all body keys
    pub fn body_keys(&self) -> impl Iterator<Item = BodyKey> + '_ {
        self.bodies.keys()
    }

    /// Iterate over all joints
    pub fn joints(&self) -> impl Iterator<Item = (JointKey, &Joint)> + '_ {
        self.joints.iter()
    }

    /// Iterate over all live contacts, touching or not
    pub fn contacts(&self) -> impl Iterator<Item = (ContactKey, &Contact)> + '_ {
        self.contact_manager.contacts.iter()
    }

    /// Get the number of bodies in the world
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contacts.len()
    }

    /// Number of broad-phase proxies
    pub fn proxy_count(&self) -> usize {
        self.contact_manager.broad_phase.proxy_count()
    }

    pub fn tree_height(&self) -> i32 {
        self.contact_manager.broad_phase.tree_height()
    }

    /// Number of bodies currently awake
    pub fn awake_body_count(&self) -> usize {
        self.bodies.values().filter(|body| body.is_awake()).count()
    }

    /// Counters from the most recent step
    pub fn last_step_stats(&self) -> StepStats {
        self.stats
    }
}
