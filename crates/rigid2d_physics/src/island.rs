//! Islands and the per-island solve
//!
//! An island is a set of bodies connected through touching contacts and
//! joints. Islands share no dynamic bodies, so each one is solved on its
//! own: velocities, then positions, then the sleep decision. The arrays
//! live in a [`SolverWorkspace`] owned by the world and are reused between
//! steps.

use std::collections::VecDeque;

use log::debug;
use rigid2d_math::{Rot, Transform, Vec2};
use slotmap::SlotMap;

use crate::body::{Body, BodyKey};
use crate::contact::{Contact, ContactKey};
use crate::contact_solver::{ContactSolver, ContactSolverInput};
use crate::events::WorldEvent;
use crate::joints::{Joint, JointKey};
use crate::settings::{
    ANGULAR_SLEEP_TOLERANCE, BAUMGARTE, LINEAR_SLEEP_TOLERANCE, MAX_ROTATION, MAX_ROTATION_SQUARED, MAX_TRANSLATION,
    MAX_TRANSLATION_SQUARED, TIME_TO_SLEEP,
};

/// Parameters of one solver pass
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeStep {
    pub dt: f32,
    /// Zero when `dt` is zero
    pub inv_dt: f32,
    /// `dt` of this step over `dt` of the previous one, for scaling warm-start impulses
    pub dt_ratio: f32,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    pub warm_starting: bool,
}

impl TimeStep {
    pub fn new(dt: f32, velocity_iterations: usize, position_iterations: usize) -> Self {
        Self {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio: 1.0,
            velocity_iterations,
            position_iterations,
            warm_starting: true,
        }
    }
}

/// Dense copy of the body state the solvers work on
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SolverBody {
    /// Center of mass
    pub c: Vec2,
    pub a: f32,
    pub v: Vec2,
    pub w: f32,
    pub inv_mass: f32,
    pub inv_i: f32,
    pub local_center: Vec2,
}

impl SolverBody {
    /// Origin transform for the current center and angle
    pub fn transform(&self) -> Transform {
        let q = Rot::from_angle(self.a);
        Transform {
            p: self.c - q.rotate(self.local_center),
            q,
        }
    }
}

/// Two distinct solver bodies, mutably
pub(crate) fn pair_mut(bodies: &mut [SolverBody], a: usize, b: usize) -> (&mut SolverBody, &mut SolverBody) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = bodies.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = bodies.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

/// Advance positions by the solved velocities, clamping large motions
fn integrate_positions(bodies: &mut [SolverBody], dt: f32) {
    for body in bodies {
        let translation = body.v * dt;
        if translation.length_squared() > MAX_TRANSLATION_SQUARED {
            body.v = body.v * (MAX_TRANSLATION / translation.length());
        }

        let rotation = body.w * dt;
        if rotation * rotation > MAX_ROTATION_SQUARED {
            body.w *= MAX_ROTATION / rotation.abs();
        }

        body.c += body.v * dt;
        body.a += body.w * dt;
    }
}

#[derive(Default)]
pub(crate) struct Island {
    pub bodies: Vec<BodyKey>,
    pub contacts: Vec<ContactKey>,
    pub joints: Vec<JointKey>,
    solver_bodies: Vec<SolverBody>,
    contact_solver: ContactSolver,
}

impl Island {
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    pub fn add_body(&mut self, key: BodyKey, body: &mut Body) {
        body.island_index = self.bodies.len();
        self.bodies.push(key);
    }

    fn load_bodies(&mut self, bodies: &SlotMap<BodyKey, Body>) {
        self.solver_bodies.clear();
        for &key in &self.bodies {
            let body = &bodies[key];
            self.solver_bodies.push(SolverBody {
                c: body.sweep.c,
                a: body.sweep.a,
                v: body.linear_velocity,
                w: body.angular_velocity,
                inv_mass: body.inv_mass,
                inv_i: body.inv_inertia,
                local_center: body.sweep.local_center,
            });
        }
    }

    fn init_contacts(&mut self, step: &TimeStep, bodies: &SlotMap<BodyKey, Body>, contacts: &SlotMap<ContactKey, Contact>) {
        let inputs = self.contacts.iter().filter_map(|&key| {
            let contact = contacts.get(key)?;
            Some(ContactSolverInput {
                contact: key,
                manifold: &contact.manifold,
                friction: contact.friction,
                restitution: contact.restitution,
                radius_a: contact.radius_a,
                radius_b: contact.radius_b,
                index_a: bodies.get(contact.body_a)?.island_index,
                index_b: bodies.get(contact.body_b)?.island_index,
            })
        });
        self.contact_solver.initialize(step, inputs, &self.solver_bodies);
    }

    /// Copy solved state back, leaving static bodies untouched
    fn store_bodies(&self, bodies: &mut SlotMap<BodyKey, Body>) {
        for (&key, solved) in self.bodies.iter().zip(&self.solver_bodies) {
            let Some(body) = bodies.get_mut(key) else {
                continue;
            };
            if body.is_static() {
                continue;
            }
            body.sweep.c = solved.c;
            body.sweep.a = solved.a;
            body.linear_velocity = solved.v;
            body.angular_velocity = solved.w;
            body.synchronize_transform();
        }
    }

    /// Full solve of a discrete step
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &mut self,
        step: &TimeStep,
        gravity: Vec2,
        allow_sleep: bool,
        bodies: &mut SlotMap<BodyKey, Body>,
        contacts: &mut SlotMap<ContactKey, Contact>,
        joints: &mut SlotMap<JointKey, Joint>,
        events: &mut Vec<WorldEvent>,
    ) {
        // Integrate velocities and apply damping
        for &key in &self.bodies {
            let body = &mut bodies[key];
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;
            if !body.is_dynamic() {
                continue;
            }
            let mut v = body.linear_velocity + (gravity + body.force * body.inv_mass) * step.dt;
            let mut w = body.angular_velocity + step.dt * body.inv_inertia * body.torque;
            v = v * (1.0 - step.dt * body.linear_damping).clamp(0.0, 1.0);
            w *= (1.0 - step.dt * body.angular_damping).clamp(0.0, 1.0);
            body.linear_velocity = v;
            body.angular_velocity = w;
        }
        self.load_bodies(bodies);

        self.init_contacts(step, bodies, contacts);
        self.contact_solver.warm_start(&mut self.solver_bodies);

        for &key in &self.joints {
            let Some(joint) = joints.get_mut(key) else {
                continue;
            };
            joint.index_a = bodies[joint.body_a].island_index;
            joint.index_b = bodies[joint.body_b].island_index;
            let error = joint.init_velocity_constraints(step, &self.solver_bodies);
            if joint.enabled && error.abs() > joint.breakpoint {
                joint.enabled = false;
                events.push(WorldEvent::JointBroke { joint: key });
                debug!("joint {:?} broke with error {}", key, error);
                continue;
            }
            joint.warm_start(step, &mut self.solver_bodies);
        }

        for _ in 0..step.velocity_iterations {
            for &key in &self.joints {
                if let Some(joint) = joints.get_mut(key).filter(|j| j.enabled) {
                    joint.solve_velocity_constraints(&mut self.solver_bodies);
                }
            }
            self.contact_solver.solve_velocity_constraints(&mut self.solver_bodies);
        }

        self.contact_solver.store_impulses(contacts);

        integrate_positions(&mut self.solver_bodies, step.dt);

        for _ in 0..step.position_iterations {
            let contacts_ok = self.contact_solver.solve_position_constraints(&mut self.solver_bodies, BAUMGARTE);
            let mut joints_ok = true;
            for &key in &self.joints {
                if let Some(joint) = joints.get_mut(key).filter(|j| j.enabled) {
                    let ok = joint.solve_position_constraints(&mut self.solver_bodies);
                    joints_ok = joints_ok && ok;
                }
            }
            if contacts_ok && joints_ok {
                break;
            }
        }

        self.store_bodies(bodies);

        if allow_sleep {
            self.update_sleep(step.dt, bodies);
        }
    }

    fn update_sleep(&self, dt: f32, bodies: &mut SlotMap<BodyKey, Body>) {
        let lin_tol_sqr = LINEAR_SLEEP_TOLERANCE * LINEAR_SLEEP_TOLERANCE;
        let ang_tol_sqr = ANGULAR_SLEEP_TOLERANCE * ANGULAR_SLEEP_TOLERANCE;

        let mut min_sleep_time = f32::MAX;
        for &key in &self.bodies {
            let body = &mut bodies[key];
            if body.is_static() {
                continue;
            }
            if !body.is_sleeping_allowed()
                || body.angular_velocity * body.angular_velocity > ang_tol_sqr
                || body.linear_velocity.length_squared() > lin_tol_sqr
            {
                body.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                body.sleep_time += dt;
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }

        if min_sleep_time >= TIME_TO_SLEEP {
            for &key in &self.bodies {
                bodies[key].set_awake(false);
            }
            debug!("island of {} bodies went to sleep", self.bodies.len());
        }
    }

    /// Sub-step solve for a time-of-impact island
    ///
    /// Bodies were already advanced to the impact time. The impact pair is
    /// first pushed apart with every other body held fixed, and that pose
    /// becomes the start of their sweeps. Then contacts only, no warm
    /// starting, impulses are not stored.
    pub fn solve_toi(
        &mut self,
        step: &TimeStep,
        toi_a: Option<usize>,
        toi_b: Option<usize>,
        bodies: &mut SlotMap<BodyKey, Body>,
        contacts: &SlotMap<ContactKey, Contact>,
    ) {
        self.load_bodies(bodies);
        self.init_contacts(step, bodies, contacts);

        for _ in 0..step.position_iterations {
            if self.contact_solver.solve_toi_position_constraints(&mut self.solver_bodies, toi_a, toi_b) {
                break;
            }
        }

        // The corrected impact pose is where the rest of the step starts from
        for index in [toi_a, toi_b].into_iter().flatten() {
            let Some(&key) = self.bodies.get(index) else {
                continue;
            };
            let Some(body) = bodies.get_mut(key) else {
                continue;
            };
            if body.is_static() {
                continue;
            }
            let solved = &self.solver_bodies[index];
            body.sweep.c0 = solved.c;
            body.sweep.a0 = solved.a;
        }

        // Constraint geometry follows the moved pair
        self.init_contacts(step, bodies, contacts);

        for _ in 0..step.velocity_iterations {
            self.contact_solver.solve_velocity_constraints(&mut self.solver_bodies);
        }

        integrate_positions(&mut self.solver_bodies, step.dt);

        self.store_bodies(bodies);
    }
}

/// Scratch state reused by every step
#[derive(Default)]
pub(crate) struct SolverWorkspace {
    pub island: Island,
    /// Snapshot of body keys for the island seed loop
    pub seeds: Vec<BodyKey>,
    /// Depth-first stack for discrete islands
    pub stack: Vec<BodyKey>,
    /// Breadth-first queue for time-of-impact islands
    pub queue: VecDeque<BodyKey>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;

    const EPSILON: f32 = 0.0001;

    #[test]
    fn test_time_step_inverse() {
        let step = TimeStep::new(0.5, 8, 3);
        assert_eq!(step.inv_dt, 2.0);
        assert_eq!(TimeStep::new(0.0, 8, 3).inv_dt, 0.0);
    }

    #[test]
    fn test_pair_mut_either_order() {
        let mut bodies = vec![SolverBody::default(); 3];
        {
            let (a, b) = pair_mut(&mut bodies, 2, 0);
            a.w = 1.0;
            b.w = 2.0;
        }
        assert_eq!(bodies[2].w, 1.0);
        assert_eq!(bodies[0].w, 2.0);
    }

    #[test]
    fn test_integrate_positions_clamps_translation() {
        let mut bodies = vec![SolverBody {
            v: Vec2::new(1000.0, 0.0),
            ..Default::default()
        }];
        integrate_positions(&mut bodies, 1.0 / 60.0);
        assert!((bodies[0].c.x - MAX_TRANSLATION).abs() < EPSILON);
    }

    fn single_body_island(def: BodyDef) -> (Island, SlotMap<BodyKey, Body>, BodyKey) {
        let mut bodies = SlotMap::with_key();
        let key = bodies.insert(Body::new(&def));
        let mut island = Island::default();
        island.add_body(key, &mut bodies[key]);
        (island, bodies, key)
    }

    fn solve(island: &mut Island, bodies: &mut SlotMap<BodyKey, Body>, gravity: Vec2, dt: f32) {
        let mut contacts = SlotMap::with_key();
        let mut joints = SlotMap::with_key();
        let mut events = Vec::new();
        let step = TimeStep::new(dt, 8, 3);
        island.solve(&step, gravity, true, bodies, &mut contacts, &mut joints, &mut events);
    }

    #[test]
    fn test_free_fall_semi_implicit_euler() {
        let (mut island, mut bodies, key) = single_body_island(BodyDef::dynamic(Vec2::ZERO));
        solve(&mut island, &mut bodies, Vec2::new(0.0, -10.0), 0.1);
        let body = &bodies[key];
        assert!((body.linear_velocity().y + 1.0).abs() < EPSILON);
        assert!((body.position().y + 0.1).abs() < EPSILON);
        assert_eq!(body.sweep().c0, Vec2::ZERO);
    }

    #[test]
    fn test_damping_slows_body() {
        let (mut island, mut bodies, key) =
            single_body_island(BodyDef::dynamic(Vec2::ZERO).with_linear_velocity(Vec2::X).with_damping(5.0, 0.0));
        solve(&mut island, &mut bodies, Vec2::ZERO, 0.1);
        assert!((bodies[key].linear_velocity().x - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_resting_body_falls_asleep() {
        let (mut island, mut bodies, key) = single_body_island(BodyDef::dynamic(Vec2::ZERO));
        for _ in 0..40 {
            if !bodies[key].is_awake() {
                break;
            }
            solve(&mut island, &mut bodies, Vec2::ZERO, 1.0 / 60.0);
        }
        assert!(!bodies[key].is_awake());
    }

    #[test]
    fn test_sleep_forbidden_keeps_body_awake() {
        let (mut island, mut bodies, key) = single_body_island(BodyDef::dynamic(Vec2::ZERO).with_allow_sleep(false));
        for _ in 0..60 {
            solve(&mut island, &mut bodies, Vec2::ZERO, 1.0 / 60.0);
        }
        assert!(bodies[key].is_awake());
    }

    #[test]
    fn test_forces_accelerate_body() {
        let (mut island, mut bodies, key) = single_body_island(BodyDef::dynamic(Vec2::ZERO));
        bodies[key].apply_force_to_center(Vec2::new(2.0, 0.0));
        solve(&mut island, &mut bodies, Vec2::ZERO, 0.5);
        assert!((bodies[key].linear_velocity().x - 1.0).abs() < EPSILON);
    }
}
