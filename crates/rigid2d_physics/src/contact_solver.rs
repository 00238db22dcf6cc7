//! Sequential impulse contact solver
//!
//! Velocity constraints are built from the world manifold at the start of
//! the island solve. Each velocity iteration applies friction first, clamped
//! to the Coulomb cone of the accumulated normal impulse, then the normal
//! impulse, clamped to stay non-negative. Position constraints re-evaluate
//! the separation from the current body poses and push bodies apart with a
//! Baumgarte-scaled correction.

use rigid2d_math::Vec2;
use slotmap::SlotMap;

use crate::collision::{Manifold, ManifoldType, WorldManifold};
use crate::contact::{Contact, ContactKey};
use crate::island::{pair_mut, SolverBody, TimeStep};
use crate::settings::{
    EPSILON, LINEAR_SLOP, MAX_LINEAR_CORRECTION, MAX_MANIFOLD_POINTS, TOI_BAUMGARTE, VELOCITY_THRESHOLD,
};

/// What the solver needs from one contact
pub(crate) struct ContactSolverInput<'a> {
    pub contact: ContactKey,
    pub manifold: &'a Manifold,
    pub friction: f32,
    pub restitution: f32,
    pub radius_a: f32,
    pub radius_b: f32,
    /// Solver body indices
    pub index_a: usize,
    pub index_b: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct ConstraintPoint {
    /// Anchor relative to the center of mass of A
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    /// Restitution target
    velocity_bias: f32,
}

#[derive(Clone, Debug)]
pub(crate) struct ContactConstraint {
    contact: ContactKey,
    points: [ConstraintPoint; MAX_MANIFOLD_POINTS],
    point_count: usize,
    normal: Vec2,
    friction: f32,
    index_a: usize,
    index_b: usize,
    // Manifold geometry for the position solver
    manifold_type: ManifoldType,
    local_normal: Vec2,
    local_point: Vec2,
    local_points: [Vec2; MAX_MANIFOLD_POINTS],
    radius_a: f32,
    radius_b: f32,
}

impl ContactConstraint {
    fn tangent(&self) -> Vec2 {
        self.normal.cross_scalar(1.0)
    }

    /// Normal, point and separation of point `i` at the current poses
    fn position_manifold(&self, a: &SolverBody, b: &SolverBody, i: usize) -> (Vec2, Vec2, f32) {
        let xf_a = a.transform();
        let xf_b = b.transform();
        match self.manifold_type {
            ManifoldType::Circles => {
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.local_points[0]);
                let normal = if point_a.distance_squared(point_b) > EPSILON * EPSILON {
                    (point_b - point_a).normalized()
                } else {
                    Vec2::X
                };
                let point = (point_a + point_b) * 0.5;
                let separation = (point_b - point_a).dot(normal) - self.radius_a - self.radius_b;
                (normal, point, separation)
            }
            ManifoldType::FaceA => {
                let normal = xf_a.q.rotate(self.local_normal);
                let plane_point = xf_a.apply(self.local_point);
                let clip_point = xf_b.apply(self.local_points[i]);
                let separation = (clip_point - plane_point).dot(normal) - self.radius_a - self.radius_b;
                (normal, clip_point, separation)
            }
            ManifoldType::FaceB => {
                let normal = xf_b.q.rotate(self.local_normal);
                let plane_point = xf_b.apply(self.local_point);
                let clip_point = xf_a.apply(self.local_points[i]);
                let separation = (clip_point - plane_point).dot(normal) - self.radius_a - self.radius_b;
                // Ensure normal points from A to B
                (-normal, clip_point, separation)
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct ContactSolver {
    constraints: Vec<ContactConstraint>,
}

impl ContactSolver {
    /// Build velocity constraints; impulses are scaled by the dt ratio when
    /// warm starting and zeroed otherwise
    pub fn initialize<'a, I>(&mut self, step: &TimeStep, inputs: I, bodies: &[SolverBody])
    where
        I: IntoIterator<Item = ContactSolverInput<'a>>,
    {
        self.constraints.clear();
        for input in inputs {
            let manifold = input.manifold;
            let body_a = &bodies[input.index_a];
            let body_b = &bodies[input.index_b];
            let world_manifold = WorldManifold::new(
                manifold,
                &body_a.transform(),
                input.radius_a,
                &body_b.transform(),
                input.radius_b,
            );

            let mut constraint = ContactConstraint {
                contact: input.contact,
                points: [ConstraintPoint::default(); MAX_MANIFOLD_POINTS],
                point_count: manifold.point_count,
                normal: world_manifold.normal,
                friction: input.friction,
                index_a: input.index_a,
                index_b: input.index_b,
                manifold_type: manifold.manifold_type,
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                local_points: [Vec2::ZERO; MAX_MANIFOLD_POINTS],
                radius_a: input.radius_a,
                radius_b: input.radius_b,
            };
            let tangent = constraint.tangent();

            for (i, mp) in manifold.points().iter().enumerate() {
                let r_a = world_manifold.points[i] - body_a.c;
                let r_b = world_manifold.points[i] - body_b.c;

                let rn_a = r_a.cross(constraint.normal);
                let rn_b = r_b.cross(constraint.normal);
                let k_normal = body_a.inv_mass
                    + body_b.inv_mass
                    + body_a.inv_i * rn_a * rn_a
                    + body_b.inv_i * rn_b * rn_b;

                let rt_a = r_a.cross(tangent);
                let rt_b = r_b.cross(tangent);
                let k_tangent = body_a.inv_mass
                    + body_b.inv_mass
                    + body_a.inv_i * rt_a * rt_a
                    + body_b.inv_i * rt_b * rt_b;

                // Relative normal velocity for restitution
                let dv = body_b.v + Vec2::scalar_cross(body_b.w, r_b) - body_a.v - Vec2::scalar_cross(body_a.w, r_a);
                let v_rel = constraint.normal.dot(dv);
                let velocity_bias = if v_rel < -VELOCITY_THRESHOLD {
                    -input.restitution * v_rel
                } else {
                    0.0
                };

                let (normal_impulse, tangent_impulse) = if step.warm_starting {
                    (step.dt_ratio * mp.normal_impulse, step.dt_ratio * mp.tangent_impulse)
                } else {
                    (0.0, 0.0)
                };

                constraint.local_points[i] = mp.local_point;
                constraint.points[i] = ConstraintPoint {
                    r_a,
                    r_b,
                    normal_impulse,
                    tangent_impulse,
                    normal_mass: if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 },
                    tangent_mass: if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 },
                    velocity_bias,
                };
            }

            self.constraints.push(constraint);
        }
    }

    /// Apply the initial impulses
    pub fn warm_start(&self, bodies: &mut [SolverBody]) {
        for c in &self.constraints {
            let tangent = c.tangent();
            let (a, b) = pair_mut(bodies, c.index_a, c.index_b);
            for point in &c.points[..c.point_count] {
                let p = c.normal * point.normal_impulse + tangent * point.tangent_impulse;
                a.v -= p * a.inv_mass;
                a.w -= a.inv_i * point.r_a.cross(p);
                b.v += p * b.inv_mass;
                b.w += b.inv_i * point.r_b.cross(p);
            }
        }
    }

    pub fn solve_velocity_constraints(&mut self, bodies: &mut [SolverBody]) {
        for c in &mut self.constraints {
            let normal = c.normal;
            let tangent = normal.cross_scalar(1.0);
            let friction = c.friction;
            let (a, b) = pair_mut(bodies, c.index_a, c.index_b);

            // Friction first so the normal constraint wins
            for point in &mut c.points[..c.point_count] {
                let dv = b.v + Vec2::scalar_cross(b.w, point.r_b) - a.v - Vec2::scalar_cross(a.w, point.r_a);
                let vt = dv.dot(tangent);
                let lambda = point.tangent_mass * -vt;

                let max_friction = friction * point.normal_impulse;
                let new_impulse = (point.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - point.tangent_impulse;
                point.tangent_impulse = new_impulse;

                let p = tangent * lambda;
                a.v -= p * a.inv_mass;
                a.w -= a.inv_i * point.r_a.cross(p);
                b.v += p * b.inv_mass;
                b.w += b.inv_i * point.r_b.cross(p);
            }

            for point in &mut c.points[..c.point_count] {
                let dv = b.v + Vec2::scalar_cross(b.w, point.r_b) - a.v - Vec2::scalar_cross(a.w, point.r_a);
                let vn = dv.dot(normal);
                let lambda = -point.normal_mass * (vn - point.velocity_bias);

                let new_impulse = (point.normal_impulse + lambda).max(0.0);
                let lambda = new_impulse - point.normal_impulse;
                point.normal_impulse = new_impulse;

                let p = normal * lambda;
                a.v -= p * a.inv_mass;
                a.w -= a.inv_i * point.r_a.cross(p);
                b.v += p * b.inv_mass;
                b.w += b.inv_i * point.r_b.cross(p);
            }
        }
    }

    /// Write accumulated impulses back into the contacts' manifolds
    pub fn store_impulses(&self, contacts: &mut SlotMap<ContactKey, Contact>) {
        for c in &self.constraints {
            let Some(contact) = contacts.get_mut(c.contact) else {
                continue;
            };
            for (mp, point) in contact.manifold.points.iter_mut().zip(&c.points[..c.point_count]) {
                mp.normal_impulse = point.normal_impulse;
                mp.tangent_impulse = point.tangent_impulse;
            }
        }
    }

    /// One pass of position correction
    ///
    /// Returns true when the deepest penetration is within tolerance.
    pub fn solve_position_constraints(&self, bodies: &mut [SolverBody], baumgarte: f32) -> bool {
        self.correct_positions(bodies, baumgarte, |_| true)
    }

    /// Position correction at a time-of-impact pose
    ///
    /// Only the two bodies of the impact pair move; every other island body
    /// is treated as fixed.
    pub fn solve_toi_position_constraints(
        &self,
        bodies: &mut [SolverBody],
        toi_a: Option<usize>,
        toi_b: Option<usize>,
    ) -> bool {
        self.correct_positions(bodies, TOI_BAUMGARTE, |index| Some(index) == toi_a || Some(index) == toi_b)
    }

    fn correct_positions<F>(&self, bodies: &mut [SolverBody], baumgarte: f32, movable: F) -> bool
    where
        F: Fn(usize) -> bool,
    {
        let mut min_separation = 0.0_f32;

        for c in &self.constraints {
            let (a, b) = pair_mut(bodies, c.index_a, c.index_b);
            let (m_a, i_a) = if movable(c.index_a) { (a.inv_mass, a.inv_i) } else { (0.0, 0.0) };
            let (m_b, i_b) = if movable(c.index_b) { (b.inv_mass, b.inv_i) } else { (0.0, 0.0) };

            for i in 0..c.point_count {
                let (normal, point, separation) = c.position_manifold(a, b, i);
                let r_a = point - a.c;
                let r_b = point - b.c;

                min_separation = min_separation.min(separation);

                // Prevent large corrections and allow slop
                let correction = (baumgarte * (separation + LINEAR_SLOP)).clamp(-MAX_LINEAR_CORRECTION, 0.0);

                let rn_a = r_a.cross(normal);
                let rn_b = r_b.cross(normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -correction / k } else { 0.0 };

                let p = normal * impulse;
                a.c -= p * m_a;
                a.a -= i_a * r_a.cross(p);
                b.c += p * m_b;
                b.a += i_b * r_b.cross(p);
            }
        }

        // Cannot expect the minimum separation to reach zero with slop
        min_separation >= -1.5 * LINEAR_SLOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::collide_polygons;
    use crate::shapes::PolygonShape;
    use rigid2d_math::Transform;

    const EPSILON: f32 = 0.0001;

    /// Static ground (index 0) and a unit-mass box (index 1) resting on it
    fn ground_and_box(box_y: f32, velocity: Vec2) -> (Vec<SolverBody>, Manifold) {
        let ground = PolygonShape::new_box(5.0, 0.5);
        let boxed = PolygonShape::new_box(0.5, 0.5);
        let xf_ground = Transform::IDENTITY;
        let xf_box = Transform::new(Vec2::new(0.0, box_y), 0.0);
        let manifold = collide_polygons(&ground, &xf_ground, &boxed, &xf_box);

        let bodies = vec![
            SolverBody::default(),
            SolverBody {
                c: Vec2::new(0.0, box_y),
                v: velocity,
                inv_mass: 1.0,
                inv_i: 6.0,
                ..Default::default()
            },
        ];
        (bodies, manifold)
    }

    fn input(manifold: &Manifold, restitution: f32) -> ContactSolverInput<'_> {
        ContactSolverInput {
            contact: ContactKey::default(),
            manifold,
            friction: 0.5,
            restitution,
            radius_a: crate::settings::POLYGON_RADIUS,
            radius_b: crate::settings::POLYGON_RADIUS,
            index_a: 0,
            index_b: 1,
        }
    }

    fn normal_impulses(solver: &ContactSolver) -> Vec<f32> {
        let c = &solver.constraints[0];
        c.points[..c.point_count].iter().map(|p| p.normal_impulse).collect()
    }

    #[test]
    fn test_normal_impulse_stops_approach() {
        let (mut bodies, manifold) = ground_and_box(1.0, Vec2::new(0.0, -0.5));
        assert_eq!(manifold.point_count, 2);

        let mut solver = ContactSolver::default();
        solver.initialize(&TimeStep::new(1.0 / 60.0, 8, 3), [input(&manifold, 0.0)], &bodies);
        for _ in 0..30 {
            solver.solve_velocity_constraints(&mut bodies);
        }

        assert!(bodies[1].v.y.abs() < 1e-3);
        assert!(bodies[1].w.abs() < 1e-3);
        assert!(normal_impulses(&solver).iter().all(|&i| i >= 0.0));
        let total: f32 = normal_impulses(&solver).iter().sum();
        assert!((total - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_separating_body_gets_no_impulse() {
        let (mut bodies, manifold) = ground_and_box(1.0, Vec2::new(0.0, 2.0));
        let mut solver = ContactSolver::default();
        solver.initialize(&TimeStep::new(1.0 / 60.0, 8, 3), [input(&manifold, 0.0)], &bodies);
        solver.solve_velocity_constraints(&mut bodies);
        assert!((bodies[1].v.y - 2.0).abs() < EPSILON);
        assert!(normal_impulses(&solver).iter().all(|&i| i == 0.0));
    }

    #[test]
    fn test_restitution_bounces() {
        let (mut bodies, manifold) = ground_and_box(1.0, Vec2::new(0.0, -4.0));
        let mut solver = ContactSolver::default();
        solver.initialize(&TimeStep::new(1.0 / 60.0, 8, 3), [input(&manifold, 1.0)], &bodies);
        for _ in 0..30 {
            solver.solve_velocity_constraints(&mut bodies);
        }
        assert!((bodies[1].v.y - 4.0).abs() < 1e-2);
    }

    #[test]
    fn test_friction_limited_by_cone() {
        let (mut bodies, manifold) = ground_and_box(1.0, Vec2::new(3.0, -0.5));
        let mut solver = ContactSolver::default();
        solver.initialize(&TimeStep::new(1.0 / 60.0, 8, 3), [input(&manifold, 0.0)], &bodies);
        for _ in 0..30 {
            solver.solve_velocity_constraints(&mut bodies);
        }
        let c = &solver.constraints[0];
        for p in &c.points[..c.point_count] {
            assert!(p.tangent_impulse.abs() <= 0.5 * p.normal_impulse + 1e-3);
        }
        // Still sliding, slowed by at most mu * normal impulse
        assert!(bodies[1].v.x > 2.7);
        assert!(bodies[1].v.x < 3.0);
    }

    #[test]
    fn test_warm_start_is_idempotent() {
        let velocity = Vec2::new(0.0, -0.5);
        let (mut bodies, mut manifold) = ground_and_box(1.0, velocity);
        let step = TimeStep::new(1.0 / 60.0, 8, 3);

        // Converge once and keep the impulses in the manifold
        let mut solver = ContactSolver::default();
        solver.initialize(&step, [input(&manifold, 0.0)], &bodies);
        for _ in 0..100 {
            solver.solve_velocity_constraints(&mut bodies);
        }
        let converged = normal_impulses(&solver);
        let c = &solver.constraints[0];
        for (mp, p) in manifold.points.iter_mut().zip(&c.points[..c.point_count]) {
            mp.normal_impulse = p.normal_impulse;
            mp.tangent_impulse = p.tangent_impulse;
        }

        // Same approach velocity, warm started from the converged impulses
        let (mut bodies, _) = ground_and_box(1.0, velocity);
        let mut solver = ContactSolver::default();
        solver.initialize(&step, [input(&manifold, 0.0)], &bodies);
        solver.warm_start(&mut bodies);
        assert!(bodies[1].v.y.abs() < 1e-3);

        solver.solve_velocity_constraints(&mut bodies);
        for (before, after) in converged.iter().zip(normal_impulses(&solver)) {
            assert!((before - after).abs() < 1e-3);
        }
    }

    #[test]
    fn test_no_warm_start_zeroes_impulses() {
        let (bodies, mut manifold) = ground_and_box(1.0, Vec2::ZERO);
        manifold.points[0].normal_impulse = 5.0;
        let mut step = TimeStep::new(1.0 / 60.0, 8, 3);
        step.warm_starting = false;
        let mut solver = ContactSolver::default();
        solver.initialize(&step, [input(&manifold, 0.0)], &bodies);
        assert!(normal_impulses(&solver).iter().all(|&i| i == 0.0));
    }

    #[test]
    fn test_position_solver_pushes_out_penetration() {
        let (mut bodies, manifold) = ground_and_box(0.9, Vec2::ZERO);
        let mut solver = ContactSolver::default();
        solver.initialize(&TimeStep::new(1.0 / 60.0, 8, 3), [input(&manifold, 0.0)], &bodies);

        assert!(!solver.solve_position_constraints(&mut bodies, 0.2));
        let mut solved = false;
        for _ in 0..50 {
            if solver.solve_position_constraints(&mut bodies, 0.2) {
                solved = true;
                break;
            }
        }
        assert!(solved);
        assert!(bodies[1].c.y > 0.99);
        assert_eq!(bodies[0].c, Vec2::ZERO);
    }

    #[test]
    fn test_toi_position_solver_moves_only_impact_pair() {
        let (mut bodies, manifold) = ground_and_box(0.9, Vec2::ZERO);
        // Both bodies could move, but only the box is part of the impact
        bodies[0].inv_mass = 1.0;
        bodies[0].inv_i = 1.0;
        let mut solver = ContactSolver::default();
        solver.initialize(&TimeStep::new(1.0 / 60.0, 8, 3), [input(&manifold, 0.0)], &bodies);

        let mut unmoved = bodies.clone();
        assert!(!solver.solve_toi_position_constraints(&mut unmoved, None, None));
        assert_eq!(unmoved[1].c, bodies[1].c);

        for _ in 0..20 {
            if solver.solve_toi_position_constraints(&mut bodies, None, Some(1)) {
                break;
            }
        }
        assert!(bodies[1].c.y > 0.99);
        assert_eq!(bodies[0].c, Vec2::ZERO);
        assert_eq!(bodies[0].a, 0.0);
    }
}
