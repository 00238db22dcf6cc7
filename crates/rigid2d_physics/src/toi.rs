//! Time of impact by conservative advancement
//!
//! Finds the first time in a sweep interval at which the cores of two
//! moving shapes come within a target distance. The target leaves some
//! overlap of the shape radii so the narrow phase produces contact points
//! at the returned pose.

use log::trace;
use rigid2d_math::{Sweep, Vec2};

use crate::distance::core_distance;
use crate::settings::{EPSILON, LINEAR_SLOP, MAX_TOI_ITERATIONS};
use crate::shapes::Shape;

/// Shapes and sweeps to test
pub struct ToiInput<'a> {
    pub shape_a: &'a Shape,
    pub sweep_a: Sweep,
    pub shape_b: &'a Shape,
    pub sweep_b: Sweep,
    /// Upper bound of the sweep parameter to search
    pub t_max: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToiState {
    /// Iteration cap reached before convergence
    Failed,
    /// Already within the target distance at the start
    Overlapped,
    /// Reached the target distance at `t`
    Touching,
    /// Never reached the target distance before `t_max`
    Separated,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToiOutput {
    pub state: ToiState,
    /// Sweep parameter in `[0, t_max]`
    pub t: f32,
}

/// Conservative advancement between two sweeps
///
/// At each iteration the core distance `d` and its normal bound how fast
/// the shapes can approach: relative translation along the normal plus
/// the rotational speed of the farthest core point. Advancing by
/// `(d - target) / bound` can never skip past the target.
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    let total_radius = input.shape_a.radius() + input.shape_b.radius();
    let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;

    let sweep_a = &input.sweep_a;
    let sweep_b = &input.sweep_b;
    let r_a = input.shape_a.sweep_radius(sweep_a.local_center);
    let r_b = input.shape_b.sweep_radius(sweep_b.local_center);

    let d_a: Vec2 = sweep_a.c - sweep_a.c0;
    let d_b: Vec2 = sweep_b.c - sweep_b.c0;
    let w_a = (sweep_a.a - sweep_a.a0).abs();
    let w_b = (sweep_b.a - sweep_b.a0).abs();
    let angular_bound = w_a * r_a + w_b * r_b;

    let mut t = 0.0_f32;
    for iteration in 0..MAX_TOI_ITERATIONS {
        let xf_a = sweep_a.get_transform(t);
        let xf_b = sweep_b.get_transform(t);
        let out = core_distance(input.shape_a, &xf_a, input.shape_b, &xf_b);

        if out.distance <= target + tolerance {
            let state = if iteration == 0 {
                ToiState::Overlapped
            } else {
                ToiState::Touching
            };
            trace!("toi {:?} at t={} after {} iterations", state, t, iteration);
            return ToiOutput { state, t };
        }

        let bound = out.normal.dot(d_a - d_b) + angular_bound;
        if bound <= EPSILON {
            return ToiOutput {
                state: ToiState::Separated,
                t: input.t_max,
            };
        }

        t += (out.distance - target) / bound;
        if t >= input.t_max {
            return ToiOutput {
                state: ToiState::Separated,
                t: input.t_max,
            };
        }
    }

    ToiOutput {
        state: ToiState::Failed,
        t,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_sweep(from: Vec2, to: Vec2) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0: from,
            c: to,
            a0: 0.0,
            a: 0.0,
            alpha0: 0.0,
        }
    }

    #[test]
    fn test_bullet_hits_thin_wall() {
        let ball = Shape::circle(0.1);
        let wall = Shape::rect(0.05, 2.0);
        let input = ToiInput {
            shape_a: &ball,
            sweep_a: linear_sweep(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)),
            shape_b: &wall,
            sweep_b: linear_sweep(Vec2::ZERO, Vec2::ZERO),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);

        // Stops just short of the wall face, leaving some overlap of the skins
        let x = -1.0 + 2.0 * out.t;
        assert!(x < -0.05);
        assert!(x > -0.05 - 0.1 - 0.01 - 0.01);
    }

    #[test]
    fn test_parallel_motion_is_separated() {
        let a = Shape::rect(0.5, 0.5);
        let input = ToiInput {
            shape_a: &a,
            sweep_a: linear_sweep(Vec2::ZERO, Vec2::new(5.0, 0.0)),
            shape_b: &a,
            sweep_b: linear_sweep(Vec2::new(0.0, 3.0), Vec2::new(5.0, 3.0)),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Separated);
        assert_eq!(out.t, 1.0);
    }

    #[test]
    fn test_already_touching_reports_zero() {
        let ball = Shape::circle(0.5);
        let input = ToiInput {
            shape_a: &ball,
            sweep_a: linear_sweep(Vec2::ZERO, Vec2::new(1.0, 0.0)),
            shape_b: &ball,
            sweep_b: linear_sweep(Vec2::new(0.9, 0.0), Vec2::new(0.9, 0.0)),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Overlapped);
        assert_eq!(out.t, 0.0);
    }

    #[test]
    fn test_rotating_bar_sweeps_into_point() {
        let bar = Shape::rect(2.0, 0.05);
        let ball = Shape::circle(0.05);
        let mut spin = linear_sweep(Vec2::ZERO, Vec2::ZERO);
        spin.a = std::f32::consts::PI;
        let input = ToiInput {
            shape_a: &bar,
            sweep_a: spin,
            shape_b: &ball,
            sweep_b: linear_sweep(Vec2::new(0.0, 1.5), Vec2::new(0.0, 1.5)),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);
        // The bar is vertical at half a turn
        assert!(out.t > 0.3 && out.t < 0.55);
    }
}
