//! Distance between the core geometry of two shapes
//!
//! The core of a circle is its center point and the core of a polygon is its
//! vertex loop; the shape radii are layered on top by the caller. Distances
//! are exact for convex cores: negative values measure penetration depth
//! along the axis of least overlap.

use rigid2d_math::{Transform, Vec2};

use crate::shapes::{PolygonShape, Shape};

/// Result of a core distance query
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoreDistance {
    /// Signed distance between the cores
    pub distance: f32,
    /// Unit direction from A towards B
    pub normal: Vec2,
}

/// Signed distance between the cores of two placed shapes
pub fn core_distance(shape_a: &Shape, xf_a: &Transform, shape_b: &Shape, xf_b: &Transform) -> CoreDistance {
    match (shape_a, shape_b) {
        (Shape::Circle(a), Shape::Circle(b)) => {
            let p_a = xf_a.apply(a.center);
            let p_b = xf_b.apply(b.center);
            match (p_b - p_a).try_normalize() {
                Some((normal, distance)) => CoreDistance { distance, normal },
                None => CoreDistance {
                    distance: 0.0,
                    normal: Vec2::X,
                },
            }
        }
        (Shape::Polygon(a), Shape::Circle(b)) => point_to_polygon(a, xf_a, xf_b.apply(b.center)),
        (Shape::Circle(a), Shape::Polygon(b)) => {
            let out = point_to_polygon(b, xf_b, xf_a.apply(a.center));
            CoreDistance {
                distance: out.distance,
                normal: -out.normal,
            }
        }
        (Shape::Polygon(a), Shape::Polygon(b)) => polygon_to_polygon(a, xf_a, b, xf_b),
    }
}

/// Closest point to `p` on the segment `a`-`b`
fn closest_on_segment(a: Vec2, b: Vec2, p: Vec2) -> Vec2 {
    let e = b - a;
    let len_sqr = e.length_squared();
    if len_sqr <= f32::EPSILON {
        return a;
    }
    let t = ((p - a).dot(e) / len_sqr).clamp(0.0, 1.0);
    a + e * t
}

/// Signed distance from a polygon to a world point, normal towards the point
fn point_to_polygon(poly: &PolygonShape, xf: &Transform, point: Vec2) -> CoreDistance {
    let local = xf.apply_inverse(point);
    let vertices = poly.vertices();
    let normals = poly.normals();

    let mut max_separation = f32::MIN;
    let mut best = 0;
    for i in 0..vertices.len() {
        let s = normals[i].dot(local - vertices[i]);
        if s > max_separation {
            max_separation = s;
            best = i;
        }
    }

    if max_separation <= 0.0 {
        // Inside: least penetration through the best face
        return CoreDistance {
            distance: max_separation,
            normal: xf.q.rotate(normals[best]),
        };
    }

    let mut min_dist_sqr = f32::MAX;
    let mut closest = vertices[0];
    for i in 0..vertices.len() {
        let c = closest_on_segment(vertices[i], vertices[(i + 1) % vertices.len()], local);
        let d = c.distance_squared(local);
        if d < min_dist_sqr {
            min_dist_sqr = d;
            closest = c;
        }
    }

    let distance = min_dist_sqr.sqrt();
    let normal = if distance > f32::EPSILON {
        (local - closest) * (1.0 / distance)
    } else {
        normals[best]
    };
    CoreDistance {
        distance,
        normal: xf.q.rotate(normal),
    }
}

/// Largest separation of `poly2`'s vertices from one of `poly1`'s faces
fn max_face_separation(
    poly1: &PolygonShape,
    xf1: &Transform,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> (f32, Vec2) {
    let mut best = f32::MIN;
    let mut best_normal = Vec2::X;
    for (n, v) in poly1.normals().iter().zip(poly1.vertices()) {
        let n = xf1.q.rotate(*n);
        let v = xf1.apply(*v);
        let s = poly2
            .vertices()
            .iter()
            .map(|v2| n.dot(xf2.apply(*v2) - v))
            .fold(f32::MAX, f32::min);
        if s > best {
            best = s;
            best_normal = n;
        }
    }
    (best, best_normal)
}

fn polygon_to_polygon(
    poly_a: &PolygonShape,
    xf_a: &Transform,
    poly_b: &PolygonShape,
    xf_b: &Transform,
) -> CoreDistance {
    let (sep_a, normal_a) = max_face_separation(poly_a, xf_a, poly_b, xf_b);
    let (sep_b, normal_b) = max_face_separation(poly_b, xf_b, poly_a, xf_a);

    if sep_a <= 0.0 && sep_b <= 0.0 {
        // Overlapping cores
        return if sep_a >= sep_b {
            CoreDistance {
                distance: sep_a,
                normal: normal_a,
            }
        } else {
            CoreDistance {
                distance: sep_b,
                normal: -normal_b,
            }
        };
    }

    // Separated convex polygons: the closest pair is a vertex of one
    // against an edge of the other.
    let mut best = CoreDistance {
        distance: f32::MAX,
        normal: Vec2::X,
    };
    for v in poly_b.vertices() {
        let out = point_to_polygon(poly_a, xf_a, xf_b.apply(*v));
        if out.distance < best.distance {
            best = out;
        }
    }
    for v in poly_a.vertices() {
        let out = point_to_polygon(poly_b, xf_b, xf_a.apply(*v));
        if out.distance < best.distance {
            best = CoreDistance {
                distance: out.distance,
                normal: -out.normal,
            };
        }
    }
    best
}
