//! Collision shapes and bounding volumes
//!
//! Shapes are immutable geometry in body-local coordinates. A fixture owns
//! one shape and places it in the world through its body's transform.

use rigid2d_math::{Transform, Vec2};

use crate::error::PhysicsError;
use crate::settings::{EPSILON, MAX_POLYGON_VERTICES, POLYGON_RADIUS};

/// An axis-aligned bounding box
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    /// Lower corner
    pub min: Vec2,
    /// Upper corner
    pub max: Vec2,
}

impl Aabb {
    /// Create a new AABB from min and max corners
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a position with given half-extents
    pub fn from_center_half_extents(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Whether the bounds are sorted and finite
    pub fn is_valid(&self) -> bool {
        let d = self.max - self.min;
        d.x >= 0.0 && d.y >= 0.0 && self.min.is_finite() && self.max.is_finite()
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Get the half-extents
    pub fn half_extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    /// Perimeter, used as the tree's insertion cost
    pub fn perimeter(&self) -> f32 {
        let d = self.max - self.min;
        2.0 * (d.x + d.y)
    }

    /// Smallest AABB containing both boxes
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min_components(other.min),
            max: self.max.max_components(other.max),
        }
    }

    /// Grow every side by `margin`
    pub fn fattened(&self, margin: f32) -> Aabb {
        let r = Vec2::new(margin, margin);
        Aabb {
            min: self.min - r,
            max: self.max + r,
        }
    }

    /// Whether `other` lies entirely inside this box
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    /// Whether a point lies inside or on the box
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    /// Whether the two boxes overlap (touching counts)
    pub fn overlaps(&self, other: &Aabb) -> bool {
        let d1 = other.min - self.max;
        let d2 = self.min - other.max;
        !(d1.x > 0.0 || d1.y > 0.0 || d2.x > 0.0 || d2.y > 0.0)
    }
}

/// Ray segment `p1 + t * (p2 - p1)` for `t` in `[0, max_fraction]`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f32,
}

/// Hit reported by a ray cast
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayCastOutput {
    /// Surface normal at the hit, in world space
    pub normal: Vec2,
    /// Fraction along the input segment
    pub fraction: f32,
}

/// Mass properties of a shape
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MassData {
    pub mass: f32,
    /// Center of mass relative to the body origin
    pub center: Vec2,
    /// Rotational inertia about the body origin
    pub inertia: f32,
}

/// A circle with a local center and radius
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CircleShape {
    pub center: Vec2,
    pub radius: f32,
}

impl CircleShape {
    /// Create a circle at the body origin
    pub fn new(radius: f32) -> Self {
        Self {
            center: Vec2::ZERO,
            radius,
        }
    }

    /// Create a circle offset from the body origin
    pub fn with_center(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// A convex polygon with counter-clockwise winding
///
/// Edge `i` runs from `vertices[i]` to `vertices[i + 1]` and `normals[i]`
/// is its outward unit normal. The polygon carries a skin of
/// [`POLYGON_RADIUS`] used by the collision tolerances.
#[derive(Clone, Debug, PartialEq)]
pub struct PolygonShape {
    vertices: Vec<Vec2>,
    normals: Vec<Vec2>,
    centroid: Vec2,
    radius: f32,
}

impl PolygonShape {
    /// Build a polygon from a convex vertex loop
    ///
    /// Clockwise loops are reversed. Fails when there are fewer than 3 or
    /// more than [`MAX_POLYGON_VERTICES`] points, when an edge is
    /// degenerate, or when the loop is not strictly convex.
    pub fn new(points: &[Vec2]) -> Result<Self, PhysicsError> {
        let count = points.len();
        if !(3..=MAX_POLYGON_VERTICES).contains(&count) {
            return Err(PhysicsError::InvalidShape(format!(
                "polygon needs between 3 and {} vertices, got {}",
                MAX_POLYGON_VERTICES, count
            )));
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err("polygon vertices must be finite".into());
        }

        let mut vertices = points.to_vec();
        let signed_area: f32 = (0..count)
            .map(|i| vertices[i].cross(vertices[(i + 1) % count]))
            .sum::<f32>()
            * 0.5;
        if signed_area.abs() <= EPSILON {
            return Err("polygon has no area".into());
        }
        if signed_area < 0.0 {
            vertices.reverse();
        }

        let mut normals = Vec::with_capacity(count);
        for i in 0..count {
            let edge = vertices[(i + 1) % count] - vertices[i];
            if edge.length_squared() <= EPSILON * EPSILON {
                return Err(PhysicsError::InvalidShape(format!("edge {} is degenerate", i)));
            }
            normals.push(edge.cross_scalar(1.0).normalized());
        }

        for i in 0..count {
            let i2 = (i + 1) % count;
            let edge = vertices[i2] - vertices[i];
            for (j, v) in vertices.iter().enumerate() {
                if j == i || j == i2 {
                    continue;
                }
                if edge.cross(*v - vertices[i]) <= 0.0 {
                    return Err("polygon is not strictly convex".into());
                }
            }
        }

        let centroid = compute_centroid(&vertices);
        Ok(Self {
            vertices,
            normals,
            centroid,
            radius: POLYGON_RADIUS,
        })
    }

    /// Axis-aligned box centered on the body origin
    pub fn new_box(half_width: f32, half_height: f32) -> Self {
        let (hx, hy) = (half_width.abs(), half_height.abs());
        Self {
            vertices: vec![
                Vec2::new(-hx, -hy),
                Vec2::new(hx, -hy),
                Vec2::new(hx, hy),
                Vec2::new(-hx, hy),
            ],
            normals: vec![Vec2::new(0.0, -1.0), Vec2::X, Vec2::Y, Vec2::new(-1.0, 0.0)],
            centroid: Vec2::ZERO,
            radius: POLYGON_RADIUS,
        }
    }

    /// Box with a local center and rotation
    pub fn new_oriented_box(half_width: f32, half_height: f32, center: Vec2, angle: f32) -> Self {
        let mut shape = Self::new_box(half_width, half_height);
        let xf = Transform::new(center, angle);
        for v in &mut shape.vertices {
            *v = xf.apply(*v);
        }
        for n in &mut shape.normals {
            *n = xf.q.rotate(*n);
        }
        shape.centroid = center;
        shape
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn normals(&self) -> &[Vec2] {
        &self.normals
    }

    pub fn centroid(&self) -> Vec2 {
        self.centroid
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Skin radius
    pub fn radius(&self) -> f32 {
        self.radius
    }

    fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let p1 = xf.apply_inverse(input.p1);
        let p2 = xf.apply_inverse(input.p2);
        let d = p2 - p1;

        let mut lower = 0.0_f32;
        let mut upper = input.max_fraction;
        let mut index = None;

        for (i, (v, n)) in self.vertices.iter().zip(&self.normals).enumerate() {
            // p = p1 + t * d
            // dot(n, p - v) = 0
            let numerator = n.dot(*v - p1);
            let denominator = n.dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                // Entering this half-space
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                // Leaving this half-space
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            normal: xf.q.rotate(self.normals[i]),
            fraction: lower,
        })
    }
}

/// Area-weighted centroid of a counter-clockwise loop
fn compute_centroid(vertices: &[Vec2]) -> Vec2 {
    let s = vertices[0];
    let mut center = Vec2::ZERO;
    let mut area = 0.0;
    let inv3 = 1.0 / 3.0;
    for i in 0..vertices.len() {
        let e1 = vertices[i] - s;
        let e2 = vertices[(i + 1) % vertices.len()] - s;
        let triangle_area = 0.5 * e1.cross(e2);
        area += triangle_area;
        center += (e1 + e2) * (triangle_area * inv3);
    }
    if area > EPSILON {
        center * (1.0 / area) + s
    } else {
        s
    }
}

/// Closed set of collision geometries
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Circle(CircleShape),
    Polygon(PolygonShape),
}

impl Shape {
    /// Circle at the body origin
    pub fn circle(radius: f32) -> Self {
        Shape::Circle(CircleShape::new(radius))
    }

    /// Box centered at the body origin
    pub fn rect(half_width: f32, half_height: f32) -> Self {
        Shape::Polygon(PolygonShape::new_box(half_width, half_height))
    }

    /// Convex polygon from a vertex loop
    pub fn polygon(points: &[Vec2]) -> Result<Self, PhysicsError> {
        PolygonShape::new(points).map(Shape::Polygon)
    }

    /// Collision radius: the circle radius, or the polygon skin
    pub fn radius(&self) -> f32 {
        match self {
            Shape::Circle(c) => c.radius,
            Shape::Polygon(p) => p.radius,
        }
    }

    /// Tight world-space bounds under `xf`
    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        match self {
            Shape::Circle(circle) => {
                let p = xf.apply(circle.center);
                let r = Vec2::new(circle.radius, circle.radius);
                Aabb::new(p - r, p + r)
            }
            Shape::Polygon(poly) => {
                let first = xf.apply(poly.vertices[0]);
                let (min, max) = poly.vertices[1..]
                    .iter()
                    .map(|v| xf.apply(*v))
                    .fold((first, first), |(lo, hi), v| {
                        (lo.min_components(v), hi.max_components(v))
                    });
                Aabb::new(min, max).fattened(poly.radius)
            }
        }
    }

    /// Mass, centroid and inertia about the body origin for a density
    pub fn compute_mass(&self, density: f32) -> MassData {
        match self {
            Shape::Circle(circle) => {
                let mass = density * std::f32::consts::PI * circle.radius * circle.radius;
                MassData {
                    mass,
                    center: circle.center,
                    inertia: mass
                        * (0.5 * circle.radius * circle.radius
                            + circle.center.length_squared()),
                }
            }
            Shape::Polygon(poly) => {
                // Triangle fan from the first vertex; the reference point
                // only affects rounding.
                let s = poly.vertices[0];
                let inv3 = 1.0 / 3.0;
                let count = poly.vertices.len();
                let mut center = Vec2::ZERO;
                let mut area = 0.0;
                let mut inertia = 0.0;

                for i in 0..count {
                    let e1 = poly.vertices[i] - s;
                    let e2 = poly.vertices[(i + 1) % count] - s;
                    let d = e1.cross(e2);
                    let triangle_area = 0.5 * d;
                    area += triangle_area;
                    center += (e1 + e2) * (triangle_area * inv3);

                    let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
                    let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
                    inertia += (0.25 * inv3 * d) * (intx2 + inty2);
                }

                let mass = density * area;
                if area <= EPSILON {
                    return MassData {
                        mass,
                        center: s,
                        inertia: 0.0,
                    };
                }
                let local = center * (1.0 / area);
                let world_center = local + s;
                // Shift inertia from the reference point to the body origin
                let inertia = density * inertia
                    + mass * (world_center.length_squared() - local.length_squared());
                MassData {
                    mass,
                    center: world_center,
                    inertia,
                }
            }
        }
    }

    /// Cast a ray against the shape placed at `xf`
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(circle) => {
                let position = xf.apply(circle.center);
                let s = input.p1 - position;
                let b = s.length_squared() - circle.radius * circle.radius;

                // Solve quadratic equation
                let r = input.p2 - input.p1;
                let c = s.dot(r);
                let rr = r.length_squared();
                let sigma = c * c - rr * b;

                if sigma < 0.0 || rr < EPSILON {
                    return None;
                }

                let a = -(c + sigma.sqrt());
                if 0.0 <= a && a <= input.max_fraction * rr {
                    let fraction = a / rr;
                    Some(RayCastOutput {
                        normal: (s + r * fraction).normalized(),
                        fraction,
                    })
                } else {
                    None
                }
            }
            Shape::Polygon(poly) => poly.ray_cast(input, xf),
        }
    }

    /// Whether a world point lies inside the shape
    pub fn test_point(&self, xf: &Transform, point: Vec2) -> bool {
        match self {
            Shape::Circle(circle) => {
                let center = xf.apply(circle.center);
                (point - center).length_squared() <= circle.radius * circle.radius
            }
            Shape::Polygon(poly) => {
                let local = xf.apply_inverse(point);
                poly.vertices
                    .iter()
                    .zip(&poly.normals)
                    .all(|(v, n)| n.dot(local - *v) <= 0.0)
            }
        }
    }

    /// Largest distance from `local_center` to the shape's core geometry
    ///
    /// Bounds how far any core point travels when the body rotates about its
    /// center of mass.
    pub fn sweep_radius(&self, local_center: Vec2) -> f32 {
        match self {
            Shape::Circle(circle) => (circle.center - local_center).length(),
            Shape::Polygon(poly) => poly
                .vertices
                .iter()
                .map(|v| (*v - local_center).length())
                .fold(0.0, f32::max),
        }
    }
}
