//! Narrow-phase collision: filtering and contact manifolds
//!
//! Manifolds are stored in local coordinates of the two shapes so they stay
//! valid while the bodies move a little; [`WorldManifold`] recovers world
//! points and separations for a given pair of transforms.

use bitflags::bitflags;

use crate::settings::{EPSILON, MAX_MANIFOLD_POINTS};
use crate::shapes::{CircleShape, PolygonShape};
use rigid2d_math::{Transform, Vec2};

bitflags! {
    /// Collision layers for filtering which fixtures can collide
    ///
    /// Each layer is a bit in a 32-bit mask. Fixtures can belong to multiple
    /// layers and can define which layers they collide with via a mask.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct CollisionLayer: u32 {
        /// Default layer for most objects
        const DEFAULT = 1 << 0;
        /// Static world geometry (ground, walls)
        const STATIC = 1 << 1;
        /// Small dynamic clutter
        const DEBRIS = 1 << 2;
        /// Fast projectiles
        const BULLET = 1 << 3;
        /// Overlap-only trigger volumes
        const SENSOR = 1 << 4;
        /// All layers (collide with everything)
        const ALL = 0xFFFFFFFF;
    }
}

/// Collision filter determining what a fixture collides with
///
/// Two fixtures A and B collide if:
/// - they share a non-zero group: positive groups always collide,
///   negative groups never do;
/// - otherwise `(A.layer & B.mask) != 0` and `(B.layer & A.mask) != 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollisionFilter {
    /// Which layer(s) this fixture belongs to
    pub layer: CollisionLayer,
    /// Which layer(s) this fixture can collide with
    pub mask: CollisionLayer,
    /// Group override; zero means no group
    pub group: i16,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            layer: CollisionLayer::DEFAULT,
            mask: CollisionLayer::ALL,
            group: 0,
        }
    }
}

impl CollisionFilter {
    /// Create a new collision filter with specified layer and mask
    pub fn new(layer: CollisionLayer, mask: CollisionLayer) -> Self {
        Self {
            layer,
            mask,
            group: 0,
        }
    }

    /// Same filter with a group index
    pub fn with_group(mut self, group: i16) -> Self {
        self.group = group;
        self
    }

    /// Check if this filter allows collision with another filter
    pub fn should_collide(&self, other: &Self) -> bool {
        if self.group == other.group && self.group != 0 {
            return self.group > 0;
        }
        self.layer.intersects(other.mask) && other.layer.intersects(self.mask)
    }

    /// Filter for static world geometry
    pub fn static_world() -> Self {
        Self::new(CollisionLayer::STATIC, CollisionLayer::ALL)
    }

    /// Filter for debris that ignores other debris
    pub fn debris() -> Self {
        Self::new(
            CollisionLayer::DEBRIS,
            CollisionLayer::ALL & !CollisionLayer::DEBRIS,
        )
    }
}

/// Which part of a shape a contact point came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FeatureType {
    #[default]
    Vertex,
    Face,
}

/// Persistent identity of a contact point across steps
///
/// Built from the features of the reference and incident shapes so the
/// solver can match points between steps and reuse their impulses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ContactId {
    pub index_a: u8,
    pub index_b: u8,
    pub type_a: FeatureType,
    pub type_b: FeatureType,
}

impl ContactId {
    fn swapped(self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

/// A contact point with its warm-starting impulses
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ManifoldPoint {
    /// Meaning depends on the manifold type:
    /// circles: center of circle B in B's frame;
    /// face A: clip point in B's frame;
    /// face B: clip point in A's frame
    pub local_point: Vec2,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    pub id: ContactId,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ManifoldType {
    #[default]
    Circles,
    FaceA,
    FaceB,
}

/// Up to two contact points between a pair of shapes
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Manifold {
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    /// Unused for circles; reference face normal otherwise
    pub local_normal: Vec2,
    /// Circles: center of circle A; faces: center of the reference face
    pub local_point: Vec2,
    pub manifold_type: ManifoldType,
    pub point_count: usize,
}

impl Manifold {
    /// Active contact points
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    /// The same contact seen with the shapes swapped
    pub fn flipped(&self) -> Manifold {
        let mut out = *self;
        match self.manifold_type {
            ManifoldType::Circles => {
                if self.point_count > 0 {
                    out.local_point = self.points[0].local_point;
                    out.points[0].local_point = self.local_point;
                }
            }
            ManifoldType::FaceA => out.manifold_type = ManifoldType::FaceB,
            ManifoldType::FaceB => out.manifold_type = ManifoldType::FaceA,
        }
        for p in out.points.iter_mut().take(self.point_count) {
            p.id = p.id.swapped();
        }
        out
    }
}

/// World-space view of a manifold
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WorldManifold {
    /// Normal pointing from A to B
    pub normal: Vec2,
    /// Contact points, midway between the two surfaces
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// Negative when overlapping
    pub separations: [f32; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    pub fn new(
        manifold: &Manifold,
        xf_a: &Transform,
        radius_a: f32,
        xf_b: &Transform,
        radius_b: f32,
    ) -> Self {
        let mut out = WorldManifold::default();
        if manifold.point_count == 0 {
            return out;
        }

        match manifold.manifold_type {
            ManifoldType::Circles => {
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                let mut normal = Vec2::X;
                if point_a.distance_squared(point_b) > EPSILON * EPSILON {
                    normal = (point_b - point_a).normalized();
                }
                let c_a = point_a + normal * radius_a;
                let c_b = point_b - normal * radius_b;
                out.normal = normal;
                out.points[0] = (c_a + c_b) * 0.5;
                out.separations[0] = (c_b - c_a).dot(normal);
            }
            ManifoldType::FaceA => {
                let normal = xf_a.q.rotate(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_b.apply(manifold.points[i].local_point);
                    let c_a = clip_point
                        + normal * (radius_a - (clip_point - plane_point).dot(normal));
                    let c_b = clip_point - normal * radius_b;
                    out.points[i] = (c_a + c_b) * 0.5;
                    out.separations[i] = (c_b - c_a).dot(normal);
                }
                out.normal = normal;
            }
            ManifoldType::FaceB => {
                let normal = xf_b.q.rotate(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_a.apply(manifold.points[i].local_point);
                    let c_b = clip_point
                        + normal * (radius_b - (clip_point - plane_point).dot(normal));
                    let c_a = clip_point - normal * radius_a;
                    out.points[i] = (c_a + c_b) * 0.5;
                    out.separations[i] = (c_a - c_b).dot(normal);
                }
                // Ensure normal points from A to B
                out.normal = -normal;
            }
        }
        out
    }
}

/// Contact between two circles
///
/// No manifold when the centers are at least the radius sum apart.
pub fn collide_circles(
    circle_a: &CircleShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let p_a = xf_a.apply(circle_a.center);
    let p_b = xf_b.apply(circle_b.center);
    let dist_sqr = p_a.distance_squared(p_b);
    let radius = circle_a.radius + circle_b.radius;
    if dist_sqr >= radius * radius {
        return manifold;
    }

    manifold.manifold_type = ManifoldType::Circles;
    manifold.local_point = circle_a.center;
    manifold.local_normal = Vec2::ZERO;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.center;
    manifold.points[0].id = ContactId::default();
    manifold
}

/// Contact between a polygon (A) and a circle (B)
pub fn collide_polygon_and_circle(
    polygon_a: &PolygonShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle position in the frame of the polygon
    let c = xf_b.apply(circle_b.center);
    let c_local = xf_a.apply_inverse(c);

    // Find the min separating edge
    let radius = polygon_a.radius() + circle_b.radius;
    let vertices = polygon_a.vertices();
    let normals = polygon_a.normals();
    let mut normal_index = 0;
    let mut separation = f32::MIN;
    for i in 0..vertices.len() {
        let s = normals[i].dot(c_local - vertices[i]);
        if s > radius {
            // Early out
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = vertices[normal_index];
    let v2 = vertices[(normal_index + 1) % vertices.len()];

    manifold.point_count = 1;
    manifold.manifold_type = ManifoldType::FaceA;
    manifold.points[0].local_point = circle_b.center;
    manifold.points[0].id = ContactId::default();

    // Center inside the polygon
    if separation < EPSILON {
        manifold.local_normal = normals[normal_index];
        manifold.local_point = (v1 + v2) * 0.5;
        return manifold;
    }

    // Vertex regions
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if c_local.distance_squared(v1) > radius * radius {
            return Manifold::default();
        }
        manifold.local_normal = (c_local - v1).normalized();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > radius * radius {
            return Manifold::default();
        }
        manifold.local_normal = (c_local - v2).normalized();
        manifold.local_point = v2;
    } else {
        let face_center = (v1 + v2) * 0.5;
        let s = (c_local - face_center).dot(normals[normal_index]);
        if s > radius {
            return Manifold::default();
        }
        manifold.local_normal = normals[normal_index];
        manifold.local_point = face_center;
    }
    manifold
}

#[derive(Clone, Copy, Debug)]
struct ClipVertex {
    v: Vec2,
    id: ContactId,
}

/// Edge of `poly1` with the largest separation from `poly2`
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Transform,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> (usize, f32) {
    let xf = xf2.mul_t(xf1);
    let mut best_index = 0;
    let mut max_separation = f32::MIN;
    for (i, (n1, v1)) in poly1.normals().iter().zip(poly1.vertices()).enumerate() {
        // Face of poly1 in the frame of poly2
        let n = xf.q.rotate(*n1);
        let v = xf.apply(*v1);
        let si = poly2
            .vertices()
            .iter()
            .map(|v2| n.dot(*v2 - v))
            .fold(f32::MAX, f32::min);
        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

/// Edge of `poly2` most anti-parallel to the reference edge
fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Transform,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    let normal1 = xf2.q.inv_rotate(xf1.q.rotate(poly1.normals()[edge1]));

    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, n2) in poly2.normals().iter().enumerate() {
        let dot = normal1.dot(*n2);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (i1 + 1) % poly2.vertex_count();
    let make = |i: usize| ClipVertex {
        v: xf2.apply(poly2.vertices()[i]),
        id: ContactId {
            index_a: edge1 as u8,
            index_b: i as u8,
            type_a: FeatureType::Face,
            type_b: FeatureType::Vertex,
        },
    };
    [make(i1), make(i2)]
}

/// Sutherland-Hodgman clipping of a segment against a half-plane
fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: usize,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = *v_in;
    let mut count = 0;

    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    // Points behind the plane are kept
    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    // The points straddle the plane
    if distance0 * distance1 < 0.0 && count < 2 {
        let interp = distance0 / (distance0 - distance1);
        v_out[count] = ClipVertex {
            v: v_in[0].v + (v_in[1].v - v_in[0].v) * interp,
            id: ContactId {
                index_a: vertex_index_a as u8,
                index_b: v_in[0].id.index_b,
                type_a: FeatureType::Vertex,
                type_b: FeatureType::Face,
            },
        };
        count += 1;
    }

    (v_out, count)
}

/// Contact between two polygons
///
/// Finds the axis of least penetration on either polygon, picks the
/// reference face (favoring A within a tolerance), clips the incident edge
/// against the reference face's side planes and keeps points within the
/// combined skin radius.
pub fn collide_polygons(
    poly_a: &PolygonShape,
    xf_a: &Transform,
    poly_b: &PolygonShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = poly_a.radius() + poly_b.radius();

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    const RELATIVE_TOL: f32 = 0.98;
    const ABSOLUTE_TOL: f32 = 0.001;

    let (poly1, xf1, poly2, xf2, edge1, flip) =
        if separation_b > RELATIVE_TOL * separation_a + ABSOLUTE_TOL {
            manifold.manifold_type = ManifoldType::FaceB;
            (poly_b, xf_b, poly_a, xf_a, edge_b, true)
        } else {
            manifold.manifold_type = ManifoldType::FaceA;
            (poly_a, xf_a, poly_b, xf_b, edge_a, false)
        };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.vertex_count();
    let iv1 = edge1;
    let iv2 = (edge1 + 1) % count1;

    let v11 = poly1.vertices()[iv1];
    let v12 = poly1.vertices()[iv2];

    let local_tangent = (v12 - v11).normalized();
    let local_normal = local_tangent.cross_scalar(1.0);
    let plane_point = (v11 + v12) * 0.5;

    let tangent = xf1.q.rotate(local_tangent);
    let normal = tangent.cross_scalar(1.0);

    let v11 = xf1.apply(v11);
    let v12 = xf1.apply(v12);

    // Face offset
    let front_offset = normal.dot(v11);

    // Side offsets, extended by the skin
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let (clip_points1, np) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1);
    if np < 2 {
        return manifold;
    }

    let (clip_points2, np) = clip_segment_to_line(&clip_points1, tangent, side_offset2, iv2);
    if np < 2 {
        return manifold;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for clip in clip_points2.iter() {
        let separation = normal.dot(clip.v) - front_offset;
        if separation <= total_radius {
            let cp = &mut manifold.points[point_count];
            cp.local_point = xf2.apply_inverse(clip.v);
            cp.id = if flip { clip.id.swapped() } else { clip.id };
            cp.normal_impulse = 0.0;
            cp.tangent_impulse = 0.0;
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
    manifold
}
