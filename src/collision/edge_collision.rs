//! Edge versus circle and edge versus polygon, with chain adjacency.
//!
//! Ghost vertices on the edge describe its neighbours in a chain. They restrict
//! which contact normals are admissible so bodies slide over the shared corners
//! instead of catching on them.

use super::detection::{clip_segment_to_line, ClipVertex, ABSOLUTE_TOLERANCE, RELATIVE_TOLERANCE};
use super::manifold::{ContactFeature, ContactFeatureType, Manifold, ManifoldType};
use crate::common::settings::{ANGULAR_SLOP, MAX_MANIFOLD_POINTS, MAX_POLYGON_VERTICES, POLYGON_RADIUS};
use crate::math::{Transform, Vec2};
use crate::shapes::{Circle, Edge, Polygon};

/// Edge against circle.
///
/// The circle center is classified into the vertex region of either end point or the
/// interior region. A vertex region owned by a neighbouring segment yields no contact,
/// so a circle rolling across a chain corner touches exactly one segment.
pub fn collide_edge_and_circle(
    edge_a: &Edge,
    xf_a: &Transform,
    circle_b: &Circle,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle in the frame of the edge.
    let q = xf_a.apply_inverse(xf_b.apply(circle_b.center));

    let a = edge_a.vertex1;
    let b = edge_a.vertex2;
    let e = b - a;

    // Barycentric coordinates.
    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let radius = edge_a.radius + circle_b.radius;

    // Vertex region A.
    if v <= 0.0 {
        if q.distance_squared(a) > radius * radius {
            return manifold;
        }

        // The circle belongs to the previous segment's interior.
        if edge_a.has_vertex0 {
            let a1 = edge_a.vertex0;
            let e1 = a - a1;
            if e1.dot(a - q) > 0.0 {
                return manifold;
            }
        }

        return vertex_manifold(a, 0, circle_b.center);
    }

    // Vertex region B.
    if u <= 0.0 {
        if q.distance_squared(b) > radius * radius {
            return manifold;
        }

        // The circle belongs to the next segment's interior.
        if edge_a.has_vertex3 {
            let b2 = edge_a.vertex3;
            let e2 = b2 - b;
            if e2.dot(q - b) > 0.0 {
                return manifold;
            }
        }

        return vertex_manifold(b, 1, circle_b.center);
    }

    // Interior region.
    let den = e.dot(e);
    debug_assert!(den > 0.0);
    let p = (a * u + b * v) * (1.0 / den);
    if q.distance_squared(p) > radius * radius {
        return manifold;
    }

    let mut n = Vec2::new(-e.y, e.x);
    if n.dot(q - a) < 0.0 {
        n = -n;
    }

    manifold.point_count = 1;
    manifold.kind = ManifoldType::FaceA;
    manifold.local_normal = n.normalize();
    manifold.local_point = a;
    manifold.points[0].local_point = circle_b.center;
    manifold.points[0].id =
        ContactFeature::new(0, ContactFeatureType::Face, 0, ContactFeatureType::Vertex);
    manifold
}

fn vertex_manifold(p: Vec2, index: usize, circle_center: Vec2) -> Manifold {
    let mut manifold = Manifold {
        point_count: 1,
        kind: ManifoldType::Circles,
        local_normal: Vec2::ZERO,
        local_point: p,
        ..Manifold::default()
    };
    manifold.points[0].local_point = circle_center;
    manifold.points[0].id =
        ContactFeature::new(index, ContactFeatureType::Vertex, 0, ContactFeatureType::Vertex);
    manifold
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisKind {
    Unknown,
    EdgeA,
    EdgeB,
}

#[derive(Debug, Clone, Copy)]
struct Axis {
    kind: AxisKind,
    index: usize,
    separation: f64,
}

impl Axis {
    const UNKNOWN: Axis = Axis {
        kind: AxisKind::Unknown,
        index: 0,
        separation: f64::MIN,
    };
}

/// Fixed-size copy of a convex hull in the edge's frame.
#[derive(Debug, Clone, Copy)]
struct HullProxy {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    normals: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
}

impl Default for HullProxy {
    fn default() -> Self {
        Self {
            vertices: [Vec2::ZERO; MAX_POLYGON_VERTICES],
            normals: [Vec2::ZERO; MAX_POLYGON_VERTICES],
            count: 0,
        }
    }
}

/// Reusable working memory for [`collide_edge_and_polygon`].
///
/// Owned by the caller (one per contact manager) so the routine runs without
/// allocating and without shared global state.
#[derive(Debug, Clone, Default)]
pub struct EpScratch {
    edge: HullProxy,
    polygon: HullProxy,
    v1: Vec2,
    v2: Vec2,
    normal: Vec2,
    // Admissible normal cones from the previous (limit1x) and next (limit2x) segments.
    limit11: Vec2,
    limit12: Vec2,
    limit21: Vec2,
    limit22: Vec2,
    radius: f64,
}

impl EpScratch {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_admissible(&self, n: Vec2) -> (bool, bool) {
        let valid1 = n.cross(self.limit11) >= -ANGULAR_SLOP && self.limit12.cross(n) >= -ANGULAR_SLOP;
        let valid2 = n.cross(self.limit21) >= -ANGULAR_SLOP && self.limit22.cross(n) >= -ANGULAR_SLOP;
        (valid1, valid2)
    }

    /// Builds the normal cones allowed by the neighbouring segments.
    fn compute_adjacency(&mut self, edge: &Edge, center_b: Vec2) {
        let (v0, v1, v2, v3) = (edge.vertex0, edge.vertex1, edge.vertex2, edge.vertex3);

        (self.limit11, self.limit12) = if edge.has_vertex0 {
            let n0 = Vec2::new((v1 - v0).y, -(v1 - v0).x).normalize();
            let n1 = Vec2::new((v2 - v1).y, -(v2 - v1).x).normalize();
            let convex = n0.cross(n1) >= 0.0;
            let front0 = n0.dot(center_b - v0) >= 0.0;
            let front1 = n1.dot(center_b - v1) >= 0.0;
            cone(convex, front0, front1, n1, n0)
        } else {
            (Vec2::ZERO, Vec2::ZERO)
        };

        (self.limit21, self.limit22) = if edge.has_vertex3 {
            let n1 = Vec2::new((v2 - v1).y, -(v2 - v1).x).normalize();
            let n2 = Vec2::new((v3 - v2).y, -(v3 - v2).x).normalize();
            let convex = n1.cross(n2) >= 0.0;
            let front1 = n1.dot(center_b - v1) >= 0.0;
            let front2 = n2.dot(center_b - v2) >= 0.0;
            cone(convex, front1, front2, n2, n1)
        } else {
            (Vec2::ZERO, Vec2::ZERO)
        };
    }

    /// Best admissible separation along the two faces of the edge.
    fn compute_edge_separation(&self) -> Axis {
        let mut best = Axis::UNKNOWN;
        for (i, n) in [self.normal, -self.normal].into_iter().enumerate() {
            let (valid1, valid2) = self.is_admissible(n);
            if !valid1 || !valid2 {
                continue;
            }

            let separation = self.polygon.vertices[..self.polygon.count]
                .iter()
                .map(|v| n.dot(*v - self.v1))
                .fold(f64::MAX, f64::min);

            let axis = Axis {
                kind: AxisKind::EdgeA,
                index: i,
                separation,
            };
            if separation > self.radius {
                return axis;
            }
            if separation > best.separation {
                best = axis;
            }
        }
        best
    }

    /// Best admissible separation along the polygon's face normals.
    fn compute_polygon_separation(&self) -> Axis {
        let mut axis = Axis::UNKNOWN;
        for i in 0..self.polygon.count {
            let n = -self.polygon.normals[i];

            let (valid1, valid2) = self.is_admissible(n);
            if !valid1 && !valid2 {
                continue;
            }

            let s1 = n.dot(self.polygon.vertices[i] - self.v1);
            let s2 = n.dot(self.polygon.vertices[i] - self.v2);
            let s = s1.min(s2);
            if s > axis.separation {
                axis = Axis {
                    kind: AxisKind::EdgeB,
                    index: i,
                    separation: s,
                };
            }
        }
        axis
    }
}

/// Limits of the admissible normal cone at a shared vertex.
fn cone(convex: bool, front_a: bool, front_b: bool, outer: Vec2, inner: Vec2) -> (Vec2, Vec2) {
    if convex {
        if front_a || front_b {
            (outer, inner)
        } else {
            (-outer, -inner)
        }
    } else if front_a && front_b {
        (inner, outer)
    } else {
        (-inner, -outer)
    }
}

/// Incident edge on `incident` for reference face `edge1` of `reference`.
fn find_incident_edge(reference: &HullProxy, edge1: usize, incident: &HullProxy) -> [ClipVertex; 2] {
    debug_assert!(edge1 < reference.count);
    let normal1 = reference.normals[edge1];

    let mut index = 0;
    let mut min_dot = f64::MAX;
    for i in 0..incident.count {
        let dot = normal1.dot(incident.normals[i]);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = if i1 + 1 < incident.count { i1 + 1 } else { 0 };
    [
        ClipVertex {
            v: incident.vertices[i1],
            id: ContactFeature::new(edge1, ContactFeatureType::Face, i1, ContactFeatureType::Vertex),
        },
        ClipVertex {
            v: incident.vertices[i2],
            id: ContactFeature::new(edge1, ContactFeatureType::Face, i2, ContactFeatureType::Vertex),
        },
    ]
}

/// Edge against polygon, taking chain adjacency into account.
///
/// Returns an empty manifold when no normal is admissible, which happens on the middle
/// segment of a tight zig-zag chain.
pub fn collide_edge_and_polygon(
    scratch: &mut EpScratch,
    edge_a: &Edge,
    xf_a: &Transform,
    polygon_b: &Polygon,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();
    let xf = xf_a.mul_t(*xf_b);

    // Edge geometry; the normal points outwards in CCW order.
    scratch.v1 = edge_a.vertex1;
    scratch.v2 = edge_a.vertex2;
    let e = scratch.v2 - scratch.v1;
    scratch.normal = Vec2::new(e.y, -e.x).normalize();

    scratch.edge.vertices[0] = scratch.v1;
    scratch.edge.vertices[1] = scratch.v2;
    scratch.edge.normals[0] = scratch.normal;
    scratch.edge.normals[1] = -scratch.normal;
    scratch.edge.count = 2;

    // Polygon in the edge's frame.
    let count = polygon_b.vertex_count();
    scratch.polygon.count = count;
    for i in 0..count {
        scratch.polygon.vertices[i] = xf.apply(polygon_b.vertices()[i]);
        scratch.polygon.normals[i] = xf.rotation.apply(polygon_b.normals()[i]);
    }
    let center_b = xf.apply(polygon_b.centroid());

    scratch.radius = 2.0 * POLYGON_RADIUS;
    scratch.compute_adjacency(edge_a, center_b);

    let edge_axis = scratch.compute_edge_separation();

    // No admissible normal: this segment must not collide.
    if edge_axis.kind == AxisKind::Unknown {
        return manifold;
    }
    if edge_axis.separation > scratch.radius {
        return manifold;
    }

    let polygon_axis = scratch.compute_polygon_separation();
    if polygon_axis.kind != AxisKind::Unknown && polygon_axis.separation > scratch.radius {
        return manifold;
    }

    // Hysteresis for jitter reduction.
    let primary_axis = if polygon_axis.kind == AxisKind::Unknown {
        edge_axis
    } else if polygon_axis.separation > RELATIVE_TOLERANCE * edge_axis.separation + ABSOLUTE_TOLERANCE
    {
        polygon_axis
    } else {
        edge_axis
    };

    let (reference, incident) = if primary_axis.kind == AxisKind::EdgeA {
        manifold.kind = ManifoldType::FaceA;
        (&scratch.edge, &scratch.polygon)
    } else {
        manifold.kind = ManifoldType::FaceB;
        (&scratch.polygon, &scratch.edge)
    };

    let edge1 = primary_axis.index;
    let incident_edge = find_incident_edge(reference, edge1, incident);

    let iv1 = edge1;
    let iv2 = if edge1 + 1 < reference.count { edge1 + 1 } else { 0 };

    let v11 = reference.vertices[iv1];
    let v12 = reference.vertices[iv2];

    let tangent = (v12 - v11).normalize();
    let normal = tangent.cross_scalar(1.0);
    let plane_point = (v11 + v12) * 0.5;

    // Face offset.
    let front_offset = normal.dot(v11);

    // Side offsets, extended by polytope skin thickness.
    let side_offset1 = -tangent.dot(v11) + scratch.radius;
    let side_offset2 = tangent.dot(v12) + scratch.radius;

    let (clip_points1, np) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1);
    if np < MAX_MANIFOLD_POINTS {
        return Manifold::default();
    }

    let (clip_points2, np) = clip_segment_to_line(&clip_points1, tangent, side_offset2, iv2);
    if np < MAX_MANIFOLD_POINTS {
        return Manifold::default();
    }

    if primary_axis.kind == AxisKind::EdgeA {
        manifold.local_normal = normal;
        manifold.local_point = plane_point;
    } else {
        manifold.local_normal = xf.rotation.apply_inverse(normal);
        manifold.local_point = xf.apply_inverse(plane_point);
    }

    let mut point_count = 0;
    for clip in clip_points2.iter().take(MAX_MANIFOLD_POINTS) {
        let separation = normal.dot(clip.v) - front_offset;
        if separation <= scratch.radius {
            let cp = &mut manifold.points[point_count];
            if primary_axis.kind == AxisKind::EdgeA {
                cp.local_point = xf.apply_inverse(clip.v);
                cp.id = clip.id;
            } else {
                cp.local_point = clip.v;
                cp.id = clip.id.swapped();
            }
            point_count += 1;
        }
    }

    manifold.point_count = point_count;
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::WorldManifold;
    use approx::assert_relative_eq;

    fn ground() -> Edge {
        Edge::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0))
    }

    #[test]
    fn test_edge_circle_interior() {
        let circle = Circle::new(0.5);
        let m = collide_edge_and_circle(
            &ground(),
            &Transform::identity(),
            &circle,
            &Transform::new(Vec2::new(1.0, 0.4), 0.0),
        );
        assert_eq!(m.point_count, 1);
        assert_eq!(m.kind, ManifoldType::FaceA);
        assert_relative_eq!(m.local_normal.y, 1.0);

        // The same from the other side flips the normal.
        let below = collide_edge_and_circle(
            &ground(),
            &Transform::identity(),
            &circle,
            &Transform::new(Vec2::new(1.0, -0.4), 0.0),
        );
        assert_relative_eq!(below.local_normal.y, -1.0);
    }

    #[test]
    fn test_edge_circle_vertex_regions() {
        let circle = Circle::new(0.5);
        let m = collide_edge_and_circle(
            &ground(),
            &Transform::identity(),
            &circle,
            &Transform::new(Vec2::new(5.3, 0.1), 0.0),
        );
        assert_eq!(m.point_count, 1);
        assert_eq!(m.kind, ManifoldType::Circles);
        assert_eq!(m.local_point, Vec2::new(5.0, 0.0));
        assert_eq!(m.points[0].id.index_a, 1);

        let apart = collide_edge_and_circle(
            &ground(),
            &Transform::identity(),
            &circle,
            &Transform::new(Vec2::new(6.0, 0.0), 0.0),
        );
        assert_eq!(apart.point_count, 0);
    }

    #[test]
    fn test_edge_circle_defers_to_neighbour() {
        // Next segment continues flat to the right: the corner belongs to it.
        let edge = ground().with_adjacency(None, Some(Vec2::new(10.0, 0.0)));
        let circle = Circle::new(0.5);
        let m = collide_edge_and_circle(
            &edge,
            &Transform::identity(),
            &circle,
            &Transform::new(Vec2::new(5.2, 0.4), 0.0),
        );
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_edge_polygon_box_resting_on_edge() {
        let mut scratch = EpScratch::new();
        let square = Polygon::new_box(0.5, 0.5);
        let xf_b = Transform::new(Vec2::new(0.0, 0.5), 0.0);
        let m = collide_edge_and_polygon(&mut scratch, &ground(), &Transform::identity(), &square, &xf_b);
        assert_eq!(m.point_count, 2);

        let wm = WorldManifold::new(&m, &Transform::identity(), POLYGON_RADIUS, &xf_b, square.radius);
        assert_relative_eq!(wm.normal.y, 1.0, epsilon = 1e-9);
        assert_relative_eq!(wm.normal.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_edge_polygon_separated() {
        let mut scratch = EpScratch::new();
        let square = Polygon::new_box(0.5, 0.5);
        let m = collide_edge_and_polygon(
            &mut scratch,
            &ground(),
            &Transform::identity(),
            &square,
            &Transform::new(Vec2::new(0.0, 1.0), 0.0),
        );
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_edge_polygon_ids_are_distinct() {
        let mut scratch = EpScratch::new();
        let square = Polygon::new_box(0.5, 0.5);
        let m = collide_edge_and_polygon(
            &mut scratch,
            &ground(),
            &Transform::identity(),
            &square,
            &Transform::new(Vec2::new(0.0, 0.49), 0.0),
        );
        assert_eq!(m.point_count, 2);
        assert_ne!(m.points[0].id.key(), m.points[1].id.key());
    }

    #[test]
    fn test_edge_polygon_inside_chain_corner() {
        // Flat chain: box straddling the joint between two segments.
        let left = Edge::new(Vec2::new(-2.0, 0.0), Vec2::new(0.0, 0.0))
            .with_adjacency(Some(Vec2::new(-4.0, 0.0)), Some(Vec2::new(2.0, 0.0)));
        let mut scratch = EpScratch::new();
        let square = Polygon::new_box(0.5, 0.5);
        let xf_b = Transform::new(Vec2::new(0.0, 0.49), 0.0);
        let m = collide_edge_and_polygon(&mut scratch, &left, &Transform::identity(), &square, &xf_b);
        assert!(m.point_count > 0);
        let wm = WorldManifold::new(&m, &Transform::identity(), POLYGON_RADIUS, &xf_b, square.radius);
        assert_relative_eq!(wm.normal.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_edge_polygon_zig_zag_middle_admits_no_normal() {
        // Middle segment of a zig-zag: convex corner on the left, concave on the right.
        let middle = Edge::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0))
            .with_adjacency(Some(Vec2::new(-1.0, 1.0)), Some(Vec2::new(2.0, -1.0)));
        let mut scratch = EpScratch::new();
        let square = Polygon::new_box(0.3, 0.3);
        let xf_b = Transform::new(Vec2::new(1.8, -0.3), 0.0);

        let m = collide_edge_and_polygon(&mut scratch, &middle, &Transform::identity(), &square, &xf_b);
        assert_eq!(m.point_count, 0);

        // The two corners leave opposite half-planes, so neither face normal fits both.
        let diagonal = 0.5f64.sqrt();
        assert_relative_eq!(scratch.limit11.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(scratch.limit11.y, -1.0, epsilon = 1e-12);
        assert_relative_eq!(scratch.limit12.x, -diagonal, epsilon = 1e-12);
        assert_relative_eq!(scratch.limit12.y, -diagonal, epsilon = 1e-12);
        assert_relative_eq!(scratch.limit21.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(scratch.limit21.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(scratch.limit22.x, diagonal, epsilon = 1e-12);
        assert_relative_eq!(scratch.limit22.y, diagonal, epsilon = 1e-12);

        assert_eq!(scratch.is_admissible(scratch.normal), (true, false));
        assert_eq!(scratch.is_admissible(-scratch.normal), (false, true));
        assert!(scratch.compute_edge_separation().kind == AxisKind::Unknown);
    }
}
