//! Narrow-phase manifold generation for circles and polygons.
//!
//! Every routine works in the local frames of the two shapes and returns a
//! [`Manifold`] with `point_count == 0` when the shapes are apart. Callers pass
//! shapes in canonical order (polygon before circle).

use super::manifold::{ContactFeature, ContactFeatureType, Manifold, ManifoldType};
use crate::common::settings::{EPSILON, MAX_MANIFOLD_POINTS};
use crate::math::{Transform, Vec2};
use crate::shapes::{Circle, Polygon};

/// Reference-face hysteresis: prefer the first polygon's axis unless the other is clearly better.
pub(crate) const RELATIVE_TOLERANCE: f64 = 0.98;
pub(crate) const ABSOLUTE_TOLERANCE: f64 = 0.001;

/// A vertex of an incident edge together with the features that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipVertex {
    pub v: Vec2,
    pub id: ContactFeature,
}

/// Sutherland-Hodgman clip of a segment against the half-plane `dot(normal, v) <= offset`.
///
/// Returns the clipped points and how many are valid. A point created by the clip is
/// tagged as vertex `vertex_index_a` of the reference shape hitting the incident face.
pub fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: Vec2,
    offset: f64,
    vertex_index_a: usize,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut num_out = 0;

    // Distance of end points to the line.
    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    // Points behind the plane are kept.
    if distance0 <= 0.0 {
        v_out[num_out] = v_in[0];
        num_out += 1;
    }
    if distance1 <= 0.0 {
        v_out[num_out] = v_in[1];
        num_out += 1;
    }

    // The points straddle the plane.
    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        v_out[num_out] = ClipVertex {
            v: v_in[0].v + (v_in[1].v - v_in[0].v) * interp,
            id: ContactFeature::new(
                vertex_index_a,
                ContactFeatureType::Vertex,
                v_in[0].id.index_b as usize,
                ContactFeatureType::Face,
            ),
        };
        num_out += 1;
    }

    (v_out, num_out)
}

/// Circle against circle.
pub fn collide_circles(
    circle_a: &Circle,
    xf_a: &Transform,
    circle_b: &Circle,
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

    manifold.kind = ManifoldType::Circles;
    manifold.local_point = circle_a.center;
    manifold.local_normal = Vec2::ZERO;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.center;
    manifold.points[0].id = ContactFeature::default();
    manifold
}

/// Polygon against circle. The circle center is classified into the face region of the
/// closest face or the vertex region of either end point.
pub fn collide_polygon_and_circle(
    polygon_a: &Polygon,
    xf_a: &Transform,
    circle_b: &Circle,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle position in the frame of the polygon.
    let c = xf_b.apply(circle_b.center);
    let c_local = xf_a.apply_inverse(c);

    // Find the min separating edge.
    let mut normal_index = 0;
    let mut separation = f64::MIN;
    let radius = polygon_a.radius + circle_b.radius;
    let vertices = polygon_a.vertices();
    let normals = polygon_a.normals();
    let count = vertices.len();

    for i in 0..count {
        let s = normals[i].dot(c_local - vertices[i]);
        if s > radius {
            // Early out.
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = vertices[normal_index];
    let v2 = vertices[(normal_index + 1) % count];

    manifold.point_count = 1;
    manifold.kind = ManifoldType::FaceA;
    manifold.points[0].local_point = circle_b.center;
    manifold.points[0].id = ContactFeature::default();

    // Center is inside the polygon.
    if separation < EPSILON {
        manifold.local_normal = normals[normal_index];
        manifold.local_point = (v1 + v2) * 0.5;
        return manifold;
    }

    // Barycentric coordinates along the face.
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);

    if u1 <= 0.0 {
        if c_local.distance_squared(v1) > radius * radius {
            return Manifold::default();
        }
        manifold.local_normal = (c_local - v1).normalize();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > radius * radius {
            return Manifold::default();
        }
        manifold.local_normal = (c_local - v2).normalize();
        manifold.local_point = v2;
    } else {
        let face_center = (v1 + v2) * 0.5;
        let face_separation = (c_local - face_center).dot(normals[normal_index]);
        if face_separation > radius {
            return Manifold::default();
        }
        manifold.local_normal = normals[normal_index];
        manifold.local_point = face_center;
    }

    manifold
}

/// Separation between the polygons along face normal `edge1` of `poly1`.
fn edge_separation(
    poly1: &Polygon,
    xf1: &Transform,
    edge1: usize,
    poly2: &Polygon,
    xf2: &Transform,
) -> f64 {
    // Normal of poly1's face in world and in poly2's frame.
    let normal1_world = xf1.rotation.apply(poly1.normals()[edge1]);
    let normal1 = xf2.rotation.apply_inverse(normal1_world);

    // Support vertex on poly2 for -normal.
    let mut index = 0;
    let mut min_dot = f64::MAX;
    for (i, v) in poly2.vertices().iter().enumerate() {
        let dot = v.dot(normal1);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let v1 = xf1.apply(poly1.vertices()[edge1]);
    let v2 = xf2.apply(poly2.vertices()[index]);
    (v2 - v1).dot(normal1_world)
}

/// Largest separation of `poly2` along the face normals of `poly1`.
///
/// Starts from the face most aligned with the centroid offset and hill-climbs to
/// neighbouring faces while the separation improves. Returns `(face, separation)`.
pub(crate) fn find_max_separation(
    poly1: &Polygon,
    xf1: &Transform,
    poly2: &Polygon,
    xf2: &Transform,
) -> (usize, f64) {
    let count1 = poly1.vertex_count();

    // Vector from the centroid of poly1 to the centroid of poly2, in poly1's frame.
    let d = xf2.apply(poly2.centroid()) - xf1.apply(poly1.centroid());
    let d_local1 = xf1.rotation.apply_inverse(d);

    let mut edge = 0;
    let mut max_dot = f64::MIN;
    for (i, n) in poly1.normals().iter().enumerate() {
        let dot = n.dot(d_local1);
        if dot > max_dot {
            max_dot = dot;
            edge = i;
        }
    }

    let s = edge_separation(poly1, xf1, edge, poly2, xf2);

    let prev_edge = if edge == 0 { count1 - 1 } else { edge - 1 };
    let s_prev = edge_separation(poly1, xf1, prev_edge, poly2, xf2);

    let next_edge = if edge + 1 < count1 { edge + 1 } else { 0 };
    let s_next = edge_separation(poly1, xf1, next_edge, poly2, xf2);

    // Pick the search direction.
    let (mut best_edge, mut best_separation, forward) = if s_prev > s && s_prev > s_next {
        (prev_edge, s_prev, false)
    } else if s_next > s {
        (next_edge, s_next, true)
    } else {
        return (edge, s);
    };

    // Local search for the best edge normal.
    loop {
        let candidate = if forward {
            if best_edge + 1 < count1 {
                best_edge + 1
            } else {
                0
            }
        } else if best_edge == 0 {
            count1 - 1
        } else {
            best_edge - 1
        };

        let s = edge_separation(poly1, xf1, candidate, poly2, xf2);
        if s > best_separation {
            best_edge = candidate;
            best_separation = s;
        } else {
            break;
        }
    }

    (best_edge, best_separation)
}

/// The edge of `poly2` most anti-parallel to face `edge1` of `poly1`, in world space.
fn find_incident_edge(
    poly1: &Polygon,
    xf1: &Transform,
    edge1: usize,
    poly2: &Polygon,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    debug_assert!(edge1 < poly1.vertex_count());

    // Reference normal in poly2's frame.
    let normal1 = xf2
        .rotation
        .apply_inverse(xf1.rotation.apply(poly1.normals()[edge1]));

    let mut index = 0;
    let mut min_dot = f64::MAX;
    for (i, n) in poly2.normals().iter().enumerate() {
        let dot = normal1.dot(*n);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = if i1 + 1 < poly2.vertex_count() { i1 + 1 } else { 0 };

    [
        ClipVertex {
            v: xf2.apply(poly2.vertices()[i1]),
            id: ContactFeature::new(edge1, ContactFeatureType::Face, i1, ContactFeatureType::Vertex),
        },
        ClipVertex {
            v: xf2.apply(poly2.vertices()[i2]),
            id: ContactFeature::new(edge1, ContactFeatureType::Face, i2, ContactFeatureType::Vertex),
        },
    ]
}

/// Polygon against polygon using the separating axis test and reference-face clipping.
///
/// The reference face is the face with maximal separation, with a bias towards A to
/// keep the normal stable from frame to frame. The incident edge is clipped against
/// the side planes of the reference face, giving up to two points.
pub fn collide_polygons(
    poly_a: &Polygon,
    xf_a: &Transform,
    poly_b: &Polygon,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    let (poly1, xf1, poly2, xf2, edge1, flip) =
        if separation_b > RELATIVE_TOLERANCE * separation_a + ABSOLUTE_TOLERANCE {
            manifold.kind = ManifoldType::FaceB;
            (poly_b, xf_b, poly_a, xf_a, edge_b, true)
        } else {
            manifold.kind = ManifoldType::FaceA;
            (poly_a, xf_a, poly_b, xf_b, edge_a, false)
        };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.vertex_count();
    let iv1 = edge1;
    let iv2 = if edge1 + 1 < count1 { edge1 + 1 } else { 0 };

    let mut v11 = poly1.vertices()[iv1];
    let mut v12 = poly1.vertices()[iv2];

    let local_tangent = (v12 - v11).normalize();
    let local_normal = local_tangent.cross_scalar(1.0);
    let plane_point = (v11 + v12) * 0.5;

    let tangent = xf1.rotation.apply(local_tangent);
    let normal = tangent.cross_scalar(1.0);

    v11 = xf1.apply(v11);
    v12 = xf1.apply(v12);

    // Face offset.
    let front_offset = normal.dot(v11);

    // Side offsets, extended by polytope skin thickness.
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    // Clip incident edge against extruded edge1 side edges.
    let (clip_points1, np) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1);
    if np < MAX_MANIFOLD_POINTS {
        return Manifold::default();
    }

    let (clip_points2, np) = clip_segment_to_line(&clip_points1, tangent, side_offset2, iv2);
    if np < MAX_MANIFOLD_POINTS {
        return Manifold::default();
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for clip in clip_points2.iter().take(MAX_MANIFOLD_POINTS) {
        let separation = normal.dot(clip.v) - front_offset;
        if separation <= total_radius {
            let cp = &mut manifold.points[point_count];
            cp.local_point = xf2.apply_inverse(clip.v);
            cp.id = if flip { clip.id.swapped() } else { clip.id };
            point_count += 1;
        }
    }

    manifold.point_count = point_count;
    manifold
}
