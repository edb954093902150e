use super::MassData;
use crate::collision::{RayCastInput, RayCastOutput, AABB};
use crate::common::settings::{EPSILON, MAX_POLYGON_VERTICES, POLYGON_RADIUS};
use crate::math::{Rot, Transform, Vec2};

/// A convex polygon in local space, wound counter-clockwise.
///
/// Two-vertex polygons are allowed and behave as a thin segment with zero mass.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub(crate) vertices: Vec<Vec2>,
    /// Outward unit normal of the edge starting at the vertex with the same index.
    pub(crate) normals: Vec<Vec2>,
    /// Area centroid, or the midpoint for a two-vertex polygon.
    pub(crate) centroid: Vec2,
    /// Skin thickness around the hull.
    pub radius: f64,
}

impl Polygon {
    /// Creates a polygon from counter-clockwise vertices.
    ///
    /// Panics if the vertex count is outside `2..=MAX_POLYGON_VERTICES`, if an edge is
    /// degenerate, or if the loop is not strictly convex with CCW winding.
    pub fn new(vertices: Vec<Vec2>) -> Self {
        let count = vertices.len();
        assert!(
            (2..=MAX_POLYGON_VERTICES).contains(&count),
            "Polygon must have between 2 and {MAX_POLYGON_VERTICES} vertices, got {count}"
        );

        let mut normals = Vec::with_capacity(count);
        for i in 0..count {
            let edge = vertices[(i + 1) % count] - vertices[i];
            assert!(
                edge.magnitude_squared() > EPSILON * EPSILON,
                "Polygon edge {i} is degenerate"
            );
            normals.push(Vec2::new(edge.y, -edge.x).normalize());
        }

        // Every other vertex must be strictly left of each edge.
        if count > 2 {
            for i in 0..count {
                let i2 = (i + 1) % count;
                let edge = vertices[i2] - vertices[i];
                for (j, v) in vertices.iter().enumerate() {
                    if j == i || j == i2 {
                        continue;
                    }
                    assert!(
                        edge.cross(*v - vertices[i]) > 0.0,
                        "Polygon must be convex and counter-clockwise"
                    );
                }
            }
        }

        let centroid = compute_centroid(&vertices);
        Polygon {
            vertices,
            normals,
            centroid,
            radius: POLYGON_RADIUS,
        }
    }

    /// Axis-aligned box centered on the body origin with half-extents `hx`, `hy`.
    pub fn new_box(hx: f64, hy: f64) -> Self {
        Self::new(vec![
            Vec2::new(-hx, -hy),
            Vec2::new(hx, -hy),
            Vec2::new(hx, hy),
            Vec2::new(-hx, hy),
        ])
    }

    /// Box with half-extents `hx`, `hy`, rotated by `angle` and moved to `center`.
    pub fn new_oriented_box(hx: f64, hy: f64, center: Vec2, angle: f64) -> Self {
        let xf = Transform::new(center, angle);
        Self::new(
            [
                Vec2::new(-hx, -hy),
                Vec2::new(hx, -hy),
                Vec2::new(hx, hy),
                Vec2::new(-hx, hy),
            ]
            .iter()
            .map(|v| xf.apply(*v))
            .collect(),
        )
    }

    /// Two-vertex polygon acting as a thin segment.
    pub fn new_edge(a: Vec2, b: Vec2) -> Self {
        Self::new(vec![a, b])
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

    /// Mass properties by triangle fan integration from the local origin.
    /// Inertia is about the local origin.
    pub fn compute_mass(&self, density: f64) -> MassData {
        let count = self.vertices.len();
        if count == 2 {
            return MassData {
                mass: 0.0,
                center: (self.vertices[0] + self.vertices[1]) * 0.5,
                inertia: 0.0,
                area: 0.0,
            };
        }

        const INV3: f64 = 1.0 / 3.0;
        let mut center = Vec2::ZERO;
        let mut area = 0.0;
        let mut inertia = 0.0;

        for i in 0..count {
            // Triangle (origin, e1, e2).
            let e1 = self.vertices[i];
            let e2 = self.vertices[(i + 1) % count];
            let d = e1.cross(e2);

            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += (e1 + e2) * (triangle_area * INV3);

            let int_x2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let int_y2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * INV3 * d) * (int_x2 + int_y2);
        }

        assert!(area > EPSILON, "Polygon area must be positive");
        center = center * (1.0 / area);

        MassData {
            mass: density * area,
            center,
            inertia: density * inertia,
            area,
        }
    }

    /// True if `p` (world space) is inside the hull. Only meaningful for convex input.
    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        let local = xf.apply_inverse(p);
        self.vertices
            .iter()
            .zip(&self.normals)
            .all(|(v, n)| n.dot(local - *v) <= 0.0)
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        // Work in the polygon frame.
        let p1 = xf.rotation.apply_inverse(input.p1 - xf.position);
        let p2 = xf.rotation.apply_inverse(input.p2 - xf.position);
        let d = p2 - p1;

        if self.vertices.len() == 2 {
            return ray_cast_segment(
                self.vertices[0],
                self.vertices[1],
                p1,
                d,
                input.max_fraction,
                xf.rotation,
            );
        }

        let mut lower = 0.0;
        let mut upper = input.max_fraction;
        let mut index = None;

        for (i, (v, n)) in self.vertices.iter().zip(&self.normals).enumerate() {
            // p = p1 + t * d; dot(n, p - v) = 0
            let numerator = n.dot(*v - p1);
            let denominator = n.dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                // Entering this half-space.
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                // Leaving this half-space.
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            normal: xf.rotation.apply(self.normals[i]),
            fraction: lower,
        })
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let first = xf.apply(self.vertices[0]);
        let (lower, upper) = self.vertices[1..]
            .iter()
            .map(|v| xf.apply(*v))
            .fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        AABB {
            min: lower,
            max: upper,
        }
        .expanded(self.radius)
    }
}

fn compute_centroid(vertices: &[Vec2]) -> Vec2 {
    if vertices.len() == 2 {
        return (vertices[0] + vertices[1]) * 0.5;
    }
    const INV3: f64 = 1.0 / 3.0;
    let mut c = Vec2::ZERO;
    let mut area = 0.0;
    let p_ref = Vec2::ZERO;
    for i in 0..vertices.len() {
        let p2 = vertices[i];
        let p3 = vertices[(i + 1) % vertices.len()];
        let triangle_area = 0.5 * (p2 - p_ref).cross(p3 - p_ref);
        area += triangle_area;
        c += (p_ref + p2 + p3) * (triangle_area * INV3);
    }
    assert!(area > EPSILON, "Polygon area must be positive");
    c * (1.0 / area)
}

/// Ray against the segment `v1..v2` in local space; the hit normal is rotated back to world.
pub(crate) fn ray_cast_segment(
    v1: Vec2,
    v2: Vec2,
    p1: Vec2,
    d: Vec2,
    max_fraction: f64,
    rotation: Rot,
) -> Option<RayCastOutput> {
    let e = v2 - v1;
    let normal = Vec2::new(e.y, -e.x).normalize();

    // q = p1 + t * d; dot(normal, q - v1) = 0
    let numerator = normal.dot(v1 - p1);
    let denominator = normal.dot(d);
    if denominator == 0.0 {
        return None;
    }

    let t = numerator / denominator;
    if t < 0.0 || max_fraction < t {
        return None;
    }

    let q = p1 + d * t;
    let rr = e.magnitude_squared();
    if rr == 0.0 {
        return None;
    }
    let s = (q - v1).dot(e) / rr;
    if !(0.0..=1.0).contains(&s) {
        return None;
    }

    let world_normal = rotation.apply(normal);
    Some(RayCastOutput {
        normal: if numerator > 0.0 { -world_normal } else { world_normal },
        fraction: t,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f64 = 1e-9;

    fn unit_square() -> Polygon {
        Polygon::new_box(0.5, 0.5)
    }

    #[test]
    fn test_polygon_new() {
        let polygon = Polygon::new(vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)]);
        assert_eq!(polygon.vertex_count(), 3);
        assert_relative_eq!(polygon.normals()[0].y, -1.0);
    }

    #[test]
    #[should_panic]
    fn test_polygon_new_too_few_vertices() {
        Polygon::new(vec![Vec2::new(0.0, 0.0)]);
    }

    #[test]
    #[should_panic]
    fn test_polygon_rejects_clockwise() {
        Polygon::new(vec![Vec2::new(0.0, 0.0), Vec2::new(0.0, 1.0), Vec2::new(1.0, 0.0)]);
    }

    #[test]
    #[should_panic]
    fn test_polygon_rejects_concave() {
        Polygon::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.5),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ]);
    }

    #[test]
    #[should_panic]
    fn test_polygon_rejects_degenerate_edge() {
        Polygon::new(vec![Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0)]);
    }

    #[test]
    fn test_polygon_mass_square() {
        let md = unit_square().compute_mass(3.0);
        assert!((md.area - 1.0).abs() < EPSILON);
        assert!((md.mass - 3.0).abs() < EPSILON);
        // I = m (w^2 + h^2) / 12
        assert!((md.inertia - 3.0 * 2.0 / 12.0).abs() < EPSILON);
        assert!(md.center.magnitude() < EPSILON);
    }

    #[test]
    fn test_polygon_mass_offset_inertia_about_origin() {
        let offset = Vec2::new(10.0, -5.0);
        let polygon = Polygon::new_oriented_box(0.5, 0.5, offset, 0.0);
        let md = polygon.compute_mass(1.0);
        assert!((md.center.x - 10.0).abs() < EPSILON);
        assert!((md.center.y + 5.0).abs() < EPSILON);
        let expected = 1.0 / 6.0 + offset.magnitude_squared();
        assert_relative_eq!(md.inertia, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_polygon_mass_matches_density_times_area() {
        let hexagon: Vec<Vec2> = (0..6)
            .map(|i| {
                let a = i as f64 * std::f64::consts::PI / 3.0;
                Vec2::new(2.0 + a.cos(), 1.0 + a.sin())
            })
            .collect();
        let polygon = Polygon::new(hexagon);
        let md = polygon.compute_mass(2.5);
        let area = 3.0 * 3f64.sqrt() / 2.0;
        assert_relative_eq!(md.area, area, epsilon = 1e-9);
        assert_relative_eq!(md.mass, 2.5 * area, epsilon = 1e-9);
        assert!(polygon.test_point(&Transform::identity(), md.center));
    }

    #[test]
    fn test_two_vertex_polygon_has_no_mass() {
        let seg = Polygon::new_edge(Vec2::new(-1.0, 0.0), Vec2::new(3.0, 0.0));
        let md = seg.compute_mass(1.0);
        assert_eq!(md.mass, 0.0);
        assert_eq!(md.center, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_polygon_test_point() {
        let square = unit_square();
        let xf = Transform::new(Vec2::new(5.0, 0.0), std::f64::consts::FRAC_PI_4);
        assert!(square.test_point(&xf, Vec2::new(5.0, 0.6)));
        assert!(!square.test_point(&xf, Vec2::new(5.6, 0.0) + Vec2::new(0.2, 0.2)));
    }

    #[test]
    fn test_polygon_ray_cast() {
        let square = unit_square();
        let xf = Transform::identity();
        let hit = square
            .ray_cast(&RayCastInput::new(Vec2::new(-2.0, 0.0), Vec2::new(2.0, 0.0)), &xf)
            .expect("ray crosses the square");
        assert_relative_eq!(hit.fraction, 1.5 / 4.0);
        assert_relative_eq!(hit.normal.x, -1.0);

        let miss = square.ray_cast(&RayCastInput::new(Vec2::new(-2.0, 1.0), Vec2::new(2.0, 1.0)), &xf);
        assert!(miss.is_none());
    }

    #[test]
    fn test_two_vertex_polygon_ray_cast() {
        let seg = Polygon::new_edge(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0));
        let hit = seg
            .ray_cast(
                &RayCastInput::new(Vec2::new(0.0, 2.0), Vec2::new(0.0, -2.0)),
                &Transform::identity(),
            )
            .expect("ray crosses the segment");
        assert_relative_eq!(hit.fraction, 0.5);
        // Normal faces the ray origin.
        assert_relative_eq!(hit.normal.y, 1.0);
    }

    #[test]
    fn test_polygon_aabb_includes_skin() {
        let aabb = unit_square().compute_aabb(&Transform::identity());
        assert_relative_eq!(aabb.max.x, 0.5 + POLYGON_RADIUS);
        assert_relative_eq!(aabb.min.y, -0.5 - POLYGON_RADIUS);
    }
}
