//! GJK closest points between convex proxies.

use crate::common::settings::{EPSILON, MAX_DISTANCE_ITERATIONS, MAX_POLYGON_VERTICES};
use crate::math::{Transform, Vec2};
use crate::shapes::Shape;

/// Convex vertex cloud plus skin radius, as seen by GJK.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceProxy {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    pub radius: f64,
}

impl DistanceProxy {
    /// Proxy for one child of a shape. Circles become a single point with a radius.
    pub fn new(shape: &Shape, child_index: usize) -> Self {
        let mut proxy = Self {
            vertices: [Vec2::ZERO; MAX_POLYGON_VERTICES],
            count: 0,
            radius: shape.radius(),
        };
        match shape {
            Shape::Circle(circle) => {
                proxy.vertices[0] = circle.center;
                proxy.count = 1;
            }
            Shape::Polygon(polygon) => {
                let vertices = polygon.vertices();
                proxy.vertices[..vertices.len()].copy_from_slice(vertices);
                proxy.count = vertices.len();
            }
            Shape::Edge(edge) => {
                proxy.vertices[0] = edge.vertex1;
                proxy.vertices[1] = edge.vertex2;
                proxy.count = 2;
            }
            Shape::Chain(chain) => {
                let edge = chain.child_edge(child_index);
                proxy.vertices[0] = edge.vertex1;
                proxy.vertices[1] = edge.vertex2;
                proxy.count = 2;
            }
        }
        proxy
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    pub fn vertex_count(&self) -> usize {
        self.count
    }

    pub fn vertex(&self, index: usize) -> Vec2 {
        debug_assert!(index < self.count);
        self.vertices[index]
    }

    /// Index of the vertex furthest along `d`.
    pub fn support(&self, d: Vec2) -> usize {
        let mut best_index = 0;
        let mut best_value = self.vertices[0].dot(d);
        for (i, v) in self.vertices().iter().enumerate().skip(1) {
            let value = v.dot(d);
            if value > best_value {
                best_index = i;
                best_value = value;
            }
        }
        best_index
    }
}

/// Warm start for repeated distance queries between the same pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimplexCache {
    /// Length or area of the last simplex, used to detect a stale cache.
    pub metric: f64,
    pub count: usize,
    pub index_a: [usize; 3],
    pub index_b: [usize; 3],
}

#[derive(Debug, Clone, Copy)]
pub struct DistanceInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    /// Account for the proxy radii in the result.
    pub use_radii: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceOutput {
    /// Closest point on A.
    pub point_a: Vec2,
    /// Closest point on B.
    pub point_b: Vec2,
    pub distance: f64,
    /// GJK iterations used.
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct SimplexVertex {
    /// Support point in A, world space.
    wa: Vec2,
    /// Support point in B, world space.
    wb: Vec2,
    /// wb - wa
    w: Vec2,
    /// Barycentric coordinate of the closest point.
    a: f64,
    index_a: usize,
    index_b: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
    ) -> Self {
        debug_assert!(cache.count <= 3);

        let mut simplex = Simplex {
            count: cache.count,
            ..Simplex::default()
        };
        for i in 0..simplex.count {
            let v = &mut simplex.v[i];
            v.index_a = cache.index_a[i];
            v.index_b = cache.index_b[i];
            v.wa = xf_a.apply(proxy_a.vertex(v.index_a));
            v.wb = xf_b.apply(proxy_b.vertex(v.index_b));
            v.w = v.wb - v.wa;
            v.a = 0.0;
        }

        // Flush the cache if the simplex shrank or grew too much.
        if simplex.count > 1 {
            let metric1 = cache.metric;
            let metric2 = simplex.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < EPSILON {
                simplex.count = 0;
            }
        }

        if simplex.count == 0 {
            let v = &mut simplex.v[0];
            v.index_a = 0;
            v.index_b = 0;
            v.wa = xf_a.apply(proxy_a.vertex(0));
            v.wb = xf_b.apply(proxy_b.vertex(0));
            v.w = v.wb - v.wa;
            v.a = 1.0;
            simplex.count = 1;
        }
        simplex
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a;
            cache.index_b[i] = self.v[i].index_b;
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = e12.cross(-self.v[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12.
                    Vec2::scalar_cross(1.0, e12)
                } else {
                    e12.cross_scalar(1.0)
                }
            }
            _ => {
                debug_assert!(false, "search direction requested for a full simplex");
                Vec2::ZERO
            }
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        match self.count {
            1 => (self.v[0].wa, self.v[0].wb),
            2 => (
                self.v[0].wa * self.v[0].a + self.v[1].wa * self.v[1].a,
                self.v[0].wb * self.v[0].a + self.v[1].wb * self.v[1].a,
            ),
            3 => {
                let p = self.v[0].wa * self.v[0].a
                    + self.v[1].wa * self.v[1].a
                    + self.v[2].wa * self.v[2].a;
                (p, p)
            }
            _ => (Vec2::ZERO, Vec2::ZERO),
        }
    }

    fn metric(&self) -> f64 {
        match self.count {
            1 => 0.0,
            2 => self.v[0].w.distance(self.v[1].w),
            3 => (self.v[1].w - self.v[0].w).cross(self.v[2].w - self.v[0].w),
            _ => 0.0,
        }
    }

    // Closest point on the segment w1-w2 to the origin, in barycentric form.
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // Must be in e12 region.
        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    // Voronoi regions of a triangle: three vertices, three edges and the interior.
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = e12.cross(e13);
        let d123_1 = n123 * w2.cross(w3);
        let d123_2 = n123 * w3.cross(w1);
        let d123_3 = n123 * w1.cross(w2);

        // w1 region
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // e12
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv_d12 = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv_d12;
            self.v[1].a = d12_2 * inv_d12;
            self.count = 2;
            return;
        }

        // e13
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv_d13 = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv_d13;
            self.v[2].a = d13_2 * inv_d13;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        // w2 region
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // w3 region
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[2].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        // e23
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv_d23 = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv_d23;
            self.v[2].a = d23_2 * inv_d23;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        // Must be in triangle123
        let inv_d123 = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv_d123;
        self.v[1].a = d123_2 * inv_d123;
        self.v[2].a = d123_3 * inv_d123;
        self.count = 3;
    }
}

/// Closest points between two convex proxies.
///
/// `cache` seeds the simplex and receives the final one; pass a default cache on the
/// first call for a pair.
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput) -> DistanceOutput {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;
    let xf_a = input.transform_a;
    let xf_b = input.transform_b;

    let mut simplex = Simplex::read_cache(cache, proxy_a, &xf_a, proxy_b, &xf_b);

    // Vertices of the last simplex, to detect cycling.
    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut iterations = 0;
    while iterations < MAX_DISTANCE_ITERATIONS {
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.v[i].index_a;
            save_b[i] = simplex.v[i].index_b;
        }

        match simplex.count {
            1 => {}
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => debug_assert!(false, "invalid simplex size"),
        }

        // The origin is inside the triangle: overlap.
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();

        // The origin is probably on the simplex; the next direction is unreliable.
        if d.magnitude_squared() < EPSILON * EPSILON {
            break;
        }

        let index = simplex.count;
        let vertex = &mut simplex.v[index];
        vertex.index_a = proxy_a.support(xf_a.rotation.apply_inverse(-d));
        vertex.wa = xf_a.apply(proxy_a.vertex(vertex.index_a));
        vertex.index_b = proxy_b.support(xf_b.rotation.apply_inverse(d));
        vertex.wb = xf_b.apply(proxy_b.vertex(vertex.index_b));
        vertex.w = vertex.wb - vertex.wa;
        let (new_a, new_b) = (vertex.index_a, vertex.index_b);

        iterations += 1;

        // A repeated support point means no further progress.
        let duplicate = (0..save_count).any(|i| new_a == save_a[i] && new_b == save_b[i]);
        if duplicate {
            break;
        }

        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = point_a.distance(point_b);
    simplex.write_cache(cache);

    if input.use_radii {
        let ra = proxy_a.radius;
        let rb = proxy_b.radius;

        if dist > ra + rb && dist > EPSILON {
            // Move the witness points to the outer surfaces.
            dist -= ra + rb;
            let normal = (point_b - point_a).normalize();
            point_a += normal * ra;
            point_b -= normal * rb;
        } else {
            // Shapes overlap when radii are considered; collapse to the midpoint.
            let p = (point_a + point_b) * 0.5;
            point_a = p;
            point_b = p;
            dist = 0.0;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations,
    }
}

/// True when two shape children overlap, skin radii included.
pub fn test_overlap(
    shape_a: &Shape,
    child_a: usize,
    xf_a: &Transform,
    shape_b: &Shape,
    child_b: usize,
    xf_b: &Transform,
) -> bool {
    let input = DistanceInput {
        proxy_a: DistanceProxy::new(shape_a, child_a),
        proxy_b: DistanceProxy::new(shape_b, child_b),
        transform_a: *xf_a,
        transform_b: *xf_b,
        use_radii: true,
    };
    let mut cache = SimplexCache::default();
    let output = distance(&mut cache, &input);
    output.distance < 10.0 * EPSILON
}
