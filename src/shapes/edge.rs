use super::polygon::ray_cast_segment;
use super::MassData;
use crate::collision::{RayCastInput, RayCastOutput, AABB};
use crate::common::settings::POLYGON_RADIUS;
use crate::math::{Transform, Vec2};

/// A line segment between `vertex1` and `vertex2`.
///
/// The optional ghost vertices `vertex0` and `vertex3` describe the neighbouring
/// segments of a chain so collisions at shared corners stay smooth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub vertex0: Vec2,
    pub vertex1: Vec2,
    pub vertex2: Vec2,
    pub vertex3: Vec2,
    pub has_vertex0: bool,
    pub has_vertex3: bool,
    pub radius: f64,
}

impl Edge {
    pub fn new(v1: Vec2, v2: Vec2) -> Self {
        Self {
            vertex0: Vec2::ZERO,
            vertex1: v1,
            vertex2: v2,
            vertex3: Vec2::ZERO,
            has_vertex0: false,
            has_vertex3: false,
            radius: POLYGON_RADIUS,
        }
    }

    /// Attaches the previous and next chain vertices.
    pub fn with_adjacency(mut self, v0: Option<Vec2>, v3: Option<Vec2>) -> Self {
        if let Some(v0) = v0 {
            self.vertex0 = v0;
            self.has_vertex0 = true;
        }
        if let Some(v3) = v3 {
            self.vertex3 = v3;
            self.has_vertex3 = true;
        }
        self
    }

    pub fn length(&self) -> f64 {
        self.vertex1.distance(self.vertex2)
    }

    /// Edges are massless; the center is the midpoint.
    pub fn compute_mass(&self, _density: f64) -> MassData {
        MassData {
            mass: 0.0,
            center: (self.vertex1 + self.vertex2) * 0.5,
            inertia: 0.0,
            area: 0.0,
        }
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let p1 = xf.rotation.apply_inverse(input.p1 - xf.position);
        let p2 = xf.rotation.apply_inverse(input.p2 - xf.position);
        ray_cast_segment(
            self.vertex1,
            self.vertex2,
            p1,
            p2 - p1,
            input.max_fraction,
            xf.rotation,
        )
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let v1 = xf.apply(self.vertex1);
        let v2 = xf.apply(self.vertex2);
        AABB {
            min: v1.min(v2),
            max: v1.max(v2),
        }
        .expanded(self.radius)
    }
}
