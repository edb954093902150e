use super::edge::Edge;
use crate::collision::{RayCastInput, RayCastOutput, AABB};
use crate::common::settings::{LINEAR_SLOP, POLYGON_RADIUS};
use crate::math::{Transform, Vec2};

/// A sequence of connected segments, optionally closed into a loop.
///
/// Each segment is a child shape. Children know their neighbours, so a body
/// sliding across the joints between segments does not catch on them.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    vertices: Vec<Vec2>,
    is_loop: bool,
    pub radius: f64,
}

impl Chain {
    /// Open chain through `vertices`.
    pub fn new(vertices: Vec<Vec2>) -> Self {
        assert!(vertices.len() >= 2, "Chain needs at least 2 vertices");
        Self::checked(vertices, false)
    }

    /// Closed loop through `vertices`; the last vertex connects back to the first.
    pub fn new_loop(vertices: Vec<Vec2>) -> Self {
        assert!(vertices.len() >= 3, "Loop needs at least 3 vertices");
        Self::checked(vertices, true)
    }

    fn checked(vertices: Vec<Vec2>, is_loop: bool) -> Self {
        let n = vertices.len();
        let segments = if is_loop { n } else { n - 1 };
        for i in 0..segments {
            let (a, b) = (vertices[i], vertices[(i + 1) % n]);
            assert!(
                a.distance_squared(b) > LINEAR_SLOP * LINEAR_SLOP,
                "Chain vertices are too close together"
            );
        }
        Self {
            vertices,
            is_loop,
            radius: POLYGON_RADIUS,
        }
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn is_loop(&self) -> bool {
        self.is_loop
    }

    /// One child per segment.
    pub fn child_count(&self) -> usize {
        if self.is_loop {
            self.vertices.len()
        } else {
            self.vertices.len() - 1
        }
    }

    /// Segment `index` with its ghost vertices wired from the neighbouring segments.
    pub fn child_edge(&self, index: usize) -> Edge {
        let n = self.vertices.len();
        assert!(index < self.child_count(), "Chain child index out of range");

        let v1 = self.vertices[index];
        let v2 = self.vertices[(index + 1) % n];

        let v0 = if index > 0 {
            Some(self.vertices[index - 1])
        } else if self.is_loop {
            Some(self.vertices[n - 1])
        } else {
            None
        };
        let v3 = if index + 2 < n {
            Some(self.vertices[index + 2])
        } else if self.is_loop {
            Some(self.vertices[(index + 2) % n])
        } else {
            None
        };

        let mut edge = Edge::new(v1, v2).with_adjacency(v0, v3);
        edge.radius = self.radius;
        edge
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child_index: usize,
    ) -> Option<RayCastOutput> {
        self.child_edge(child_index).ray_cast(input, xf)
    }

    pub fn compute_aabb(&self, xf: &Transform, child_index: usize) -> AABB {
        self.child_edge(child_index).compute_aabb(xf)
    }
}
