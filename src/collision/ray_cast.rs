use crate::math::vec2::Vec2;

/// Ray segment `p1 + t * (p2 - p1)` for `t` in `[0, max_fraction]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f64,
}

impl RayCastInput {
    pub fn new(p1: Vec2, p2: Vec2) -> Self {
        Self {
            p1,
            p2,
            max_fraction: 1.0,
        }
    }

    /// Point along the ray at `fraction`.
    pub fn point_at(&self, fraction: f64) -> Vec2 {
        self.p1 + (self.p2 - self.p1) * fraction
    }
}

/// Hit reported by a ray cast: the surface normal and the fraction along the ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastOutput {
    pub normal: Vec2,
    pub fraction: f64,
}
