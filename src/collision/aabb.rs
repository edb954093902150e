// Defines an Axis-Aligned Bounding Box

use crate::math::vec2::Vec2;

use super::ray_cast::{RayCastInput, RayCastOutput};
use crate::common::settings::EPSILON;

/// An Axis-Aligned Bounding Box defined by its minimum and maximum corner points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: Vec2,
    pub max: Vec2,
}

impl AABB {
    /// Creates a new AABB. Corners are sorted so `min <= max` on both axes.
    pub fn new(min: Vec2, max: Vec2) -> Self {
        AABB {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Checks if this AABB overlaps with another AABB. Touching boxes overlap.
    pub fn overlaps(&self, other: &AABB) -> bool {
        let d1 = other.min - self.max;
        let d2 = self.min - other.max;
        !(d1.x > 0.0 || d1.y > 0.0 || d2.x > 0.0 || d2.y > 0.0)
    }

    /// Merges another AABB into this one, expanding this AABB to contain both.
    pub fn merge(&mut self, other: &AABB) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Smallest box containing both inputs.
    pub fn combine(a: &AABB, b: &AABB) -> AABB {
        let mut out = *a;
        out.merge(b);
        out
    }

    /// Creates an AABB that encompasses a set of points.
    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (min_pt, max_pt) = rest
            .iter()
            .fold((*first, *first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        Some(AABB { min: min_pt, max: max_pt })
    }

    /// True when the box is finite and not inverted.
    pub fn is_valid(&self) -> bool {
        let d = self.max - self.min;
        d.x >= 0.0 && d.y >= 0.0 && self.min.is_valid() && self.max.is_valid()
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Half-widths along each axis.
    pub fn extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    pub fn perimeter(&self) -> f64 {
        let w = self.max.x - self.min.x;
        let h = self.max.y - self.min.y;
        2.0 * (w + h)
    }

    /// Grows the box by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> AABB {
        let r = Vec2::new(margin, margin);
        AABB {
            min: self.min - r,
            max: self.max + r,
        }
    }

    /// True if `other` lies completely inside this box.
    pub fn contains(&self, other: &AABB) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    /// Slab test against the box. Rays starting inside report no hit.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut t_min = f64::MIN;
        let mut t_max = f64::MAX;

        let p = [input.p1.x, input.p1.y];
        let d = [input.p2.x - input.p1.x, input.p2.y - input.p1.y];
        let lo = [self.min.x, self.min.y];
        let hi = [self.max.x, self.max.y];
        let mut normal = Vec2::ZERO;

        for i in 0..2 {
            if d[i].abs() < EPSILON {
                // Parallel to this slab.
                if p[i] < lo[i] || hi[i] < p[i] {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d[i];
                let mut t1 = (lo[i] - p[i]) * inv_d;
                let mut t2 = (hi[i] - p[i]) * inv_d;
                let mut s = -1.0;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                    s = 1.0;
                }
                if t1 > t_min {
                    normal = if i == 0 { Vec2::new(s, 0.0) } else { Vec2::new(0.0, s) };
                    t_min = t1;
                }
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            }
        }

        if t_min < 0.0 || input.max_fraction < t_min {
            return None;
        }
        Some(RayCastOutput {
            normal,
            fraction: t_min,
        })
    }
}
