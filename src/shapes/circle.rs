use std::f64::consts::PI;

use super::MassData;
use crate::collision::{RayCastInput, RayCastOutput, AABB};
use crate::common::settings::EPSILON;
use crate::math::{Transform, Vec2};

/// A solid circle positioned relative to its body origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    /// Center in the body's local frame.
    pub center: Vec2,
    pub radius: f64,
}

impl Circle {
    /// Circle centered on the body origin.
    pub fn new(radius: f64) -> Self {
        Self::with_center(Vec2::ZERO, radius)
    }

    pub fn with_center(center: Vec2, radius: f64) -> Self {
        assert!(radius >= 0.0, "Circle radius cannot be negative");
        Self { center, radius }
    }

    /// Mass properties for a uniform disc. Inertia is about the body origin.
    pub fn compute_mass(&self, density: f64) -> MassData {
        let area = PI * self.radius * self.radius;
        let mass = density * area;
        MassData {
            mass,
            center: self.center,
            inertia: mass * (0.5 * self.radius * self.radius + self.center.magnitude_squared()),
            area,
        }
    }

    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        let center = xf.apply(self.center);
        (p - center).magnitude_squared() <= self.radius * self.radius
    }

    /// Reports the first crossing of the circle boundary along the ray.
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        // Solve |s + t*r|^2 = radius^2 with s = p1 - center, r = p2 - p1.
        let position = xf.apply(self.center);
        let s = input.p1 - position;
        let b = s.magnitude_squared() - self.radius * self.radius;

        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.magnitude_squared();
        let sigma = c * c - rr * b;

        if sigma < 0.0 || rr < EPSILON {
            return None;
        }

        let a = -(c + sigma.sqrt());
        if 0.0 <= a && a <= input.max_fraction * rr {
            let fraction = a / rr;
            return Some(RayCastOutput {
                normal: (s + r * fraction).normalize(),
                fraction,
            });
        }
        None
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let p = xf.apply(self.center);
        let r = Vec2::new(self.radius, self.radius);
        AABB { min: p - r, max: p + r }
    }
}
