use std::f64::consts::PI;

use super::rotation::Rot;
use super::transform::Transform;
use super::vec2::Vec2;

/// Describes the motion of a body over one step for continuous collision.
/// Positions are of the center of mass; `local_center` converts back to the body origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sweep {
    pub local_center: Vec2,
    /// Center of mass at time `alpha0`.
    pub c0: Vec2,
    /// Center of mass at the end of the step.
    pub c: Vec2,
    pub a0: f64,
    pub a: f64,
    /// Fraction of the current step already covered by `c0`/`a0`, in [0, 1).
    pub alpha0: f64,
}

impl Sweep {
    /// Interpolated body transform at `beta` in [0, 1] between `(c0, a0)` and `(c, a)`.
    pub fn transform_at(&self, beta: f64) -> Transform {
        let position = self.c0 * (1.0 - beta) + self.c * beta;
        let angle = (1.0 - beta) * self.a0 + beta * self.a;
        let rotation = Rot::new(angle);
        Transform {
            position: position - rotation.apply(self.local_center),
            rotation,
        }
    }

    /// Moves the start of the sweep forward to time `alpha`.
    pub fn advance(&mut self, alpha: f64) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Wraps `a0` into [0, 2pi) and shifts `a` by the same amount.
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }
}
