use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::common::settings::EPSILON;

/// Two component vector used for positions, velocities and directions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };
    pub const UP: Vec2 = Vec2 { x: 0.0, y: 1.0 };

    /// Creates a new Vec2.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Calculates the dot product of two vectors.
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Calculates the squared magnitude (length) of the vector.
    /// Useful for comparisons as it avoids a square root.
    pub fn magnitude_squared(self) -> f64 {
        self.dot(self)
    }

    /// Calculates the magnitude (length) of the vector.
    pub fn magnitude(self) -> f64 {
        self.magnitude_squared().sqrt()
    }

    /// Returns a normalized version of the vector (unit vector).
    /// Vectors shorter than `EPSILON` come back as zero.
    pub fn normalize(self) -> Self {
        self.normalize_with_length().0
    }

    /// Normalizes the vector and also returns its original length.
    /// Vectors shorter than `EPSILON` come back as `(ZERO, 0.0)`.
    pub fn normalize_with_length(self) -> (Self, f64) {
        let mag = self.magnitude();
        if mag < EPSILON {
            (Self::ZERO, 0.0)
        } else {
            (self * (1.0 / mag), mag)
        }
    }

    /// Calculates the squared distance between two vector points.
    pub fn distance_squared(self, other: Self) -> f64 {
        (self - other).magnitude_squared()
    }

    /// Calculates the distance between two vector points.
    pub fn distance(self, other: Self) -> f64 {
        (self - other).magnitude()
    }

    /// Returns a vector perpendicular to this vector (90-degree counter-clockwise rotation).
    pub fn perpendicular(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Rotates the vector by a given angle (in radians).
    pub fn rotate(self, angle: f64) -> Self {
        let (sin_a, cos_a) = angle.sin_cos();
        Self::new(
            self.x * cos_a - self.y * sin_a,
            self.x * sin_a + self.y * cos_a,
        )
    }

    /// Computes the 2D cross product (scalar). Equivalent to z-component of 3D cross product.
    pub fn cross(self, other: Vec2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Cross product of this vector with a scalar `s` treated as the z axis: `(s * y, -s * x)`.
    pub fn cross_scalar(self, s: f64) -> Vec2 {
        Vec2::new(s * self.y, -s * self.x)
    }

    /// Cross product of a scalar (z axis) with a vector: `(-s * y, s * x)`.
    /// This is the velocity contributed by an angular velocity `s` at offset `v`.
    pub fn scalar_cross(s: f64, v: Vec2) -> Vec2 {
        Vec2::new(-s * v.y, s * v.x)
    }

    pub fn min(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x.min(other.x), self.y.min(other.y))
    }

    pub fn max(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x.max(other.x), self.y.max(other.y))
    }

    pub fn abs(self) -> Vec2 {
        Vec2::new(self.x.abs(), self.y.abs())
    }

    /// True when both components are finite numbers.
    pub fn is_valid(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

// Vec2 * f64
impl Mul<f64> for Vec2 {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self {
        Self {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }
}

// f64 * Vec2
impl Mul<Vec2> for f64 {
    type Output = Vec2;

    fn mul(self, vec: Vec2) -> Vec2 {
        vec * self
    }
}

impl MulAssign<f64> for Vec2 {
    fn mul_assign(&mut self, rhs: f64) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

// Division by zero follows IEEE rules (inf/NaN); callers guard the divisor.
impl Div<f64> for Vec2 {
    type Output = Self;

    fn div(self, rhs: f64) -> Self::Output {
        Vec2::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;
    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_vec2_arithmetic() {
        let v1 = Vec2::new(1.0, 2.0);
        let v2 = Vec2::new(3.0, 4.0);
        assert_eq!(v1 + v2, Vec2::new(4.0, 6.0));
        assert_eq!(v2 - v1, Vec2::new(2.0, 2.0));
        assert_eq!(v1 * 3.0, Vec2::new(3.0, 6.0));
        assert_eq!(3.0 * v1, Vec2::new(3.0, 6.0));
        assert_eq!(-v1, Vec2::new(-1.0, -2.0));

        let mut v = v1;
        v *= 2.0;
        v -= Vec2::new(1.0, 1.0);
        assert_eq!(v, Vec2::new(1.0, 3.0));
    }

    #[test]
    fn test_vec2_dot_and_magnitude() {
        let v1 = Vec2::new(1.0, 2.0);
        let v2 = Vec2::new(3.0, 4.0);
        assert!((v1.dot(v2) - 11.0).abs() < EPSILON);
        assert!((v2.magnitude() - 5.0).abs() < EPSILON);
        assert!((v2.magnitude_squared() - 25.0).abs() < EPSILON);
    }

    #[test]
    fn test_vec2_normalize() {
        let (n, len) = Vec2::new(3.0, 4.0).normalize_with_length();
        assert_relative_eq!(len, 5.0);
        assert_relative_eq!(n.x, 0.6);
        assert_relative_eq!(n.y, 0.8);

        // Degenerate input must not produce NaN.
        let (zero, zero_len) = Vec2::ZERO.normalize_with_length();
        assert_eq!(zero, Vec2::ZERO);
        assert_eq!(zero_len, 0.0);
    }

    #[test]
    fn test_vec2_cross_variants() {
        let a = Vec2::new(1.0, 0.0);
        let b = Vec2::new(0.0, 1.0);
        assert_relative_eq!(a.cross(b), 1.0);
        assert_relative_eq!(b.cross(a), -1.0);

        // w x r gives the tangential velocity
        let v = Vec2::scalar_cross(2.0, Vec2::new(1.0, 0.0));
        assert_eq!(v, Vec2::new(0.0, 2.0));

        let c = Vec2::new(1.0, 0.0).cross_scalar(1.0);
        assert_eq!(c, Vec2::new(0.0, -1.0));
    }

    #[test]
    fn test_vec2_perpendicular() {
        let v = Vec2::new(3.0, 4.0);
        let perp = v.perpendicular();
        assert_eq!(perp, Vec2::new(-4.0, 3.0));
        assert!(v.dot(perp).abs() < EPSILON);
    }

    #[test]
    fn test_vec2_rotate() {
        let v = Vec2::new(1.0, 0.0);
        let v90 = v.rotate(PI / 2.0);
        assert!((v90.x - 0.0).abs() < EPSILON);
        assert!((v90.y - 1.0).abs() < EPSILON);

        let v2_rot90 = Vec2::new(1.0, 1.0).rotate(PI / 2.0);
        assert!((v2_rot90.x - -1.0).abs() < EPSILON);
        assert!((v2_rot90.y - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_vec2_min_max_abs_valid() {
        let a = Vec2::new(-1.0, 5.0);
        let b = Vec2::new(2.0, -3.0);
        assert_eq!(a.min(b), Vec2::new(-1.0, -3.0));
        assert_eq!(a.max(b), Vec2::new(2.0, 5.0));
        assert_eq!(a.abs(), Vec2::new(1.0, 5.0));
        assert!(a.is_valid());
        assert!(!Vec2::new(f64::NAN, 0.0).is_valid());
    }
}
