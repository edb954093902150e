use super::vec2::Vec2;

/// A rotation stored as its sine and cosine.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rot {
    pub s: f64,
    pub c: f64,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Rot = Rot { s: 0.0, c: 1.0 };

    /// Creates a rotation from an angle in radians.
    pub fn new(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self { s, c }
    }

    /// Angle in radians, in (-pi, pi].
    pub fn angle(self) -> f64 {
        self.s.atan2(self.c)
    }

    pub fn x_axis(self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    pub fn y_axis(self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Rotates a vector.
    pub fn apply(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Rotates a vector by the inverse rotation.
    pub fn apply_inverse(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// Composition `self * other`.
    pub fn mul(self, other: Rot) -> Rot {
        Rot {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// Composition `inverse(self) * other`.
    pub fn mul_t(self, other: Rot) -> Rot {
        Rot {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_rot_apply_and_inverse() {
        let q = Rot::new(PI / 2.0);
        let v = q.apply(Vec2::new(1.0, 0.0));
        assert_relative_eq!(v.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(v.y, 1.0, epsilon = 1e-12);

        let back = q.apply_inverse(v);
        assert_relative_eq!(back.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(back.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rot_composition() {
        let a = Rot::new(0.3);
        let b = Rot::new(0.5);
        assert_relative_eq!(a.mul(b).angle(), 0.8, epsilon = 1e-12);
        assert_relative_eq!(a.mul_t(b).angle(), 0.2, epsilon = 1e-12);
    }
}
