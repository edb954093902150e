use super::vec2::Vec2;

/// 2x2 matrix stored by columns.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Mat22 {
    pub ex: Vec2,
    pub ey: Vec2,
}

impl Mat22 {
    pub fn new(ex: Vec2, ey: Vec2) -> Self {
        Self { ex, ey }
    }

    pub fn determinant(&self) -> f64 {
        self.ex.x * self.ey.y - self.ey.x * self.ex.y
    }

    /// Inverse, or the zero matrix when singular.
    pub fn inverse(&self) -> Mat22 {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a * d - b * c;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Mat22 {
            ex: Vec2::new(det * d, -det * c),
            ey: Vec2::new(-det * b, det * a),
        }
    }

    /// Solves `A * x = b` without forming the inverse. Singular systems yield zero.
    pub fn solve(&self, b: Vec2) -> Vec2 {
        let mut det = self.determinant();
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(
            det * (self.ey.y * b.x - self.ey.x * b.y),
            det * (self.ex.x * b.y - self.ex.y * b.x),
        )
    }

    pub fn mul(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_matches_inverse() {
        let m = Mat22::new(Vec2::new(4.0, 1.0), Vec2::new(2.0, 3.0));
        let b = Vec2::new(1.0, 2.0);
        let x = m.solve(b);
        let y = m.inverse().mul(b);
        assert_relative_eq!(x.x, y.x, epsilon = 1e-12);
        assert_relative_eq!(x.y, y.y, epsilon = 1e-12);
        let back = m.mul(x);
        assert_relative_eq!(back.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(back.y, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_is_zero() {
        let m = Mat22::new(Vec2::new(1.0, 2.0), Vec2::new(2.0, 4.0));
        assert_eq!(m.determinant(), 0.0);
        assert_eq!(m.inverse(), Mat22::default());
        assert_eq!(m.solve(Vec2::new(1.0, 1.0)), Vec2::ZERO);
    }
}
