use super::rotation::Rot;
use super::vec2::Vec2;

/// Rigid pose: a translation plus a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform {
    pub position: Vec2,
    pub rotation: Rot,
}

impl Transform {
    /// Creates a new transform from a position and an angle in radians.
    pub fn new(position: Vec2, angle: f64) -> Self {
        Self {
            position,
            rotation: Rot::new(angle),
        }
    }

    /// Creates an identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: Rot::IDENTITY,
        }
    }

    pub fn set(&mut self, position: Vec2, angle: f64) {
        self.position = position;
        self.rotation = Rot::new(angle);
    }

    pub fn angle(self) -> f64 {
        self.rotation.angle()
    }

    /// Applies the transform (rotation then translation) to a point.
    pub fn apply(self, point: Vec2) -> Vec2 {
        self.rotation.apply(point) + self.position
    }

    /// Applies the inverse transform (inverse translation then inverse rotation) to a point.
    pub fn apply_inverse(self, point: Vec2) -> Vec2 {
        self.rotation.apply_inverse(point - self.position)
    }

    /// Composition `self * other`: maps other's local frame into self's parent frame.
    pub fn mul(self, other: Transform) -> Transform {
        Transform {
            position: self.rotation.apply(other.position) + self.position,
            rotation: self.rotation.mul(other.rotation),
        }
    }

    /// Composition `inverse(self) * other`: other's pose expressed in self's frame.
    pub fn mul_t(self, other: Transform) -> Transform {
        Transform {
            position: self.rotation.apply_inverse(other.position - self.position),
            rotation: self.rotation.mul_t(other.rotation),
        }
    }
}
