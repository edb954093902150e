//! Surface material properties and the rules used to combine them per contact.

/// Surface properties of a fixture affecting contacts.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    /// Coefficient of restitution (bounciness). Range [0, 1].
    /// 0 = perfectly inelastic (no bounce), 1 = perfectly elastic.
    pub restitution: f64,
    /// Coulomb friction coefficient. Range [0, infinity).
    pub friction: f64,
    /// Mass per unit area, used to derive body mass from fixture shapes.
    pub density: f64,
}

impl Material {
    /// Creates a new material; values are clamped to their valid ranges.
    pub fn new(restitution: f64, friction: f64, density: f64) -> Self {
        Material {
            restitution: restitution.clamp(0.0, 1.0),
            friction: friction.max(0.0),
            density: density.max(0.0),
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Material {
            restitution: 0.0,
            friction: 0.2,
            density: 0.0,
        }
    }
}

/// Friction mixing law: geometric mean, so a frictionless surface always slides.
pub fn mix_friction(friction_a: f64, friction_b: f64) -> f64 {
    (friction_a * friction_b).sqrt()
}

/// Restitution mixing law: the bouncier surface wins.
pub fn mix_restitution(restitution_a: f64, restitution_b: f64) -> f64 {
    restitution_a.max(restitution_b)
}
