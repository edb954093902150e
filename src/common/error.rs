//! Error types for recoverable misuse of the world API.
//!
//! Broken geometric preconditions (non-convex polygons, degenerate edges)
//! are assertions instead: they are caller bugs, not runtime conditions.

use thiserror::Error;

/// Errors reported by the world and its configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// A settings value is out of range.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Step called with a NaN or infinite time step.
    #[error("Invalid time step: {0} (must be finite)")]
    InvalidTimeStep(f64),

    /// The body handle does not refer to a live body.
    #[error("Unknown body handle")]
    UnknownBody,

    /// The fixture handle does not refer to a live fixture.
    #[error("Unknown fixture handle")]
    UnknownFixture,

    /// The joint handle does not refer to a live joint.
    #[error("Unknown joint handle")]
    UnknownJoint,

    /// A joint was requested between a body and itself.
    #[error("Joint must connect two different bodies")]
    SelfJoint,
}

impl PhysicsError {
    /// Convenience constructor for settings failures.
    pub fn invalid_settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings(msg.into())
    }
}

/// Result type for world operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;
