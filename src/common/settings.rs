//! Tuning constants and runtime solver settings.
//!
//! Geometry tolerances that the narrow phase relies on are compile-time
//! constants. Everything the island solver reads per step lives in
//! [`Settings`] so a world can be tuned without recompiling.

use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::error::{PhysicsError, Result};

/// Smallest length treated as non-zero.
pub const EPSILON: f64 = 1e-12;

/// Contact points per manifold. Two is the minimum for a valid clipped segment.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Vertex capacity of a polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Fattening applied to broad-phase proxies so small motions do not re-bin them.
pub const AABB_EXTENSION: f64 = 0.1;

/// Multiplier on displacement used to predict where a proxy is heading.
pub const AABB_MULTIPLIER: f64 = 2.0;

/// Collision and constraint tolerance (meters).
pub const LINEAR_SLOP: f64 = 0.005;

/// Collision and constraint tolerance (radians).
pub const ANGULAR_SLOP: f64 = 2.0 / 180.0 * PI;

/// Skin thickness of polygons and edges.
pub const POLYGON_RADIUS: f64 = 2.0 * LINEAR_SLOP;

/// Largest linear position correction applied per iteration.
pub const MAX_LINEAR_CORRECTION: f64 = 0.2;

/// Largest angular position correction applied by joints per iteration.
pub const MAX_ANGULAR_CORRECTION: f64 = 8.0 / 180.0 * PI;

/// Iteration cap for the GJK distance routine.
pub const MAX_DISTANCE_ITERATIONS: usize = 20;

/// Iteration cap for the outer time of impact loop.
pub const MAX_TOI_ITERATIONS: usize = 20;

/// Iteration cap for the time of impact root finder.
pub const MAX_TOI_ROOT_ITERATIONS: usize = 50;

/// Contacts gathered around one TOI event.
pub const MAX_TOI_CONTACTS: usize = 32;

/// Runtime settings read by the step and island solver.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Settings {
    /// Velocity iterations per step.
    pub velocity_iterations: usize,
    /// Position iterations per step (may exit early).
    pub position_iterations: usize,
    /// Velocity iterations per TOI sub-step.
    pub toi_velocity_iterations: usize,
    /// Position iterations per TOI sub-step (may exit early).
    pub toi_position_iterations: usize,
    /// Seed the solver with last step's impulses.
    pub enable_warm_starting: bool,
    /// Run the time-of-impact pass after the discrete solve.
    pub continuous_physics: bool,
    /// Let quiet islands go to sleep.
    pub allow_sleep: bool,
    /// Clear accumulated forces after each step.
    pub auto_clear_forces: bool,
    /// Approach speed below which collisions are treated as inelastic.
    pub velocity_threshold: f64,
    /// Largest translation per step; faster bodies are clamped.
    pub max_translation: f64,
    /// Largest rotation per step (radians).
    pub max_rotation: f64,
    /// Fraction of overlap resolved per position iteration.
    pub contact_baumgarte: f64,
    /// Baumgarte factor used while resolving TOI sub-steps.
    pub toi_baumgarte: f64,
    /// Seconds a body must stay still before its island may sleep.
    pub time_to_sleep: f64,
    /// Linear speed below which a body counts as still.
    pub linear_sleep_tolerance: f64,
    /// Angular speed below which a body counts as still.
    pub angular_sleep_tolerance: f64,
    /// Cap on TOI sub-steps handled per contact per step.
    pub max_sub_steps: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            velocity_iterations: 8,
            position_iterations: 3,
            toi_velocity_iterations: 8,
            toi_position_iterations: 20,
            enable_warm_starting: true,
            continuous_physics: true,
            allow_sleep: true,
            auto_clear_forces: true,
            velocity_threshold: 1.0,
            max_translation: 2.0,
            max_rotation: 0.5 * PI,
            contact_baumgarte: 0.2,
            toi_baumgarte: 0.75,
            time_to_sleep: 0.5,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0 / 180.0 * PI,
            max_sub_steps: 8,
        }
    }
}

impl Settings {
    /// Override the iteration counts of the discrete solver.
    #[must_use]
    pub fn with_iterations(mut self, velocity: usize, position: usize) -> Self {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
        self
    }

    #[must_use]
    pub fn with_sleep(mut self, allow_sleep: bool) -> Self {
        self.allow_sleep = allow_sleep;
        self
    }

    #[must_use]
    pub fn with_continuous_physics(mut self, enabled: bool) -> Self {
        self.continuous_physics = enabled;
        self
    }

    #[must_use]
    pub fn with_warm_starting(mut self, enabled: bool) -> Self {
        self.enable_warm_starting = enabled;
        self
    }

    /// Check that every value is usable by the solver.
    pub fn validate(&self) -> Result<()> {
        if self.velocity_iterations == 0 {
            return Err(PhysicsError::invalid_settings(
                "velocity_iterations must be at least 1",
            ));
        }
        if self.toi_velocity_iterations == 0 {
            return Err(PhysicsError::invalid_settings(
                "toi_velocity_iterations must be at least 1",
            ));
        }
        if !(self.max_translation > 0.0) || !(self.max_rotation > 0.0) {
            return Err(PhysicsError::invalid_settings(
                "max_translation and max_rotation must be positive",
            ));
        }
        for (name, value) in [
            ("contact_baumgarte", self.contact_baumgarte),
            ("toi_baumgarte", self.toi_baumgarte),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PhysicsError::invalid_settings(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.velocity_threshold < 0.0
            || self.time_to_sleep < 0.0
            || self.linear_sleep_tolerance < 0.0
            || self.angular_sleep_tolerance < 0.0
        {
            return Err(PhysicsError::invalid_settings(
                "thresholds and tolerances cannot be negative",
            ));
        }
        if self.max_sub_steps == 0 {
            return Err(PhysicsError::invalid_settings(
                "max_sub_steps must be at least 1",
            ));
        }
        Ok(())
    }

    pub(crate) fn max_translation_squared(&self) -> f64 {
        self.max_translation * self.max_translation
    }

    pub(crate) fn max_rotation_squared(&self) -> f64 {
        self.max_rotation * self.max_rotation
    }
}
