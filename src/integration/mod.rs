//! Time stepping state shared by the island, contact and joint solvers.

pub mod integrator;

pub use integrator::{damping_factor, integrate_position, integrate_velocity};

use crate::math::Vec2;

/// Parameters of one (sub-)step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStep {
    pub dt: f64,
    /// 1 / dt, or 0 when dt is 0.
    pub inv_dt: f64,
    /// dt * inv_dt of the previous step; scales warm-start impulses after a dt change.
    pub dt_ratio: f64,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    pub warm_starting: bool,
}

impl TimeStep {
    pub fn new(dt: f64) -> Self {
        Self {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }
}

/// Solver copy of a body's center of mass and angle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub c: Vec2,
    pub a: f64,
}

/// Solver copy of a body's velocities.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub v: Vec2,
    pub w: f64,
}
