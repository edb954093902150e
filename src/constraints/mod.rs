//! Joints: constraints between pairs of bodies solved alongside contacts.

use std::any::Any;
use std::fmt;

use crate::integration::{Position, TimeStep, Velocity};
use crate::math::Vec2;
use crate::objects::BodyHandle;

pub mod distance_joint;
pub mod revolute_joint;

pub use distance_joint::{DistanceJoint, DistanceJointDef};
pub use revolute_joint::{RevoluteJoint, RevoluteJointDef};

slotmap::new_key_type! {
    /// Handle to a joint owned by a [`World`](crate::world::World).
    pub struct JointHandle;
}

/// Mass data of a jointed body as seen by the island solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverBodyInfo {
    /// Index into the island's position and velocity arrays.
    pub index: usize,
    pub local_center: Vec2,
    pub inv_mass: f64,
    pub inv_i: f64,
}

/// Island state shared by every joint during one solve.
#[derive(Debug)]
pub struct SolverData<'a> {
    pub step: TimeStep,
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}

/// A constraint between two bodies.
///
/// The island solver calls `init_velocity_constraints` once per step, then the
/// velocity and position passes several times each. Implementations cache whatever
/// they need from [`SolverBodyInfo`] during initialization.
pub trait Joint: fmt::Debug {
    fn body_a(&self) -> BodyHandle;

    fn body_b(&self) -> BodyHandle;

    /// Whether the two bodies may still collide with each other.
    fn collide_connected(&self) -> bool;

    fn local_anchor_a(&self) -> Vec2;

    fn local_anchor_b(&self) -> Vec2;

    fn init_velocity_constraints(&mut self, a: &SolverBodyInfo, b: &SolverBodyInfo, data: &mut SolverData<'_>);

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>);

    /// Returns true when the position error is within tolerance.
    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool;

    /// Force applied on body B at the anchor, given the inverse of the last step.
    fn reaction_force(&self, inv_dt: f64) -> Vec2;

    fn reaction_torque(&self, inv_dt: f64) -> f64;

    fn as_any(&self) -> &dyn Any;
}

/// A body's link to one of its joints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointEdge {
    pub joint: JointHandle,
    pub other: BodyHandle,
    pub collide_connected: bool,
}

#[derive(Debug)]
pub(crate) struct JointEntry {
    pub(crate) joint: Box<dyn Joint>,
    pub(crate) island_flag: bool,
}

impl JointEntry {
    pub(crate) fn new(joint: Box<dyn Joint>) -> Self {
        Self {
            joint,
            island_flag: false,
        }
    }
}

/// Any supported joint definition.
#[derive(Debug, Clone, PartialEq)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
}

impl JointDef {
    pub fn body_a(&self) -> BodyHandle {
        match self {
            JointDef::Distance(def) => def.body_a,
            JointDef::Revolute(def) => def.body_a,
        }
    }

    pub fn body_b(&self) -> BodyHandle {
        match self {
            JointDef::Distance(def) => def.body_b,
            JointDef::Revolute(def) => def.body_b,
        }
    }

    pub fn collide_connected(&self) -> bool {
        match self {
            JointDef::Distance(def) => def.collide_connected,
            JointDef::Revolute(def) => def.collide_connected,
        }
    }

    pub(crate) fn into_joint(self) -> Box<dyn Joint> {
        match self {
            JointDef::Distance(def) => Box::new(DistanceJoint::new(&def)),
            JointDef::Revolute(def) => Box::new(RevoluteJoint::new(&def)),
        }
    }
}

impl From<DistanceJointDef> for JointDef {
    fn from(def: DistanceJointDef) -> Self {
        JointDef::Distance(def)
    }
}

impl From<RevoluteJointDef> for JointDef {
    fn from(def: RevoluteJointDef) -> Self {
        JointDef::Revolute(def)
    }
}
