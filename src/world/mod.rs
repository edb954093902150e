pub(crate) mod island;
pub mod physics_world;

pub use physics_world::{RayHit, StepStats, World};
