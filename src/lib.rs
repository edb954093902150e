//! 2D rigid-body physics: convex shapes, contact generation, an iterative island
//! solver with warm starting and sleep, joints, and continuous collision for fast
//! bodies.

pub mod collision;
pub mod common;
pub mod constraints;
pub mod contacts;
pub mod integration;
pub mod math;
pub mod objects;
pub mod shapes;
pub mod world;

// Re-export key types for easier use
pub use collision::{Manifold, WorldManifold, AABB};
pub use common::{Material, PhysicsError, Result, Settings};
pub use constraints::{DistanceJointDef, Joint, JointDef, JointHandle, RevoluteJointDef};
pub use contacts::{Contact, ContactFilter, ContactHandle, ContactImpulse, ContactListener};
pub use math::{Rot, Transform, Vec2};
pub use objects::{Body, BodyDef, BodyHandle, BodyType, Filter, Fixture, FixtureDef, FixtureHandle};
pub use shapes::{Chain, Circle, Edge, MassData, Polygon, Shape, ShapeType};
pub use world::{RayHit, StepStats, World};
