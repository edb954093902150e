pub mod fixture;
pub mod rigid_body;

pub use fixture::{Filter, Fixture, FixtureDef, FixtureProxy};
pub use rigid_body::{Body, BodyDef, BodyType};

slotmap::new_key_type! {
    /// Handle to a body owned by a [`World`](crate::world::World).
    pub struct BodyHandle;

    /// Handle to a fixture owned by a [`World`](crate::world::World).
    pub struct FixtureHandle;
}
