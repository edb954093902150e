pub mod error;
pub mod material;
pub mod settings;

pub use error::{PhysicsError, Result};
pub use material::{mix_friction, mix_restitution, Material};
pub use settings::Settings;
