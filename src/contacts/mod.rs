//! Contact lifecycle: creation from broad-phase pairs, per-step manifold updates,
//! listener callbacks and the sequential impulse solver.

pub mod contact;
pub mod contact_manager;
pub(crate) mod contact_solver;
pub mod listener;

pub use contact::{Contact, ContactEdge};
pub use contact_manager::ContactManager;
pub use listener::{ContactFilter, ContactImpulse, ContactListener};

slotmap::new_key_type! {
    /// Handle to a contact owned by the contact manager.
    pub struct ContactHandle;
}
