use crate::collision::Manifold;
use crate::common::settings::MAX_MANIFOLD_POINTS;
use crate::objects::Fixture;

use super::Contact;

/// Impulses applied by the solver to one contact, reported after each island solve.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactImpulse {
    pub normal_impulses: [f64; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [f64; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

/// Receives contact events during a step.
///
/// Callbacks run while the world is mutably borrowed, so they cannot create or destroy
/// bodies. Collect what you need and act on it after `step` returns.
pub trait ContactListener {
    /// Two fixtures began to touch.
    fn begin_contact(&mut self, _contact: &Contact) {}

    /// Two fixtures stopped touching. Also called when a touching contact is destroyed.
    fn end_contact(&mut self, _contact: &Contact) {}

    /// Called after the manifold is updated and before the solver sees it.
    /// Disabling the contact here skips it for the current step only.
    fn pre_solve(&mut self, _contact: &mut Contact, _old_manifold: &Manifold) {}

    /// Solver impulses, useful for damage or sound. Not called for sensors.
    fn post_solve(&mut self, _contact: &Contact, _impulse: &ContactImpulse) {}
}

/// Decides whether two fixtures may create a contact.
pub trait ContactFilter {
    fn should_collide(&self, fixture_a: &Fixture, fixture_b: &Fixture) -> bool {
        fixture_a.filter().should_collide(&fixture_b.filter())
    }
}

/// Shortens a stored listener's trait-object lifetime for passing down the solver.
pub(crate) fn listener_mut(listener: &mut Option<Box<dyn ContactListener>>) -> Option<&mut dyn ContactListener> {
    match listener {
        Some(listener) => Some(listener.as_mut()),
        None => None,
    }
}
