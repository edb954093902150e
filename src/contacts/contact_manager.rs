use std::fmt;

use slotmap::SlotMap;
use tracing::debug;

use crate::collision::{BroadPhase, EpScratch};
use crate::objects::{Body, BodyHandle, Fixture, FixtureHandle, FixtureProxy};

use super::listener::listener_mut;
use super::{Contact, ContactFilter, ContactHandle, ContactListener};

/// Owns every contact and the broad phase that feeds them.
///
/// The contact arena doubles as the global contact list. Each body additionally
/// threads its own contacts through [`ContactEdge`](super::ContactEdge) nodes so
/// island building can walk a body's neighbours directly.
pub struct ContactManager {
    pub(crate) contacts: SlotMap<ContactHandle, Contact>,
    pub(crate) broad_phase: Box<dyn BroadPhase<FixtureProxy>>,
    pub(crate) filter: Option<Box<dyn ContactFilter>>,
    pub(crate) listener: Option<Box<dyn ContactListener>>,
    pub(crate) scratch: EpScratch,
    // Reused across steps.
    pub(crate) pair_buffer: Vec<(FixtureProxy, FixtureProxy)>,
    pub(crate) handle_buffer: Vec<ContactHandle>,
}

impl fmt::Debug for ContactManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContactManager")
            .field("contacts", &self.contacts.len())
            .field("proxies", &self.broad_phase.proxy_count())
            .field("filter", &self.filter.is_some())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl ContactManager {
    pub fn new(broad_phase: Box<dyn BroadPhase<FixtureProxy>>) -> Self {
        Self {
            contacts: SlotMap::with_key(),
            broad_phase,
            filter: None,
            listener: None,
            scratch: EpScratch::new(),
            pair_buffer: Vec::new(),
            handle_buffer: Vec::new(),
        }
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn contact(&self, handle: ContactHandle) -> Option<&Contact> {
        self.contacts.get(handle)
    }

    pub fn contacts(&self) -> impl Iterator<Item = (ContactHandle, &Contact)> {
        self.contacts.iter()
    }

    pub fn broad_phase(&self) -> &dyn BroadPhase<FixtureProxy> {
        self.broad_phase.as_ref()
    }

    fn fixtures_should_collide(&self, a: &Fixture, b: &Fixture) -> bool {
        match &self.filter {
            Some(filter) => filter.should_collide(a, b),
            None => a.filter().should_collide(&b.filter()),
        }
    }

    /// Broad-phase callback: creates a contact for a new overlapping proxy pair
    /// unless one already exists or filtering rejects it.
    pub(crate) fn add_pair(
        &mut self,
        bodies: &mut SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
        proxy_a: FixtureProxy,
        proxy_b: FixtureProxy,
    ) {
        let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(proxy_a.fixture), fixtures.get(proxy_b.fixture)) else {
            return;
        };
        let (handle_a, handle_b) = (fixture_a.body(), fixture_b.body());

        // Fixtures on the same body never collide.
        if handle_a == handle_b {
            return;
        }

        let (Some(body_a), Some(body_b)) = (bodies.get(handle_a), bodies.get(handle_b)) else {
            return;
        };

        // Does a contact already exist?
        let mut cursor = body_b.contact_list;
        while let Some(handle) = cursor {
            let Some(contact) = self.contacts.get(handle) else {
                break;
            };
            let edge = contact.edge_for(handle_b);
            if edge.other == handle_a {
                let same = |fa: FixtureProxy, fb: FixtureProxy| {
                    contact.fixture_a == fa.fixture
                        && contact.child_a == fa.child_index
                        && contact.fixture_b == fb.fixture
                        && contact.child_b == fb.child_index
                };
                if same(proxy_a, proxy_b) || same(proxy_b, proxy_a) {
                    return;
                }
            }
            cursor = edge.next;
        }

        if !body_b.should_collide(body_a, handle_a) {
            return;
        }

        if !self.fixtures_should_collide(fixture_a, fixture_b) {
            return;
        }

        let Some(contact) = Contact::new(
            proxy_a.fixture,
            fixture_a,
            proxy_a.child_index,
            proxy_b.fixture,
            fixture_b,
            proxy_b.child_index,
        ) else {
            return;
        };

        let (body_a, body_b) = (contact.body_a, contact.body_b);
        let handle = self.contacts.insert(contact);
        self.link(handle, body_a, bodies);
        self.link(handle, body_b, bodies);

        debug!(contact = ?handle, body_a = ?body_a, body_b = ?body_b, "contact created");
    }

    /// Pushes `handle` onto the front of `body`'s contact list.
    fn link(&mut self, handle: ContactHandle, body: BodyHandle, bodies: &mut SlotMap<BodyHandle, Body>) {
        let Some(owner) = bodies.get_mut(body) else {
            return;
        };
        let head = owner.contact_list;
        if let Some(contact) = self.contacts.get_mut(handle) {
            let edge = contact.edge_for_mut(body);
            edge.prev = None;
            edge.next = head;
        }
        if let Some(next) = head.and_then(|h| self.contacts.get_mut(h)) {
            next.edge_for_mut(body).prev = Some(handle);
        }
        owner.contact_list = Some(handle);
    }

    fn unlink(&mut self, handle: ContactHandle, body: BodyHandle, bodies: &mut SlotMap<BodyHandle, Body>) {
        let Some(edge) = self.contacts.get(handle).map(|c| *c.edge_for(body)) else {
            return;
        };
        if let Some(prev) = edge.prev.and_then(|h| self.contacts.get_mut(h)) {
            prev.edge_for_mut(body).next = edge.next;
        }
        if let Some(next) = edge.next.and_then(|h| self.contacts.get_mut(h)) {
            next.edge_for_mut(body).prev = edge.prev;
        }
        if let Some(owner) = bodies.get_mut(body) {
            if owner.contact_list == Some(handle) {
                owner.contact_list = edge.next;
            }
        }
    }

    /// Drains new pairs from the broad phase into contacts.
    pub(crate) fn find_new_contacts(
        &mut self,
        bodies: &mut SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
    ) {
        let mut pairs = std::mem::take(&mut self.pair_buffer);
        pairs.clear();
        self.broad_phase.update_pairs(&mut |a, b| pairs.push((a, b)));
        for &(a, b) in &pairs {
            self.add_pair(bodies, fixtures, a, b);
        }
        self.pair_buffer = pairs;
    }

    /// Removes a contact, reporting `end_contact` if it was touching and waking both
    /// bodies if it carried points.
    pub(crate) fn destroy(&mut self, handle: ContactHandle, bodies: &mut SlotMap<BodyHandle, Body>) {
        let Some(contact) = self.contacts.get(handle) else {
            return;
        };
        if contact.touching {
            if let Some(listener) = self.listener.as_deref_mut() {
                listener.end_contact(contact);
            }
        }

        let (body_a, body_b) = (contact.body_a, contact.body_b);
        let had_points = contact.manifold.point_count > 0;

        self.unlink(handle, body_a, bodies);
        self.unlink(handle, body_b, bodies);

        if had_points {
            for body in [body_a, body_b] {
                if let Some(body) = bodies.get_mut(body) {
                    body.set_awake(true);
                }
            }
        }

        self.contacts.remove(handle);
        debug!(contact = ?handle, "contact destroyed");
    }

    /// Re-evaluates one contact's manifold and wakes its bodies on a touching
    /// transition.
    pub(crate) fn update_contact(
        &mut self,
        handle: ContactHandle,
        bodies: &mut SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
    ) {
        let Self {
            contacts,
            listener,
            scratch,
            ..
        } = self;
        let Some(contact) = contacts.get_mut(handle) else {
            return;
        };
        let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b)) else {
            return;
        };
        let (Some(xf_a), Some(xf_b)) = (
            bodies.get(contact.body_a).map(|b| b.xf),
            bodies.get(contact.body_b).map(|b| b.xf),
        ) else {
            return;
        };

        let changed = contact.update(fixture_a, fixture_b, &xf_a, &xf_b, scratch, listener_mut(listener));
        if changed {
            for body in [contact.body_a, contact.body_b] {
                if let Some(body) = bodies.get_mut(body) {
                    body.set_awake(true);
                }
            }
        }
    }

    /// The narrow phase: refreshes every contact whose bodies may have moved and
    /// retires contacts whose proxies stopped overlapping or that no longer pass
    /// filtering.
    pub(crate) fn collide(&mut self, bodies: &mut SlotMap<BodyHandle, Body>, fixtures: &SlotMap<FixtureHandle, Fixture>) {
        let mut handles = std::mem::take(&mut self.handle_buffer);
        handles.clear();
        handles.extend(self.contacts.keys());
        for &handle in &handles {
            let Some(contact) = self.contacts.get(handle) else {
                continue;
            };
            let (fixture_a, fixture_b) = (contact.fixture_a, contact.fixture_b);
            let (child_a, child_b) = (contact.child_a, contact.child_b);
            let (handle_a, handle_b) = (contact.body_a, contact.body_b);
            let filter_flag = contact.filter_flag;

            let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(fixture_a), fixtures.get(fixture_b)) else {
                self.destroy(handle, bodies);
                continue;
            };
            let (Some(body_a), Some(body_b)) = (bodies.get(handle_a), bodies.get(handle_b)) else {
                self.destroy(handle, bodies);
                continue;
            };

            if filter_flag {
                let allowed =
                    body_b.should_collide(body_a, handle_a) && self.fixtures_should_collide(fixture_a, fixture_b);
                if !allowed {
                    self.destroy(handle, bodies);
                    continue;
                }
                if let Some(contact) = self.contacts.get_mut(handle) {
                    contact.filter_flag = false;
                }
            }

            // Resting pairs keep their manifold.
            if !body_a.is_active() && !body_b.is_active() {
                continue;
            }

            let overlap = match (fixture_a.proxy_id(child_a), fixture_b.proxy_id(child_b)) {
                (Some(id_a), Some(id_b)) => self.broad_phase.test_overlap(id_a, id_b),
                _ => false,
            };
            if !overlap {
                self.destroy(handle, bodies);
                continue;
            }

            self.update_contact(handle, bodies, fixtures);
        }
        self.handle_buffer = handles;
    }
}
