use slotmap::SlotMap;
use tracing::{debug, info, warn};

use crate::collision::{
    time_of_impact, BroadPhase, DistanceProxy, GridBroadPhase, RayCastInput, ToiInput, ToiState, WorldManifold, AABB,
};
use crate::common::settings::{EPSILON, MAX_TOI_CONTACTS};
use crate::common::{PhysicsError, Result, Settings};
use crate::constraints::{Joint, JointDef, JointEdge, JointEntry, JointHandle};
use crate::contacts::listener::listener_mut;
use crate::contacts::{Contact, ContactFilter, ContactHandle, ContactListener, ContactManager};
use crate::integration::TimeStep;
use crate::math::Vec2;
use crate::objects::{Body, BodyDef, BodyHandle, Filter, Fixture, FixtureDef, FixtureHandle, FixtureProxy};

use super::island::{Island, IslandContext};

/// Cell size of the default broad phase, a few typical body widths.
const DEFAULT_CELL_SIZE: f64 = 4.0;

/// Counters describing one call to [`World::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepStats {
    /// Awake islands solved by the discrete solver.
    pub island_count: usize,
    /// Live contacts after the step.
    pub contact_count: usize,
    /// Time-of-impact events resolved.
    pub toi_events: usize,
}

/// Closest hit found by [`World::ray_cast_closest`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub fixture: FixtureHandle,
    pub point: Vec2,
    pub normal: Vec2,
    pub fraction: f64,
}

/// Owns every body, fixture, joint and contact and advances them in time.
#[derive(Debug)]
pub struct World {
    bodies: SlotMap<BodyHandle, Body>,
    fixtures: SlotMap<FixtureHandle, Fixture>,
    joints: SlotMap<JointHandle, JointEntry>,
    contact_manager: ContactManager,
    island: Island,
    gravity: Vec2,
    settings: Settings,
    /// A fixture was added since the last step; pairs must be gathered first.
    new_fixture: bool,
    /// Inverse time step of the previous step, for warm-start scaling.
    inv_dt0: f64,
    // Island search buffers, reused across steps.
    seeds: Vec<BodyHandle>,
    stack: Vec<BodyHandle>,
}

impl World {
    /// Creates a new, empty physics world with default settings.
    pub fn new(gravity: Vec2) -> Self {
        Self::build(gravity, Settings::default(), Box::new(GridBroadPhase::new(DEFAULT_CELL_SIZE)))
    }

    /// Creates a world with custom solver settings.
    pub fn with_settings(gravity: Vec2, settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::build(gravity, settings, Box::new(GridBroadPhase::new(DEFAULT_CELL_SIZE))))
    }

    /// Creates a world around a caller-provided broad phase.
    pub fn with_broad_phase(
        gravity: Vec2,
        settings: Settings,
        broad_phase: Box<dyn BroadPhase<FixtureProxy>>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self::build(gravity, settings, broad_phase))
    }

    fn build(gravity: Vec2, settings: Settings, broad_phase: Box<dyn BroadPhase<FixtureProxy>>) -> Self {
        info!(?gravity, ?settings, "world created");
        Self {
            bodies: SlotMap::with_key(),
            fixtures: SlotMap::with_key(),
            joints: SlotMap::with_key(),
            contact_manager: ContactManager::new(broad_phase),
            island: Island::default(),
            gravity,
            settings,
            new_fixture: false,
            inv_dt0: 0.0,
            seeds: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: Settings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    /// Installs the observer that receives contact events during `step`.
    pub fn set_contact_listener(&mut self, listener: Box<dyn ContactListener>) {
        self.contact_manager.listener = Some(listener);
    }

    pub fn clear_contact_listener(&mut self) {
        self.contact_manager.listener = None;
    }

    /// Replaces the default category/mask/group filtering.
    pub fn set_contact_filter(&mut self, filter: Box<dyn ContactFilter>) {
        self.contact_manager.filter = Some(filter);
    }

    // ---- bodies ----

    pub fn create_body(&mut self, def: &BodyDef) -> BodyHandle {
        let handle = self.bodies.insert(Body::new(def));
        debug!(body = ?handle, body_type = ?def.body_type, "body created");
        handle
    }

    /// Destroys a body with its fixtures and joints. Touching contacts report
    /// `end_contact` before they go.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<()> {
        let body = self.bodies.get(handle).ok_or(PhysicsError::UnknownBody)?;
        let joint_edges = body.joint_edges.clone();

        // Joints never join a body to itself, so each edge names a distinct live joint.
        for edge in joint_edges {
            self.destroy_joint(edge.joint)?;
        }

        let mut cursor = self.bodies.get(handle).and_then(|b| b.contact_list);
        while let Some(contact) = cursor {
            cursor = self
                .contact_manager
                .contacts
                .get(contact)
                .and_then(|c| c.edge_for(handle).next);
            self.contact_manager.destroy(contact, &mut self.bodies);
        }

        let fixtures = self
            .bodies
            .get_mut(handle)
            .map(|b| std::mem::take(&mut b.fixtures))
            .unwrap_or_default();
        for fixture in fixtures {
            if let Some(mut fixture) = self.fixtures.remove(fixture) {
                fixture.destroy_proxies(self.contact_manager.broad_phase.as_mut());
            }
        }

        self.bodies.remove(handle);
        debug!(body = ?handle, "body destroyed");
        Ok(())
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleports a body. Velocities are kept and contacts are refreshed lazily.
    pub fn set_transform(&mut self, handle: BodyHandle, position: Vec2, angle: f64) -> Result<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::UnknownBody)?;
        body.set_transform_internal(position, angle);
        body.synchronize_fixtures(&mut self.fixtures, self.contact_manager.broad_phase.as_mut());
        self.contact_manager.find_new_contacts(&mut self.bodies, &self.fixtures);
        Ok(())
    }

    pub fn clear_forces(&mut self) {
        for body in self.bodies.values_mut() {
            body.clear_forces();
        }
    }

    // ---- fixtures ----

    /// Attaches a shape to a body. Contacts for it appear on the next step.
    pub fn create_fixture(&mut self, body: BodyHandle, def: FixtureDef) -> Result<FixtureHandle> {
        let owner = self.bodies.get(body).ok_or(PhysicsError::UnknownBody)?;
        let xf = owner.xf;
        let has_density = def.material.density > 0.0;

        let handle = self.fixtures.insert(Fixture::new(body, def));
        if let Some(fixture) = self.fixtures.get_mut(handle) {
            fixture.create_proxies(handle, self.contact_manager.broad_phase.as_mut(), &xf);
        }

        if let Some(owner) = self.bodies.get_mut(body) {
            owner.fixtures.push(handle);
            if has_density {
                owner.reset_mass_data(&self.fixtures);
            }
        }

        self.new_fixture = true;
        Ok(handle)
    }

    /// Removes a fixture, its proxies and every contact that references it.
    pub fn destroy_fixture(&mut self, handle: FixtureHandle) -> Result<()> {
        let body = self.fixtures.get(handle).ok_or(PhysicsError::UnknownFixture)?.body;

        let mut doomed = Vec::new();
        let mut cursor = self.bodies.get(body).and_then(|b| b.contact_list);
        while let Some(contact) = cursor {
            let Some(c) = self.contact_manager.contacts.get(contact) else {
                break;
            };
            if c.fixture_a == handle || c.fixture_b == handle {
                doomed.push(contact);
            }
            cursor = c.edge_for(body).next;
        }
        for contact in doomed {
            self.contact_manager.destroy(contact, &mut self.bodies);
        }

        if let Some(mut fixture) = self.fixtures.remove(handle) {
            fixture.destroy_proxies(self.contact_manager.broad_phase.as_mut());
        }
        if let Some(owner) = self.bodies.get_mut(body) {
            owner.fixtures.retain(|f| *f != handle);
            owner.reset_mass_data(&self.fixtures);
        }
        Ok(())
    }

    pub fn fixture(&self, handle: FixtureHandle) -> Option<&Fixture> {
        self.fixtures.get(handle)
    }

    pub fn fixture_mut(&mut self, handle: FixtureHandle) -> Option<&mut Fixture> {
        self.fixtures.get_mut(handle)
    }

    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    /// Changes a fixture's density and recomputes its body's mass.
    pub fn set_density(&mut self, handle: FixtureHandle, density: f64) -> Result<()> {
        let fixture = self.fixtures.get_mut(handle).ok_or(PhysicsError::UnknownFixture)?;
        fixture.material.density = density.max(0.0);
        let body = fixture.body;
        if let Some(owner) = self.bodies.get_mut(body) {
            owner.reset_mass_data(&self.fixtures);
        }
        Ok(())
    }

    /// Replaces a fixture's collision filter. Existing contacts are re-filtered on
    /// the next step and the proxies are re-paired.
    pub fn set_filter(&mut self, handle: FixtureHandle, filter: Filter) -> Result<()> {
        let fixture = self.fixtures.get_mut(handle).ok_or(PhysicsError::UnknownFixture)?;
        fixture.filter = filter;
        let body = fixture.body;
        fixture.touch_proxies(self.contact_manager.broad_phase.as_mut());

        let mut cursor = self.bodies.get(body).and_then(|b| b.contact_list);
        while let Some(contact) = cursor {
            let Some(c) = self.contact_manager.contacts.get_mut(contact) else {
                break;
            };
            if c.fixture_a == handle || c.fixture_b == handle {
                c.flag_for_filtering();
            }
            cursor = c.edge_for(body).next;
        }
        Ok(())
    }

    // ---- joints ----

    pub fn create_joint(&mut self, def: impl Into<JointDef>) -> Result<JointHandle> {
        let def = def.into();
        let (body_a, body_b) = (def.body_a(), def.body_b());
        if body_a == body_b {
            return Err(PhysicsError::SelfJoint);
        }
        if !self.bodies.contains_key(body_a) || !self.bodies.contains_key(body_b) {
            return Err(PhysicsError::UnknownBody);
        }

        let collide_connected = def.collide_connected();
        let handle = self.joints.insert(JointEntry::new(def.into_joint()));

        for (owner, other) in [(body_a, body_b), (body_b, body_a)] {
            if let Some(body) = self.bodies.get_mut(owner) {
                body.joint_edges.push(JointEdge {
                    joint: handle,
                    other,
                    collide_connected,
                });
            }
        }

        if !collide_connected {
            self.flag_contacts_between(body_a, body_b);
        }

        debug!(joint = ?handle, ?body_a, ?body_b, "joint created");
        Ok(handle)
    }

    pub fn destroy_joint(&mut self, handle: JointHandle) -> Result<()> {
        let entry = self.joints.remove(handle).ok_or(PhysicsError::UnknownJoint)?;
        let (body_a, body_b) = (entry.joint.body_a(), entry.joint.body_b());

        for owner in [body_a, body_b] {
            if let Some(body) = self.bodies.get_mut(owner) {
                body.joint_edges.retain(|edge| edge.joint != handle);
                body.set_awake(true);
            }
        }

        if !entry.joint.collide_connected() {
            self.flag_contacts_between(body_a, body_b);
        }

        debug!(joint = ?handle, "joint destroyed");
        Ok(())
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&dyn Joint> {
        self.joints.get(handle).map(|entry| entry.joint.as_ref())
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    fn flag_contacts_between(&mut self, body_a: BodyHandle, body_b: BodyHandle) {
        let mut cursor = self.bodies.get(body_b).and_then(|b| b.contact_list);
        while let Some(contact) = cursor {
            let Some(c) = self.contact_manager.contacts.get_mut(contact) else {
                break;
            };
            let edge = *c.edge_for(body_b);
            if edge.other == body_a {
                c.flag_for_filtering();
            }
            cursor = edge.next;
        }
    }

    // ---- contacts ----

    pub fn contact(&self, handle: ContactHandle) -> Option<&Contact> {
        self.contact_manager.contact(handle)
    }

    pub fn contacts(&self) -> impl Iterator<Item = (ContactHandle, &Contact)> {
        self.contact_manager.contacts()
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    pub fn contact_manager(&self) -> &ContactManager {
        &self.contact_manager
    }

    /// World-space normal and points of a contact at the current transforms.
    pub fn world_manifold(&self, handle: ContactHandle) -> Option<WorldManifold> {
        let contact = self.contact_manager.contacts.get(handle)?;
        let fixture_a = self.fixtures.get(contact.fixture_a)?;
        let fixture_b = self.fixtures.get(contact.fixture_b)?;
        let body_a = self.bodies.get(contact.body_a)?;
        let body_b = self.bodies.get(contact.body_b)?;
        Some(contact.world_manifold(
            &body_a.xf,
            fixture_a.shape.radius(),
            &body_b.xf,
            fixture_b.shape.radius(),
        ))
    }

    // ---- queries ----

    /// Reports every fixture whose broad-phase box overlaps `aabb`. Return false from
    /// the callback to stop early.
    pub fn query_aabb<F>(&self, aabb: &AABB, mut callback: F)
    where
        F: FnMut(FixtureHandle) -> bool,
    {
        let broad_phase = self.contact_manager.broad_phase.as_ref();
        broad_phase.query(aabb, &mut |id| callback(broad_phase.user_data(id).fixture));
    }

    /// Casts a ray from `p1` to `p2` against every fixture it may hit.
    ///
    /// The callback receives the fixture, hit point, normal and fraction, and
    /// returns how to continue: a negative value ignores the hit, zero stops the
    /// cast, a fraction clips the ray to that point, and one keeps going.
    pub fn ray_cast<F>(&self, p1: Vec2, p2: Vec2, mut callback: F)
    where
        F: FnMut(FixtureHandle, Vec2, Vec2, f64) -> f64,
    {
        let mut input = RayCastInput::new(p1, p2);
        let broad_phase = self.contact_manager.broad_phase.as_ref();

        let mut candidates = Vec::new();
        broad_phase.query(&AABB::new(p1, p2), &mut |id| {
            candidates.push(id);
            true
        });

        for id in candidates {
            let proxy = broad_phase.user_data(id);
            let Some(fixture) = self.fixtures.get(proxy.fixture) else {
                continue;
            };
            let Some(body) = self.bodies.get(fixture.body) else {
                continue;
            };
            let Some(output) = fixture.ray_cast(&input, &body.xf, proxy.child_index) else {
                continue;
            };

            let point = input.point_at(output.fraction);
            let value = callback(proxy.fixture, point, output.normal, output.fraction);
            if value == 0.0 {
                return;
            }
            if value > 0.0 && value < input.max_fraction {
                input.max_fraction = value;
            }
        }
    }

    /// Nearest fixture hit along the segment, if any.
    pub fn ray_cast_closest(&self, p1: Vec2, p2: Vec2) -> Option<RayHit> {
        let mut closest = None;
        self.ray_cast(p1, p2, |fixture, point, normal, fraction| {
            closest = Some(RayHit {
                fixture,
                point,
                normal,
                fraction,
            });
            fraction
        });
        closest
    }

    // ---- stepping ----

    /// Advances the simulation by `dt` seconds.
    ///
    /// Gathers new pairs, updates contacts, solves every awake island and then
    /// sweeps fast bodies back to their first impact. A non-positive `dt` does
    /// nothing; a non-finite one is an error.
    pub fn step(&mut self, dt: f64) -> Result<StepStats> {
        if !dt.is_finite() {
            return Err(PhysicsError::InvalidTimeStep(dt));
        }
        let mut stats = StepStats::default();
        if dt <= 0.0 {
            return Ok(stats);
        }

        if self.new_fixture {
            self.contact_manager.find_new_contacts(&mut self.bodies, &self.fixtures);
            self.new_fixture = false;
        }

        let step = TimeStep {
            dt,
            inv_dt: 1.0 / dt,
            dt_ratio: self.inv_dt0 * dt,
            velocity_iterations: self.settings.velocity_iterations,
            position_iterations: self.settings.position_iterations,
            warm_starting: self.settings.enable_warm_starting,
        };

        self.contact_manager.collide(&mut self.bodies, &self.fixtures);

        stats.island_count = self.solve(&step);

        if self.settings.continuous_physics {
            stats.toi_events = self.solve_toi(&step);
        }

        self.inv_dt0 = step.inv_dt;

        if self.settings.auto_clear_forces {
            self.clear_forces();
        }

        stats.contact_count = self.contact_manager.contact_count();
        Ok(stats)
    }

    /// Builds islands by depth-first search over touching contacts and joints and
    /// solves each one. Static bodies end the search so they can join several
    /// islands.
    fn solve(&mut self, step: &TimeStep) -> usize {
        let Self {
            bodies,
            fixtures,
            joints,
            contact_manager,
            island,
            gravity,
            settings,
            seeds,
            stack,
            ..
        } = self;

        for body in bodies.values_mut() {
            body.island_flag = false;
        }
        for contact in contact_manager.contacts.values_mut() {
            contact.island_flag = false;
        }
        for entry in joints.values_mut() {
            entry.island_flag = false;
        }

        let mut island_count = 0;
        seeds.clear();
        seeds.extend(bodies.keys());

        for &seed in seeds.iter() {
            match bodies.get_mut(seed) {
                Some(body) if !body.island_flag && body.awake && !body.is_static() => body.island_flag = true,
                _ => continue,
            }

            island.clear();
            stack.clear();
            stack.push(seed);

            while let Some(handle) = stack.pop() {
                let Some(body) = bodies.get_mut(handle) else {
                    continue;
                };
                island.add_body(handle, body);
                body.set_awake(true);

                // Do not propagate islands across static bodies.
                if body.is_static() {
                    continue;
                }

                let mut cursor = body.contact_list;
                let joint_count = body.joint_edges.len();

                while let Some(contact_handle) = cursor {
                    let Some(contact) = contact_manager.contacts.get_mut(contact_handle) else {
                        break;
                    };
                    let edge = *contact.edge_for(handle);
                    cursor = edge.next;

                    if contact.island_flag || !contact.enabled || !contact.touching {
                        continue;
                    }
                    let sensor = [contact.fixture_a, contact.fixture_b]
                        .iter()
                        .any(|f| fixtures.get(*f).is_some_and(|f| f.is_sensor));
                    if sensor {
                        continue;
                    }

                    contact.island_flag = true;
                    island.add_contact(contact_handle);

                    if let Some(other) = bodies.get_mut(edge.other) {
                        if !other.island_flag {
                            other.island_flag = true;
                            stack.push(edge.other);
                        }
                    }
                }

                for i in 0..joint_count {
                    let Some(edge) = bodies.get(handle).and_then(|b| b.joint_edges.get(i)).copied() else {
                        break;
                    };
                    let Some(entry) = joints.get_mut(edge.joint) else {
                        continue;
                    };
                    if entry.island_flag {
                        continue;
                    }
                    entry.island_flag = true;
                    island.add_joint(edge.joint);

                    if let Some(other) = bodies.get_mut(edge.other) {
                        if !other.island_flag {
                            other.island_flag = true;
                            stack.push(edge.other);
                        }
                    }
                }
            }

            let mut ctx = IslandContext {
                bodies: &mut *bodies,
                fixtures: &*fixtures,
                contacts: &mut contact_manager.contacts,
                joints: &mut *joints,
                listener: listener_mut(&mut contact_manager.listener),
            };
            island.solve(step, *gravity, settings, &mut ctx);
            island_count += 1;

            // Static bodies may take part in other islands.
            for &handle in &island.bodies {
                if let Some(body) = bodies.get_mut(handle) {
                    if body.is_static() {
                        body.island_flag = false;
                    }
                }
            }
        }

        for body in bodies.values() {
            if !body.island_flag || body.is_static() {
                continue;
            }
            body.synchronize_fixtures(fixtures, contact_manager.broad_phase.as_mut());
        }
        contact_manager.find_new_contacts(bodies, fixtures);

        island_count
    }

    /// Earliest time of impact over all contacts that involve a bullet or a
    /// non-dynamic body. Results are cached on the contact until its bodies move.
    fn find_min_toi(
        bodies: &mut SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
        contacts: &mut SlotMap<ContactHandle, Contact>,
        settings: &Settings,
    ) -> Option<(ContactHandle, f64)> {
        let mut min_contact = None;
        let mut min_alpha = 1.0;

        for (handle, contact) in contacts.iter_mut() {
            if !contact.enabled || contact.toi_count > settings.max_sub_steps {
                continue;
            }

            let alpha = if contact.toi_flag {
                contact.toi
            } else {
                let (Some(fixture_a), Some(fixture_b)) =
                    (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
                else {
                    continue;
                };
                if fixture_a.is_sensor || fixture_b.is_sensor {
                    continue;
                }

                let (Some(a), Some(b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
                    continue;
                };
                if !a.is_active() && !b.is_active() {
                    continue;
                }
                // Dynamic pairs only sweep when one of them is a bullet.
                let collide_a = a.bullet || !a.is_dynamic();
                let collide_b = b.bullet || !b.is_dynamic();
                if !collide_a && !collide_b {
                    continue;
                }

                // Put both sweeps on the same time interval.
                let (alpha0_a, alpha0_b) = (a.sweep.alpha0, b.sweep.alpha0);
                let alpha0 = alpha0_a.max(alpha0_b);
                if alpha0_a < alpha0 {
                    if let Some(a) = bodies.get_mut(contact.body_a) {
                        a.sweep.advance(alpha0);
                    }
                } else if alpha0_b < alpha0 {
                    if let Some(b) = bodies.get_mut(contact.body_b) {
                        b.sweep.advance(alpha0);
                    }
                }
                debug_assert!(alpha0 < 1.0);

                let (Some(a), Some(b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
                    continue;
                };
                let output = time_of_impact(&ToiInput {
                    proxy_a: DistanceProxy::new(&fixture_a.shape, contact.child_a),
                    proxy_b: DistanceProxy::new(&fixture_b.shape, contact.child_b),
                    sweep_a: a.sweep,
                    sweep_b: b.sweep,
                    t_max: 1.0,
                });

                let alpha = if output.state == ToiState::Touching {
                    (alpha0 + (1.0 - alpha0) * output.t).min(1.0)
                } else {
                    1.0
                };
                contact.toi = alpha;
                contact.toi_flag = true;
                alpha
            };

            if alpha < min_alpha {
                min_alpha = alpha;
                min_contact = Some(handle);
            }
        }

        match min_contact {
            Some(handle) if min_alpha < 1.0 - 10.0 * EPSILON => Some((handle, min_alpha)),
            _ => None,
        }
    }

    /// Resolves impacts one at a time in time order. Each event moves the two bodies
    /// back to the impact, solves a small island around them and lets them continue
    /// for the rest of the step.
    fn solve_toi(&mut self, step: &TimeStep) -> usize {
        let Self {
            bodies,
            fixtures,
            joints,
            contact_manager,
            island,
            settings,
            ..
        } = self;

        for body in bodies.values_mut() {
            body.island_flag = false;
            body.sweep.alpha0 = 0.0;
        }
        for contact in contact_manager.contacts.values_mut() {
            contact.toi_flag = false;
            contact.island_flag = false;
            contact.toi_count = 0;
            contact.toi = 1.0;
        }

        let mut toi_events = 0;
        loop {
            let Some((min_contact, min_alpha)) =
                Self::find_min_toi(bodies, fixtures, &mut contact_manager.contacts, settings)
            else {
                break;
            };

            let Some(contact) = contact_manager.contacts.get(min_contact) else {
                break;
            };
            let (handle_a, handle_b) = (contact.body_a, contact.body_b);
            let (Some(backup_a), Some(backup_b)) = (
                bodies.get(handle_a).map(|b| b.sweep),
                bodies.get(handle_b).map(|b| b.sweep),
            ) else {
                break;
            };

            for handle in [handle_a, handle_b] {
                if let Some(body) = bodies.get_mut(handle) {
                    body.advance(min_alpha);
                }
            }

            // The contact may have changed or been disabled at the new poses.
            contact_manager.update_contact(min_contact, bodies, fixtures);
            let Some(contact) = contact_manager.contacts.get_mut(min_contact) else {
                break;
            };
            contact.toi_flag = false;
            contact.toi_count += 1;
            if contact.toi_count > settings.max_sub_steps {
                warn!(contact = ?min_contact, max_sub_steps = settings.max_sub_steps, "TOI sub-step budget exhausted");
            }

            if !contact.enabled || !contact.touching {
                // Restore the sweeps; this contact sits out the rest of the step.
                contact.enabled = false;
                for (handle, backup) in [(handle_a, backup_a), (handle_b, backup_b)] {
                    if let Some(body) = bodies.get_mut(handle) {
                        body.sweep = backup;
                        body.synchronize_transform();
                    }
                }
                continue;
            }
            contact.island_flag = true;

            island.clear();
            for handle in [handle_a, handle_b] {
                if let Some(body) = bodies.get_mut(handle) {
                    body.set_awake(true);
                    body.island_flag = true;
                    island.add_body(handle, body);
                }
            }
            island.add_contact(min_contact);

            // Pull in static and bullet neighbours of the two bodies.
            for handle in [handle_a, handle_b] {
                let Some(body) = bodies.get(handle) else {
                    continue;
                };
                if !body.is_dynamic() {
                    continue;
                }
                let bullet = body.bullet;
                let mut cursor = body.contact_list;

                while let Some(contact_handle) = cursor {
                    if island.bodies.len() == 2 * MAX_TOI_CONTACTS || island.contacts.len() == MAX_TOI_CONTACTS {
                        break;
                    }

                    let Some(contact) = contact_manager.contacts.get(contact_handle) else {
                        break;
                    };
                    let edge = *contact.edge_for(handle);
                    cursor = edge.next;

                    if contact.island_flag {
                        continue;
                    }
                    let other_handle = edge.other;
                    let Some(other) = bodies.get(other_handle) else {
                        continue;
                    };
                    if other.is_dynamic() && !bullet && !other.bullet {
                        continue;
                    }
                    let sensor = [contact.fixture_a, contact.fixture_b]
                        .iter()
                        .any(|f| fixtures.get(*f).is_some_and(|f| f.is_sensor));
                    if sensor {
                        continue;
                    }

                    let backup = other.sweep;
                    let other_in_island = other.island_flag;
                    if !other_in_island {
                        if let Some(other) = bodies.get_mut(other_handle) {
                            other.advance(min_alpha);
                        }
                    }

                    contact_manager.update_contact(contact_handle, bodies, fixtures);
                    let Some(contact) = contact_manager.contacts.get_mut(contact_handle) else {
                        continue;
                    };
                    if !contact.enabled || !contact.touching {
                        if let Some(other) = bodies.get_mut(other_handle) {
                            other.sweep = backup;
                            other.synchronize_transform();
                        }
                        continue;
                    }

                    contact.island_flag = true;
                    island.add_contact(contact_handle);

                    if other_in_island {
                        continue;
                    }
                    if let Some(other) = bodies.get_mut(other_handle) {
                        other.island_flag = true;
                        if !other.is_static() {
                            other.set_awake(true);
                        }
                        island.add_body(other_handle, other);
                    }
                }
            }

            let dt = (1.0 - min_alpha) * step.dt;
            let sub_step = TimeStep {
                dt,
                inv_dt: 1.0 / dt,
                dt_ratio: 1.0,
                velocity_iterations: settings.toi_velocity_iterations,
                position_iterations: settings.toi_position_iterations,
                warm_starting: false,
            };

            let (Some(index_a), Some(index_b)) = (
                bodies.get(handle_a).map(|b| b.island_index),
                bodies.get(handle_b).map(|b| b.island_index),
            ) else {
                break;
            };

            let mut ctx = IslandContext {
                bodies: &mut *bodies,
                fixtures: &*fixtures,
                contacts: &mut contact_manager.contacts,
                joints: &mut *joints,
                listener: listener_mut(&mut contact_manager.listener),
            };
            island.solve_toi(&sub_step, settings, index_a, index_b, &mut ctx);

            // Release the island and invalidate cached TOIs around the moved bodies.
            for &handle in &island.bodies {
                let Some(body) = bodies.get_mut(handle) else {
                    continue;
                };
                body.island_flag = false;
                if !body.is_dynamic() {
                    continue;
                }
                body.synchronize_fixtures(fixtures, contact_manager.broad_phase.as_mut());

                let mut cursor = body.contact_list;
                while let Some(contact_handle) = cursor {
                    let Some(contact) = contact_manager.contacts.get_mut(contact_handle) else {
                        break;
                    };
                    contact.toi_flag = false;
                    contact.island_flag = false;
                    cursor = contact.edge_for(handle).next;
                }
            }

            // Poses changed mid-step, so new pairs may exist.
            contact_manager.find_new_contacts(bodies, fixtures);

            toi_events += 1;
            debug!(contact = ?min_contact, alpha = min_alpha, bodies = island.bodies.len(), "TOI event solved");
        }

        toi_events
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(Vec2::new(0.0, -10.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{DistanceJointDef, RevoluteJointDef};
    use crate::shapes::{Circle, Polygon};
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    const EPSILON: f64 = 1e-9;

    fn ball(world: &mut World, def: BodyDef) -> (BodyHandle, FixtureHandle) {
        let body = world.create_body(&def);
        let fixture = world
            .create_fixture(body, FixtureDef::new(Circle::new(0.5)).with_density(1.0))
            .unwrap();
        (body, fixture)
    }

    #[derive(Default)]
    struct Counts {
        begin: usize,
        end: usize,
        post_solve: usize,
    }

    struct Recorder(Rc<RefCell<Counts>>);

    impl ContactListener for Recorder {
        fn begin_contact(&mut self, _contact: &Contact) {
            self.0.borrow_mut().begin += 1;
        }

        fn end_contact(&mut self, _contact: &Contact) {
            self.0.borrow_mut().end += 1;
        }

        fn post_solve(&mut self, _contact: &Contact, _impulse: &crate::contacts::ContactImpulse) {
            self.0.borrow_mut().post_solve += 1;
        }
    }

    fn recorder(world: &mut World) -> Rc<RefCell<Counts>> {
        let counts = Rc::new(RefCell::new(Counts::default()));
        world.set_contact_listener(Box::new(Recorder(Rc::clone(&counts))));
        counts
    }

    #[test]
    fn test_world_new() {
        let world = World::new(Vec2::new(0.0, -10.0));
        assert_eq!(world.body_count(), 0);
        assert_eq!(world.contact_count(), 0);
        assert_eq!(world.joint_count(), 0);
        assert_eq!(world.gravity(), Vec2::new(0.0, -10.0));
        assert_eq!(world.settings(), &Settings::default());
    }

    #[test]
    fn test_with_settings_validates() {
        let bad = Settings::default().with_iterations(0, 3);
        assert!(matches!(
            World::with_settings(Vec2::ZERO, bad),
            Err(PhysicsError::InvalidSettings(_))
        ));
        assert!(World::with_settings(Vec2::ZERO, Settings::default().with_sleep(false)).is_ok());
    }

    #[test]
    fn test_step_gravity() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        let (body, _) = ball(&mut world, BodyDef::dynamic());

        let stats = world.step(0.1).unwrap();
        assert_eq!(stats.island_count, 1);

        let body = world.body(body).unwrap();
        assert_relative_eq!(body.linear_velocity().x, 0.0, epsilon = EPSILON);
        assert_relative_eq!(body.linear_velocity().y, -1.0, epsilon = EPSILON);
        assert_relative_eq!(body.position().y, -0.1, epsilon = EPSILON);
    }

    #[test]
    fn test_step_no_gravity_on_static() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        let (body, _) = ball(&mut world, BodyDef::static_body().with_position(Vec2::new(1.0, 2.0)));

        let stats = world.step(0.1).unwrap();
        assert_eq!(stats.island_count, 0);
        let body = world.body(body).unwrap();
        assert_eq!(body.position(), Vec2::new(1.0, 2.0));
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
    }

    #[test]
    fn test_step_rejects_non_finite_dt() {
        let mut world = World::default();
        assert!(matches!(world.step(f64::NAN), Err(PhysicsError::InvalidTimeStep(dt)) if dt.is_nan()));
        assert!(matches!(world.step(f64::INFINITY), Err(PhysicsError::InvalidTimeStep(_))));
    }

    #[test]
    fn test_non_positive_dt_is_a_no_op() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        let (body, _) = ball(&mut world, BodyDef::dynamic());
        assert_eq!(world.step(0.0).unwrap(), StepStats::default());
        assert_eq!(world.step(-1.0).unwrap(), StepStats::default());
        assert_eq!(world.body(body).unwrap().position(), Vec2::ZERO);
        assert_eq!(world.body(body).unwrap().linear_velocity(), Vec2::ZERO);
    }

    #[test]
    fn test_fixture_sets_mass() {
        let mut world = World::default();
        let body = world.create_body(&BodyDef::dynamic());
        let fixture = world
            .create_fixture(body, FixtureDef::new(Polygon::new_box(1.0, 0.5)).with_density(2.0))
            .unwrap();
        assert_relative_eq!(world.body(body).unwrap().mass(), 4.0, epsilon = EPSILON);

        world.set_density(fixture, 1.0).unwrap();
        assert_relative_eq!(world.body(body).unwrap().mass(), 2.0, epsilon = EPSILON);

        // Without massive fixtures a dynamic body falls back to unit mass.
        world.destroy_fixture(fixture).unwrap();
        assert_eq!(world.fixture_count(), 0);
        assert_relative_eq!(world.body(body).unwrap().mass(), 1.0);
        assert_eq!(world.destroy_fixture(fixture), Err(PhysicsError::UnknownFixture));
    }

    #[test]
    fn test_unknown_handles() {
        let mut world = World::default();
        let (body, _) = ball(&mut world, BodyDef::dynamic());
        world.destroy_body(body).unwrap();
        assert_eq!(world.destroy_body(body), Err(PhysicsError::UnknownBody));
        assert!(world.create_fixture(body, FixtureDef::new(Circle::new(1.0))).is_err());
        assert!(world.set_transform(body, Vec2::ZERO, 0.0).is_err());
        assert_eq!(world.fixture_count(), 0);
    }

    #[test]
    fn test_contacts_begin_and_end() {
        let mut world = World::new(Vec2::ZERO);
        let counts = recorder(&mut world);
        ball(&mut world, BodyDef::static_body());
        let (mover, _) = ball(&mut world, BodyDef::dynamic().with_position(Vec2::new(0.9, 0.0)));

        let stats = world.step(1.0 / 60.0).unwrap();
        assert_eq!(stats.contact_count, 1);
        assert_eq!(counts.borrow().begin, 1);
        assert!(counts.borrow().post_solve >= 1);

        let contact = world.contacts().next().map(|(h, _)| h).unwrap();
        let manifold = world.world_manifold(contact).unwrap();
        // Centers are level, so the normal is horizontal.
        assert_relative_eq!(manifold.normal.y, 0.0, epsilon = EPSILON);
        assert_relative_eq!(manifold.normal.x.abs(), 1.0, epsilon = EPSILON);

        world.destroy_body(mover).unwrap();
        assert_eq!(world.contact_count(), 0);
        assert_eq!(counts.borrow().end, 1);
    }

    #[test]
    fn test_self_joint_rejected() {
        let mut world = World::default();
        let (a, _) = ball(&mut world, BodyDef::dynamic());
        assert_eq!(
            world.create_joint(RevoluteJointDef::new(a, a)),
            Err(PhysicsError::SelfJoint)
        );
    }

    #[test]
    fn test_joint_disables_contact() {
        let mut world = World::new(Vec2::ZERO);
        let (a, _) = ball(&mut world, BodyDef::dynamic());
        let (b, _) = ball(&mut world, BodyDef::dynamic().with_position(Vec2::new(0.8, 0.0)));

        world.step(1.0 / 60.0).unwrap();
        assert_eq!(world.contact_count(), 1);

        let joint = world
            .create_joint(RevoluteJointDef::new(a, b).with_anchors(Vec2::new(0.4, 0.0), Vec2::new(-0.4, 0.0)))
            .unwrap();
        assert_eq!(world.body(a).unwrap().joint_edges().len(), 1);

        let stats = world.step(1.0 / 60.0).unwrap();
        assert_eq!(stats.contact_count, 0);

        world.destroy_joint(joint).unwrap();
        assert!(world.body(a).unwrap().joint_edges().is_empty());
        assert!(world.body(b).unwrap().joint_edges().is_empty());
        assert_eq!(world.destroy_joint(joint), Err(PhysicsError::UnknownJoint));
    }

    #[test]
    fn test_destroy_body_removes_joints() {
        let mut world = World::default();
        let (a, _) = ball(&mut world, BodyDef::static_body());
        let (b, _) = ball(&mut world, BodyDef::dynamic().with_position(Vec2::new(0.0, -3.0)));
        let def = DistanceJointDef::new(a, b).with_length(3.0);
        let joint = world.create_joint(def).unwrap();
        assert!(world.joint(joint).is_some());

        world.destroy_body(a).unwrap();
        assert_eq!(world.joint_count(), 0);
        assert!(world.body(b).unwrap().joint_edges().is_empty());
    }

    #[test]
    fn test_destroy_body_with_several_joints() {
        let mut world = World::default();
        let (hub, _) = ball(&mut world, BodyDef::static_body());
        let (left, _) = ball(&mut world, BodyDef::dynamic().with_position(Vec2::new(-3.0, 0.0)));
        let (right, _) = ball(&mut world, BodyDef::dynamic().with_position(Vec2::new(3.0, 0.0)));
        let (other, _) = ball(&mut world, BodyDef::dynamic().with_position(Vec2::new(0.0, 5.0)));
        world.create_joint(DistanceJointDef::new(hub, left).with_length(3.0)).unwrap();
        world.create_joint(DistanceJointDef::new(right, hub).with_length(3.0)).unwrap();
        let kept = world
            .create_joint(DistanceJointDef::new(left, other).with_length(5.0))
            .unwrap();
        assert_eq!(world.body(hub).unwrap().joint_edges().len(), 2);

        assert!(world.destroy_body(hub).is_ok());
        assert_eq!(world.joint_count(), 1);
        assert!(world.joint(kept).is_some());
        assert_eq!(world.body(left).unwrap().joint_edges().len(), 1);
        assert!(world.body(right).unwrap().joint_edges().is_empty());

        // Stepping after the teardown runs islands and TOI every time.
        let stats = world.step(1.0 / 60.0).unwrap();
        assert!(stats.island_count >= 1);
    }

    #[test]
    fn test_steps_reuse_their_buffers() {
        let mut world = World::default();
        let ground = world.create_body(&BodyDef::static_body().with_position(Vec2::new(0.0, -1.0)));
        world
            .create_fixture(ground, FixtureDef::new(Polygon::new_box(10.0, 1.0)))
            .unwrap();
        for x in [-3.0, 0.0, 3.0] {
            ball(&mut world, BodyDef::dynamic().with_position(Vec2::new(x, 0.5)));
        }

        for _ in 0..2 {
            world.step(1.0 / 60.0).unwrap();
        }
        assert_eq!(world.contact_count(), 3);
        let buffers = |w: &World| {
            (
                w.seeds.as_ptr(),
                w.stack.as_ptr(),
                w.contact_manager.handle_buffer.as_ptr(),
                w.contact_manager.pair_buffer.capacity(),
            )
        };
        let before = buffers(&world);
        assert!(world.seeds.capacity() >= 4 && world.stack.capacity() > 0);

        for _ in 0..5 {
            world.step(1.0 / 60.0).unwrap();
        }
        assert_eq!(world.contact_count(), 3);
        assert_eq!(buffers(&world), before);
    }

    #[test]
    fn test_query_aabb() {
        let mut world = World::default();
        let (_, near) = ball(&mut world, BodyDef::static_body());
        ball(&mut world, BodyDef::static_body().with_position(Vec2::new(20.0, 0.0)));

        let mut found = Vec::new();
        world.query_aabb(&AABB::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0)), |f| {
            found.push(f);
            true
        });
        assert_eq!(found, vec![near]);
    }

    #[test]
    fn test_ray_cast_closest() {
        let mut world = World::default();
        let near = world.create_body(&BodyDef::static_body().with_position(Vec2::new(5.0, 0.0)));
        let near_fixture = world
            .create_fixture(near, FixtureDef::new(Polygon::new_box(1.0, 1.0)))
            .unwrap();
        let far = world.create_body(&BodyDef::static_body().with_position(Vec2::new(8.0, 0.0)));
        world
            .create_fixture(far, FixtureDef::new(Polygon::new_box(1.0, 1.0)))
            .unwrap();

        let hit = world.ray_cast_closest(Vec2::ZERO, Vec2::new(10.0, 0.0)).unwrap();
        assert_eq!(hit.fixture, near_fixture);
        assert_relative_eq!(hit.fraction, 0.4, epsilon = EPSILON);
        assert_relative_eq!(hit.point.x, 4.0, epsilon = EPSILON);
        assert_relative_eq!(hit.normal.x, -1.0, epsilon = EPSILON);

        assert!(world.ray_cast_closest(Vec2::new(0.0, 5.0), Vec2::new(10.0, 5.0)).is_none());
    }

    #[test]
    fn test_set_transform_moves_fixtures() {
        let mut world = World::default();
        let (body, fixture) = ball(&mut world, BodyDef::dynamic());
        world.set_transform(body, Vec2::new(3.0, 4.0), 0.5).unwrap();

        let body = world.body(body).unwrap();
        assert_eq!(body.position(), Vec2::new(3.0, 4.0));
        assert_relative_eq!(body.angle(), 0.5);
        let aabb = world.fixture(fixture).unwrap().aabb(0).unwrap();
        assert!(aabb.contains(&AABB::new(Vec2::new(2.6, 3.6), Vec2::new(3.4, 4.4))));
    }
}
