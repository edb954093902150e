//! Connected groups of bodies solved together.

use slotmap::SlotMap;
use tracing::trace;

use crate::common::Settings;
use crate::constraints::{JointEntry, JointHandle, SolverBodyInfo, SolverData};
use crate::contacts::contact_solver::ContactSolver;
use crate::contacts::{Contact, ContactHandle, ContactListener};
use crate::integration::{integrate_position, integrate_velocity, Position, TimeStep, Velocity};
use crate::math::Vec2;
use crate::objects::{Body, BodyHandle, Fixture, FixtureHandle};

/// World storage an island solve reads and writes.
pub(crate) struct IslandContext<'a> {
    pub(crate) bodies: &'a mut SlotMap<BodyHandle, Body>,
    pub(crate) fixtures: &'a SlotMap<FixtureHandle, Fixture>,
    pub(crate) contacts: &'a mut SlotMap<ContactHandle, Contact>,
    pub(crate) joints: &'a mut SlotMap<JointHandle, JointEntry>,
    pub(crate) listener: Option<&'a mut dyn ContactListener>,
}

/// Index buffers of one island plus the solver copies of body state.
///
/// Rebuilt from scratch for every island; the vectors are kept to reuse their
/// allocations.
#[derive(Debug, Default)]
pub(crate) struct Island {
    pub(crate) bodies: Vec<BodyHandle>,
    pub(crate) contacts: Vec<ContactHandle>,
    pub(crate) joints: Vec<JointHandle>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
    contact_solver: ContactSolver,
}

impl Island {
    pub(crate) fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
        self.positions.clear();
        self.velocities.clear();
    }

    /// Adds a body and records its slot in the solver arrays.
    pub(crate) fn add_body(&mut self, handle: BodyHandle, body: &mut Body) {
        body.island_index = self.bodies.len();
        self.bodies.push(handle);
    }

    pub(crate) fn add_contact(&mut self, handle: ContactHandle) {
        self.contacts.push(handle);
    }

    pub(crate) fn add_joint(&mut self, handle: JointHandle) {
        self.joints.push(handle);
    }

    fn body_info(body: &Body) -> SolverBodyInfo {
        SolverBodyInfo {
            index: body.island_index,
            local_center: body.sweep.local_center,
            inv_mass: body.inv_mass,
            inv_i: body.inv_i,
        }
    }

    /// Moves contacts between two non-static bodies to the front so that contacts
    /// against static geometry are solved last.
    fn partition_contacts(&mut self, ctx: &IslandContext<'_>) {
        let mut split = 0;
        for i in 0..self.contacts.len() {
            let non_static = ctx.contacts.get(self.contacts[i]).is_some_and(|c| {
                let a = ctx.bodies.get(c.body_a).is_some_and(|b| !b.is_static());
                let b = ctx.bodies.get(c.body_b).is_some_and(|b| !b.is_static());
                a && b
            });
            if non_static {
                self.contacts.swap(i, split);
                split += 1;
            }
        }
    }

    /// Integrates, solves constraints and decides sleep for one island.
    pub(crate) fn solve(&mut self, step: &TimeStep, gravity: Vec2, settings: &Settings, ctx: &mut IslandContext<'_>) {
        let h = step.dt;

        // Velocity integration; the sweep restarts at the current state.
        self.positions.clear();
        self.velocities.clear();
        for &handle in &self.bodies {
            let Some(body) = ctx.bodies.get_mut(handle) else {
                continue;
            };
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;

            let velocity = Velocity {
                v: body.linear_velocity,
                w: body.angular_velocity,
            };
            self.positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            self.velocities.push(integrate_velocity(velocity, body, gravity, h));
        }

        self.partition_contacts(ctx);

        let contact_solver = &mut self.contact_solver;
        contact_solver.reset(*step, settings, &self.contacts, ctx.contacts, ctx.bodies, ctx.fixtures);
        contact_solver.initialize_velocity_constraints(&self.positions, &self.velocities);
        if step.warm_starting {
            contact_solver.warm_start(&mut self.velocities);
        }

        let mut data = SolverData {
            step: *step,
            positions: &mut self.positions,
            velocities: &mut self.velocities,
        };

        for &handle in &self.joints {
            let Some(entry) = ctx.joints.get_mut(handle) else {
                continue;
            };
            let (Some(a), Some(b)) = (
                ctx.bodies.get(entry.joint.body_a()),
                ctx.bodies.get(entry.joint.body_b()),
            ) else {
                continue;
            };
            let (a, b) = (Self::body_info(a), Self::body_info(b));
            entry.joint.init_velocity_constraints(&a, &b, &mut data);
        }

        for _ in 0..step.velocity_iterations {
            for &handle in &self.joints {
                if let Some(entry) = ctx.joints.get_mut(handle) {
                    entry.joint.solve_velocity_constraints(&mut data);
                }
            }
            contact_solver.solve_velocity_constraints(data.velocities);
        }

        contact_solver.store_impulses(ctx.contacts);

        // Position integration. Static bodies never move.
        for (i, &handle) in self.bodies.iter().enumerate() {
            if ctx.bodies.get(handle).is_some_and(|b| b.is_static()) {
                continue;
            }
            integrate_position(&mut data.positions[i], &mut data.velocities[i], h, settings);
        }

        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_ok = contact_solver.solve_position_constraints(data.positions, settings.contact_baumgarte);

            let mut joints_ok = true;
            for &handle in &self.joints {
                if let Some(entry) = ctx.joints.get_mut(handle) {
                    joints_ok &= entry.joint.solve_position_constraints(&mut data);
                }
            }

            if contacts_ok && joints_ok {
                position_solved = true;
                break;
            }
        }

        self.write_back(ctx);
        self.report(ctx);

        trace!(
            bodies = self.bodies.len(),
            contacts = self.contact_solver.len(),
            joints = self.joints.len(),
            position_solved,
            "island solved"
        );

        if settings.allow_sleep {
            self.update_sleep(h, settings, position_solved, ctx);
        }
    }

    fn write_back(&self, ctx: &mut IslandContext<'_>) {
        for (i, &handle) in self.bodies.iter().enumerate() {
            let Some(body) = ctx.bodies.get_mut(handle) else {
                continue;
            };
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();
        }
    }

    fn report(&self, ctx: &mut IslandContext<'_>) {
        let Some(listener) = ctx.listener.as_deref_mut() else {
            return;
        };
        for (handle, impulse) in self.contact_solver.impulses() {
            if let Some(contact) = ctx.contacts.get(handle) {
                listener.post_solve(contact, &impulse);
            }
        }
    }

    /// Puts the whole island to sleep once every body has rested long enough.
    fn update_sleep(&self, h: f64, settings: &Settings, position_solved: bool, ctx: &mut IslandContext<'_>) {
        let lin_tol_sqr = settings.linear_sleep_tolerance * settings.linear_sleep_tolerance;
        let ang_tol_sqr = settings.angular_sleep_tolerance * settings.angular_sleep_tolerance;

        let mut min_sleep_time = f64::MAX;
        for &handle in &self.bodies {
            let Some(body) = ctx.bodies.get_mut(handle) else {
                continue;
            };
            if body.is_static() {
                continue;
            }
            if !body.auto_sleep
                || body.angular_velocity * body.angular_velocity > ang_tol_sqr
                || body.linear_velocity.dot(body.linear_velocity) > lin_tol_sqr
            {
                body.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                body.sleep_time += h;
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }

        if min_sleep_time >= settings.time_to_sleep && position_solved {
            for &handle in &self.bodies {
                if let Some(body) = ctx.bodies.get_mut(handle) {
                    body.set_awake(false);
                }
            }
        }
    }

    /// Resolves one time-of-impact event.
    ///
    /// Only the two bodies at `toi_index_a` and `toi_index_b` are moved by the
    /// position pass. Their sweeps then restart at the corrected poses and the
    /// velocity solve runs without warm starting. Impulses are not stored.
    pub(crate) fn solve_toi(
        &mut self,
        sub_step: &TimeStep,
        settings: &Settings,
        toi_index_a: usize,
        toi_index_b: usize,
        ctx: &mut IslandContext<'_>,
    ) {
        debug_assert!(toi_index_a < self.bodies.len() && toi_index_b < self.bodies.len());

        self.positions.clear();
        self.velocities.clear();
        for &handle in &self.bodies {
            let Some(body) = ctx.bodies.get(handle) else {
                continue;
            };
            self.positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            self.velocities.push(Velocity {
                v: body.linear_velocity,
                w: body.angular_velocity,
            });
        }

        let contact_solver = &mut self.contact_solver;
        contact_solver.reset(*sub_step, settings, &self.contacts, ctx.contacts, ctx.bodies, ctx.fixtures);

        for _ in 0..settings.toi_position_iterations {
            if contact_solver.solve_toi_position_constraints(
                &mut self.positions,
                settings.toi_baumgarte,
                toi_index_a,
                toi_index_b,
            ) {
                break;
            }
        }

        // Leap of faith: the corrected poses become the new sweep start.
        for index in [toi_index_a, toi_index_b] {
            if let Some(body) = ctx.bodies.get_mut(self.bodies[index]) {
                body.sweep.c0 = self.positions[index].c;
                body.sweep.a0 = self.positions[index].a;
            }
        }

        contact_solver.initialize_velocity_constraints(&self.positions, &self.velocities);
        for _ in 0..settings.toi_velocity_iterations {
            contact_solver.solve_velocity_constraints(&mut self.velocities);
        }

        let h = sub_step.dt;
        for i in 0..self.bodies.len() {
            integrate_position(&mut self.positions[i], &mut self.velocities[i], h, settings);
        }

        self.write_back(ctx);
        self.report(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{BodyDef, FixtureDef};
    use crate::shapes::Circle;

    struct Storage {
        bodies: SlotMap<BodyHandle, Body>,
        fixtures: SlotMap<FixtureHandle, Fixture>,
        contacts: SlotMap<ContactHandle, Contact>,
        joints: SlotMap<JointHandle, JointEntry>,
    }

    impl Storage {
        fn new() -> Self {
            Self {
                bodies: SlotMap::with_key(),
                fixtures: SlotMap::with_key(),
                contacts: SlotMap::with_key(),
                joints: SlotMap::with_key(),
            }
        }

        fn body(&mut self, def: BodyDef) -> BodyHandle {
            let handle = self.bodies.insert(Body::new(&def));
            let fixture = self
                .fixtures
                .insert(Fixture::new(handle, FixtureDef::new(Circle::new(0.5)).with_density(1.0)));
            let body = &mut self.bodies[handle];
            body.fixtures.push(fixture);
            body.reset_mass_data(&self.fixtures);
            handle
        }

        fn ctx(&mut self) -> IslandContext<'_> {
            IslandContext {
                bodies: &mut self.bodies,
                fixtures: &self.fixtures,
                contacts: &mut self.contacts,
                joints: &mut self.joints,
                listener: None,
            }
        }
    }

    fn contact_between(storage: &mut Storage, a: BodyHandle, b: BodyHandle) -> ContactHandle {
        let fixture_a = storage.bodies[a].fixtures[0];
        let fixture_b = storage.bodies[b].fixtures[0];
        let contact = Contact::new(
            fixture_a,
            &storage.fixtures[fixture_a],
            0,
            fixture_b,
            &storage.fixtures[fixture_b],
            0,
        )
        .unwrap();
        storage.contacts.insert(contact)
    }

    fn island_of(storage: &mut Storage, handles: &[BodyHandle]) -> Island {
        let mut island = Island::default();
        for &h in handles {
            island.add_body(h, &mut storage.bodies[h]);
        }
        island
    }

    #[test]
    fn test_static_contacts_are_solved_last() {
        let mut storage = Storage::new();
        let d1 = storage.body(BodyDef::dynamic());
        let d2 = storage.body(BodyDef::dynamic().with_position(Vec2::new(0.9, 0.0)));
        let d3 = storage.body(BodyDef::dynamic().with_position(Vec2::new(1.8, 0.0)));
        let ground = storage.body(BodyDef::static_body().with_position(Vec2::new(0.0, -1.0)));

        let order = [
            contact_between(&mut storage, d1, ground),
            contact_between(&mut storage, d1, d2),
            contact_between(&mut storage, ground, d3),
            contact_between(&mut storage, d2, d3),
            contact_between(&mut storage, d2, ground),
        ];
        let mut island = island_of(&mut storage, &[d1, d2, d3, ground]);
        for &c in &order {
            island.add_contact(c);
        }

        let ctx = storage.ctx();
        island.partition_contacts(&ctx);

        let touches_static: Vec<bool> = island
            .contacts
            .iter()
            .map(|&c| {
                let contact = &ctx.contacts[c];
                ctx.bodies[contact.body_a].is_static() || ctx.bodies[contact.body_b].is_static()
            })
            .collect();
        assert_eq!(touches_static, vec![false, false, true, true, true]);

        let mut sorted = island.contacts.clone();
        sorted.sort();
        let mut expected = order.to_vec();
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_free_fall_integrates() {
        let mut storage = Storage::new();
        let ball = storage.body(BodyDef::dynamic());
        let mut island = island_of(&mut storage, &[ball]);
        let step = TimeStep::new(0.1);
        let settings = Settings::default();
        island.solve(&step, Vec2::new(0.0, -10.0), &settings, &mut storage.ctx());

        let body = &storage.bodies[ball];
        assert!((body.linear_velocity().y + 1.0).abs() < 1e-12);
        assert!((body.world_center().y + 0.1).abs() < 1e-12);
        assert_eq!(body.sweep.c0, Vec2::ZERO);
        assert!(body.is_awake());
    }

    #[test]
    fn test_resting_island_falls_asleep() {
        let mut storage = Storage::new();
        let ball = storage.body(BodyDef::dynamic());
        let ground = storage.body(BodyDef::static_body().with_position(Vec2::new(0.0, -2.0)));
        let mut island = island_of(&mut storage, &[ball, ground]);
        let settings = Settings::default();
        let step = TimeStep::new(0.2);

        for _ in 0..2 {
            island.solve(&step, Vec2::ZERO, &settings, &mut storage.ctx());
            assert!(storage.bodies[ball].is_awake());
        }
        island.solve(&step, Vec2::ZERO, &settings, &mut storage.ctx());
        assert!(!storage.bodies[ball].is_awake());
    }

    #[test]
    fn test_sleep_disallowed_keeps_body_awake() {
        let mut storage = Storage::new();
        let ball = storage.body(BodyDef::dynamic().with_sleep(false));
        let mut island = island_of(&mut storage, &[ball]);
        let settings = Settings::default();
        let step = TimeStep::new(0.5);
        for _ in 0..4 {
            island.solve(&step, Vec2::ZERO, &settings, &mut storage.ctx());
        }
        assert!(storage.bodies[ball].is_awake());
        assert_eq!(storage.bodies[ball].sleep_time, 0.0);
    }
}
