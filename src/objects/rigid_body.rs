use slotmap::SlotMap;

use crate::collision::BroadPhase;
use crate::constraints::JointEdge;
use crate::contacts::ContactHandle;
use crate::math::{Sweep, Transform, Vec2};

use super::{BodyHandle, Fixture, FixtureHandle, FixtureProxy};

/// How a body takes part in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyType {
    /// Zero velocity, infinite mass. Moved only by the user.
    #[default]
    Static,
    /// Moves with a user-set velocity, infinite mass, unaffected by forces.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Construction parameters of a [`Body`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BodyDef {
    pub body_type: BodyType,
    /// World position of the body origin.
    pub position: Vec2,
    pub angle: f64,
    pub linear_velocity: Vec2,
    pub angular_velocity: f64,
    pub linear_damping: f64,
    pub angular_damping: f64,
    /// Whether this body may fall asleep.
    pub allow_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    /// Fast body that gets continuous collision against other dynamic bodies too.
    pub bullet: bool,
    pub ignore_gravity: bool,
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            ignore_gravity: false,
            user_data: 0,
        }
    }
}

impl BodyDef {
    pub fn new(body_type: BodyType) -> Self {
        Self {
            body_type,
            ..Self::default()
        }
    }

    pub fn dynamic() -> Self {
        Self::new(BodyType::Dynamic)
    }

    pub fn static_body() -> Self {
        Self::new(BodyType::Static)
    }

    pub fn kinematic() -> Self {
        Self::new(BodyType::Kinematic)
    }

    #[must_use]
    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    #[must_use]
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    #[must_use]
    pub fn with_linear_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = velocity;
        self
    }

    #[must_use]
    pub fn with_angular_velocity(mut self, velocity: f64) -> Self {
        self.angular_velocity = velocity;
        self
    }

    #[must_use]
    pub fn with_damping(mut self, linear: f64, angular: f64) -> Self {
        self.linear_damping = linear.max(0.0);
        self.angular_damping = angular.max(0.0);
        self
    }

    #[must_use]
    pub fn with_bullet(mut self, bullet: bool) -> Self {
        self.bullet = bullet;
        self
    }

    #[must_use]
    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    #[must_use]
    pub fn with_gravity_ignored(mut self, ignore: bool) -> Self {
        self.ignore_gravity = ignore;
        self
    }

    #[must_use]
    pub fn with_sleep(mut self, allow_sleep: bool) -> Self {
        self.allow_sleep = allow_sleep;
        self
    }

    #[must_use]
    pub fn with_awake(mut self, awake: bool) -> Self {
        self.awake = awake;
        self
    }

    #[must_use]
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

/// A rigid body: position, velocity and mass, plus the bookkeeping that links it to
/// its fixtures, contacts and joints.
///
/// Bodies are owned by a [`World`](crate::world::World) and addressed through
/// [`BodyHandle`]. Mass properties are derived from the attached fixtures.
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) body_type: BodyType,

    // Origin transform and center-of-mass sweep.
    pub(crate) xf: Transform,
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f64,

    pub(crate) force: Vec2,
    pub(crate) torque: f64,

    pub(crate) mass: f64,
    pub(crate) inv_mass: f64,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f64,
    pub(crate) inv_i: f64,

    pub(crate) linear_damping: f64,
    pub(crate) angular_damping: f64,

    pub(crate) sleep_time: f64,
    pub(crate) awake: bool,
    pub(crate) auto_sleep: bool,
    pub(crate) bullet: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) ignore_gravity: bool,

    pub(crate) island_flag: bool,
    pub(crate) island_index: usize,

    pub(crate) fixtures: Vec<FixtureHandle>,
    /// Head of this body's contact list.
    pub(crate) contact_list: Option<ContactHandle>,
    pub(crate) joint_edges: Vec<JointEdge>,

    pub user_data: u64,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: xf.position,
            c: xf.position,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };

        let (mass, inv_mass) = match def.body_type {
            BodyType::Dynamic => (1.0, 1.0),
            _ => (0.0, 0.0),
        };

        let (linear_velocity, angular_velocity) = match def.body_type {
            BodyType::Static => (Vec2::ZERO, 0.0),
            _ => (def.linear_velocity, def.angular_velocity),
        };

        Self {
            body_type: def.body_type,
            xf,
            sweep,
            linear_velocity,
            angular_velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            mass,
            inv_mass,
            inertia: 0.0,
            inv_i: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            sleep_time: 0.0,
            awake: def.awake,
            auto_sleep: def.allow_sleep,
            bullet: def.bullet,
            fixed_rotation: def.fixed_rotation,
            ignore_gravity: def.ignore_gravity,
            island_flag: false,
            island_index: 0,
            fixtures: Vec::new(),
            contact_list: None,
            joint_edges: Vec::new(),
            user_data: def.user_data,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    /// Awake and able to move.
    pub(crate) fn is_active(&self) -> bool {
        self.awake && self.body_type != BodyType::Static
    }

    pub fn transform(&self) -> Transform {
        self.xf
    }

    /// World position of the body origin.
    pub fn position(&self) -> Vec2 {
        self.xf.position
    }

    pub fn angle(&self) -> f64 {
        self.sweep.a
    }

    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> f64 {
        self.angular_velocity
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn inv_mass(&self) -> f64 {
        self.inv_mass
    }

    /// Rotational inertia about the body origin.
    pub fn inertia(&self) -> f64 {
        self.inertia + self.mass * self.sweep.local_center.dot(self.sweep.local_center)
    }

    pub fn force(&self) -> Vec2 {
        self.force
    }

    pub fn torque(&self) -> f64 {
        self.torque
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.auto_sleep
    }

    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn ignores_gravity(&self) -> bool {
        self.ignore_gravity
    }

    pub fn fixtures(&self) -> &[FixtureHandle] {
        &self.fixtures
    }

    pub fn joint_edges(&self) -> &[JointEdge] {
        &self.joint_edges
    }

    pub fn linear_damping(&self) -> f64 {
        self.linear_damping
    }

    pub fn angular_damping(&self) -> f64 {
        self.angular_damping
    }

    pub fn set_damping(&mut self, linear: f64, angular: f64) {
        self.linear_damping = linear.max(0.0);
        self.angular_damping = angular.max(0.0);
    }

    pub fn set_gravity_ignored(&mut self, ignore: bool) {
        self.ignore_gravity = ignore;
    }

    pub fn set_bullet(&mut self, bullet: bool) {
        self.bullet = bullet;
    }

    pub fn set_linear_velocity(&mut self, v: Vec2) {
        if self.is_static() {
            return;
        }
        if v.dot(v) > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    pub fn set_angular_velocity(&mut self, w: f64) {
        if self.is_static() {
            return;
        }
        if w * w > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    /// Waking resets the sleep timer; sleeping clears velocities and accumulated forces.
    pub fn set_awake(&mut self, awake: bool) {
        if awake {
            if !self.awake {
                self.awake = true;
                self.sleep_time = 0.0;
            }
        } else {
            self.awake = false;
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    pub fn set_sleeping_allowed(&mut self, allowed: bool) {
        self.auto_sleep = allowed;
        if !allowed {
            self.set_awake(true);
        }
    }

    /// Applies a force at a world point, waking the body.
    pub fn apply_force(&mut self, force: Vec2, point: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.force += force;
        self.torque += (point - self.sweep.c).cross(force);
    }

    pub fn apply_force_to_center(&mut self, force: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.force += force;
    }

    pub fn apply_torque(&mut self, torque: f64) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.torque += torque;
    }

    /// Immediately changes the velocity by `impulse / mass` at a world point.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_i * (point - self.sweep.c).cross(impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f64) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.angular_velocity += self.inv_i * impulse;
    }

    pub fn clear_forces(&mut self) {
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    pub fn world_point(&self, local_point: Vec2) -> Vec2 {
        self.xf.apply(local_point)
    }

    pub fn world_vector(&self, local_vector: Vec2) -> Vec2 {
        self.xf.rotation.apply(local_vector)
    }

    pub fn local_point(&self, world_point: Vec2) -> Vec2 {
        self.xf.apply_inverse(world_point)
    }

    pub fn local_vector(&self, world_vector: Vec2) -> Vec2 {
        self.xf.rotation.apply_inverse(world_vector)
    }

    pub fn linear_velocity_from_world_point(&self, world_point: Vec2) -> Vec2 {
        self.linear_velocity + Vec2::scalar_cross(self.angular_velocity, world_point - self.sweep.c)
    }

    pub fn linear_velocity_from_local_point(&self, local_point: Vec2) -> Vec2 {
        self.linear_velocity_from_world_point(self.world_point(local_point))
    }

    /// Whether contacts between this body and `other` are allowed at all.
    ///
    /// At least one body must be dynamic, and no joint between them may disable
    /// collision of connected bodies.
    pub(crate) fn should_collide(&self, other: &Body, other_handle: BodyHandle) -> bool {
        if !self.is_dynamic() && !other.is_dynamic() {
            return false;
        }
        !self
            .joint_edges
            .iter()
            .any(|edge| edge.other == other_handle && !edge.collide_connected)
    }

    /// Rebuilds the origin transform from the sweep's end state.
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf = self.sweep.transform_at(1.0);
    }

    /// Moves the body to the sweep state at `alpha` and pins the sweep there.
    pub(crate) fn advance(&mut self, alpha: f64) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    pub(crate) fn set_transform_internal(&mut self, position: Vec2, angle: f64) {
        self.xf.set(position, angle);
        self.sweep.c = self.xf.apply(self.sweep.local_center);
        self.sweep.c0 = self.sweep.c;
        self.sweep.a = angle;
        self.sweep.a0 = angle;
    }

    /// Moves every fixture proxy to cover the motion from the sweep start to now.
    pub(crate) fn synchronize_fixtures(
        &self,
        fixtures: &mut SlotMap<FixtureHandle, Fixture>,
        broad_phase: &mut dyn BroadPhase<FixtureProxy>,
    ) {
        let xf1 = self.sweep.transform_at(0.0);
        for handle in &self.fixtures {
            if let Some(fixture) = fixtures.get_mut(*handle) {
                fixture.synchronize(broad_phase, &xf1, &self.xf);
            }
        }
    }

    /// Recomputes mass, center of mass and inertia from the attached fixtures.
    ///
    /// Static and kinematic bodies get zero mass. A dynamic body whose fixtures add
    /// no mass is given a unit mass so it still responds to gravity. The linear
    /// velocity is adjusted so the velocity of the new center stays consistent.
    pub(crate) fn reset_mass_data(&mut self, fixtures: &SlotMap<FixtureHandle, Fixture>) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_i = 0.0;
        self.sweep.local_center = Vec2::ZERO;

        if !self.is_dynamic() {
            self.sweep.c0 = self.xf.position;
            self.sweep.c = self.xf.position;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        let mut local_center = Vec2::ZERO;
        for fixture in self.fixtures.iter().filter_map(|h| fixtures.get(*h)) {
            if fixture.density() == 0.0 {
                continue;
            }
            let md = fixture.mass_data();
            self.mass += md.mass;
            local_center += md.center * md.mass;
            self.inertia += md.inertia;
        }

        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            local_center = local_center * self.inv_mass;
        } else {
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        if self.inertia > 0.0 && !self.fixed_rotation {
            // Shift to the center of mass.
            self.inertia -= self.mass * local_center.dot(local_center);
            debug_assert!(self.inertia > 0.0);
            self.inv_i = 1.0 / self.inertia;
        } else {
            self.inertia = 0.0;
            self.inv_i = 0.0;
        }

        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.xf.apply(local_center);
        self.sweep.c0 = self.sweep.c;

        self.linear_velocity += Vec2::scalar_cross(self.angular_velocity, self.sweep.c - old_center);
    }
}
