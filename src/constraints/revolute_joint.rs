use std::any::Any;

use super::{Joint, SolverBodyInfo, SolverData};
use crate::common::settings::LINEAR_SLOP;
use crate::math::{Mat22, Rot, Vec2};
use crate::objects::{Body, BodyHandle};

/// Parameters of a [`RevoluteJoint`].
#[derive(Debug, Clone, PartialEq)]
pub struct RevoluteJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Anchor point on body A, in body A's frame.
    pub local_anchor_a: Vec2,
    /// Anchor point on body B, in body B's frame.
    pub local_anchor_b: Vec2,
    pub collide_connected: bool,
}

impl RevoluteJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            collide_connected: false,
        }
    }

    /// Pins both bodies at one world point.
    pub fn initialize(body_a: BodyHandle, a: &Body, body_b: BodyHandle, b: &Body, anchor: Vec2) -> Self {
        Self {
            local_anchor_a: a.local_point(anchor),
            local_anchor_b: b.local_point(anchor),
            ..Self::new(body_a, body_b)
        }
    }

    #[must_use]
    pub fn with_anchors(mut self, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        self.local_anchor_a = local_anchor_a;
        self.local_anchor_b = local_anchor_b;
        self
    }

    #[must_use]
    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

/// Forces two anchor points, one on each body, to coincide. The bodies stay free to
/// rotate about the shared point.
#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    body_a: BodyHandle,
    body_b: BodyHandle,
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    collide_connected: bool,

    impulse: Vec2,

    // Solver temporaries.
    a: Option<SolverBodyInfo>,
    b: Option<SolverBodyInfo>,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat22,
}

/// Point-to-point effective mass matrix.
fn point_mass(a: &SolverBodyInfo, b: &SolverBodyInfo, r_a: Vec2, r_b: Vec2) -> Mat22 {
    let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
    let k12 = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
    Mat22::new(
        Vec2::new(m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b, k12),
        Vec2::new(k12, m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b),
    )
}

impl RevoluteJoint {
    pub fn new(def: &RevoluteJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            collide_connected: def.collide_connected,
            impulse: Vec2::ZERO,
            a: None,
            b: None,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat22::default(),
        }
    }

    fn bodies(&self) -> Option<(SolverBodyInfo, SolverBodyInfo)> {
        Some((self.a?, self.b?))
    }
}

impl Joint for RevoluteJoint {
    fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    fn init_velocity_constraints(&mut self, a: &SolverBodyInfo, b: &SolverBodyInfo, data: &mut SolverData<'_>) {
        self.a = Some(*a);
        self.b = Some(*b);

        let (pa, pb) = (data.positions[a.index], data.positions[b.index]);
        let (mut va, mut vb) = (data.velocities[a.index], data.velocities[b.index]);

        self.r_a = Rot::new(pa.a).apply(self.local_anchor_a - a.local_center);
        self.r_b = Rot::new(pb.a).apply(self.local_anchor_b - b.local_center);
        self.mass = point_mass(a, b, self.r_a, self.r_b);

        if data.step.warm_starting {
            self.impulse = self.impulse * data.step.dt_ratio;
            let p = self.impulse;
            va.v -= p * a.inv_mass;
            va.w -= a.inv_i * self.r_a.cross(p);
            vb.v += p * b.inv_mass;
            vb.w += b.inv_i * self.r_b.cross(p);
        } else {
            self.impulse = Vec2::ZERO;
        }

        data.velocities[a.index] = va;
        data.velocities[b.index] = vb;
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let Some((a, b)) = self.bodies() else {
            return;
        };
        let (mut va, mut vb) = (data.velocities[a.index], data.velocities[b.index]);

        let cdot = vb.v + Vec2::scalar_cross(vb.w, self.r_b) - va.v - Vec2::scalar_cross(va.w, self.r_a);
        let impulse = self.mass.solve(-cdot);
        self.impulse += impulse;

        va.v -= impulse * a.inv_mass;
        va.w -= a.inv_i * self.r_a.cross(impulse);
        vb.v += impulse * b.inv_mass;
        vb.w += b.inv_i * self.r_b.cross(impulse);

        data.velocities[a.index] = va;
        data.velocities[b.index] = vb;
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let Some((a, b)) = self.bodies() else {
            return true;
        };
        let (mut pa, mut pb) = (data.positions[a.index], data.positions[b.index]);

        let r_a = Rot::new(pa.a).apply(self.local_anchor_a - a.local_center);
        let r_b = Rot::new(pb.a).apply(self.local_anchor_b - b.local_center);

        let c = pb.c + r_b - pa.c - r_a;
        let position_error = c.magnitude();

        let impulse = -point_mass(&a, &b, r_a, r_b).solve(c);

        pa.c -= impulse * a.inv_mass;
        pa.a -= a.inv_i * r_a.cross(impulse);
        pb.c += impulse * b.inv_mass;
        pb.a += b.inv_i * r_b.cross(impulse);

        data.positions[a.index] = pa;
        data.positions[b.index] = pb;

        position_error <= LINEAR_SLOP
    }

    fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        self.impulse * inv_dt
    }

    fn reaction_torque(&self, _inv_dt: f64) -> f64 {
        0.0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
