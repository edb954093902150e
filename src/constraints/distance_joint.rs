use std::any::Any;
use std::f64::consts::PI;

use super::{Joint, SolverBodyInfo, SolverData};
use crate::common::settings::{LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use crate::math::{Rot, Vec2};
use crate::objects::{Body, BodyHandle};

/// Parameters of a [`DistanceJoint`].
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Anchor point on body A, in body A's frame.
    pub local_anchor_a: Vec2,
    /// Anchor point on body B, in body B's frame.
    pub local_anchor_b: Vec2,
    /// Rest length between the anchors.
    pub length: f64,
    /// Spring frequency in Hz. Zero makes the joint rigid.
    pub frequency_hz: f64,
    /// 0 = no damping, 1 = critical damping.
    pub damping_ratio: f64,
    pub collide_connected: bool,
}

impl DistanceJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length: 1.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
            collide_connected: false,
        }
    }

    /// Joint between two world anchors; the rest length is their current distance.
    pub fn initialize(
        body_a: BodyHandle,
        a: &Body,
        body_b: BodyHandle,
        b: &Body,
        anchor_a: Vec2,
        anchor_b: Vec2,
    ) -> Self {
        Self {
            local_anchor_a: a.local_point(anchor_a),
            local_anchor_b: b.local_point(anchor_b),
            length: anchor_a.distance(anchor_b),
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
    pub fn with_length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }

    /// Makes the joint soft.
    #[must_use]
    pub fn with_spring(mut self, frequency_hz: f64, damping_ratio: f64) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    #[must_use]
    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

/// Keeps two anchor points at a fixed distance, like a massless rod.
///
/// With a spring frequency the rod becomes a damped spring. The velocity constraint
/// then carries a soft bias and the position pass is skipped.
#[derive(Debug, Clone)]
pub struct DistanceJoint {
    body_a: BodyHandle,
    body_b: BodyHandle,
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    length: f64,
    frequency_hz: f64,
    damping_ratio: f64,
    collide_connected: bool,

    impulse: f64,
    gamma: f64,
    bias: f64,

    // Solver temporaries.
    a: Option<SolverBodyInfo>,
    b: Option<SolverBodyInfo>,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f64,
}

impl DistanceJoint {
    pub fn new(def: &DistanceJointDef) -> Self {
        assert!(def.length >= 0.0, "Distance cannot be negative");
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            collide_connected: def.collide_connected,
            impulse: 0.0,
            gamma: 0.0,
            bias: 0.0,
            a: None,
            b: None,
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        }
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    pub fn damping_ratio(&self) -> f64 {
        self.damping_ratio
    }

    fn bodies(&self) -> Option<(SolverBodyInfo, SolverBodyInfo)> {
        Some((self.a?, self.b?))
    }
}

impl Joint for DistanceJoint {
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
        self.u = pb.c + self.r_b - pa.c - self.r_a;

        // Handle singularity.
        let length = self.u.magnitude();
        if length > LINEAR_SLOP {
            self.u = self.u * (1.0 / length);
        } else {
            self.u = Vec2::ZERO;
        }

        let cr_au = self.r_a.cross(self.u);
        let cr_bu = self.r_b.cross(self.u);
        let mut inv_mass = a.inv_mass + a.inv_i * cr_au * cr_au + b.inv_mass + b.inv_i * cr_bu * cr_bu;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency_hz > 0.0 {
            let c = length - self.length;
            let omega = 2.0 * PI * self.frequency_hz;
            let d = 2.0 * self.mass * self.damping_ratio * omega;
            let k = self.mass * omega * omega;

            // Implicit Euler spring.
            let h = data.step.dt;
            self.gamma = h * (d + h * k);
            self.gamma = if self.gamma != 0.0 { 1.0 / self.gamma } else { 0.0 };
            self.bias = c * h * k * self.gamma;

            inv_mass += self.gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            let p = self.u * self.impulse;
            va.v -= p * a.inv_mass;
            va.w -= a.inv_i * self.r_a.cross(p);
            vb.v += p * b.inv_mass;
            vb.w += b.inv_i * self.r_b.cross(p);
        } else {
            self.impulse = 0.0;
        }

        data.velocities[a.index] = va;
        data.velocities[b.index] = vb;
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let Some((a, b)) = self.bodies() else {
            return;
        };
        let (mut va, mut vb) = (data.velocities[a.index], data.velocities[b.index]);

        let vp_a = va.v + Vec2::scalar_cross(va.w, self.r_a);
        let vp_b = vb.v + Vec2::scalar_cross(vb.w, self.r_b);
        let cdot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = self.u * impulse;
        va.v -= p * a.inv_mass;
        va.w -= a.inv_i * self.r_a.cross(p);
        vb.v += p * b.inv_mass;
        vb.w += b.inv_i * self.r_b.cross(p);

        data.velocities[a.index] = va;
        data.velocities[b.index] = vb;
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        // Springs are soft; there is no position error to remove.
        if self.frequency_hz > 0.0 {
            return true;
        }
        let Some((a, b)) = self.bodies() else {
            return true;
        };
        let (mut pa, mut pb) = (data.positions[a.index], data.positions[b.index]);

        let r_a = Rot::new(pa.a).apply(self.local_anchor_a - a.local_center);
        let r_b = Rot::new(pb.a).apply(self.local_anchor_b - b.local_center);
        let (u, length) = (pb.c + r_b - pa.c - r_a).normalize_with_length();
        let c = (length - self.length).clamp(-MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);

        let impulse = -self.mass * c;
        let p = u * impulse;

        pa.c -= p * a.inv_mass;
        pa.a -= a.inv_i * r_a.cross(p);
        pb.c += p * b.inv_mass;
        pb.a += b.inv_i * r_b.cross(p);

        data.positions[a.index] = pa;
        data.positions[b.index] = pb;

        c.abs() < LINEAR_SLOP
    }

    fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        self.u * (inv_dt * self.impulse)
    }

    fn reaction_torque(&self, _inv_dt: f64) -> f64 {
        0.0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::{Position, TimeStep, Velocity};
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    const EPSILON: f64 = 1e-9;

    fn handles() -> (BodyHandle, BodyHandle) {
        let mut map: SlotMap<BodyHandle, ()> = SlotMap::with_key();
        (map.insert(()), map.insert(()))
    }

    fn anchor_info() -> SolverBodyInfo {
        SolverBodyInfo {
            index: 0,
            local_center: Vec2::ZERO,
            inv_mass: 0.0,
            inv_i: 0.0,
        }
    }

    fn bob_info() -> SolverBodyInfo {
        SolverBodyInfo {
            index: 1,
            local_center: Vec2::ZERO,
            inv_mass: 1.0,
            inv_i: 1.0,
        }
    }

    #[test]
    fn test_def_initialize_measures_length() {
        let (ha, hb) = handles();
        let a = Body::new(&crate::objects::BodyDef::static_body());
        let b = Body::new(&crate::objects::BodyDef::dynamic().with_position(Vec2::new(3.0, 4.0)));
        let def = DistanceJointDef::initialize(ha, &a, hb, &b, Vec2::ZERO, Vec2::new(3.0, 4.0));
        assert_relative_eq!(def.length, 5.0);
        assert_eq!(def.local_anchor_b, Vec2::ZERO);
        assert!(!def.collide_connected);
    }

    #[test]
    fn test_rod_removes_stretching_velocity() {
        let (ha, hb) = handles();
        let mut joint = DistanceJoint::new(&DistanceJointDef::new(ha, hb).with_length(2.0));
        let mut positions = vec![
            Position::default(),
            Position {
                c: Vec2::new(2.0, 0.0),
                a: 0.0,
            },
        ];
        let mut velocities = vec![
            Velocity::default(),
            Velocity {
                v: Vec2::new(1.0, 0.5),
                w: 0.0,
            },
        ];
        let mut data = SolverData {
            step: TimeStep::new(1.0 / 60.0),
            positions: &mut positions,
            velocities: &mut velocities,
        };
        joint.init_velocity_constraints(&anchor_info(), &bob_info(), &mut data);
        joint.solve_velocity_constraints(&mut data);

        // Radial motion removed, tangential motion kept.
        assert!(data.velocities[1].v.x.abs() < EPSILON);
        assert_relative_eq!(data.velocities[1].v.y, 0.5, epsilon = EPSILON);
        assert_eq!(data.velocities[0], Velocity::default());
        assert!(joint.reaction_force(60.0).x < 0.0);
    }

    #[test]
    fn test_position_correction_is_clamped() {
        let (ha, hb) = handles();
        let mut joint = DistanceJoint::new(&DistanceJointDef::new(ha, hb).with_length(2.0));
        let mut positions = vec![
            Position::default(),
            Position {
                c: Vec2::new(2.5, 0.0),
                a: 0.0,
            },
        ];
        let mut velocities = vec![Velocity::default(); 2];
        let mut data = SolverData {
            step: TimeStep::new(1.0 / 60.0),
            positions: &mut positions,
            velocities: &mut velocities,
        };
        joint.init_velocity_constraints(&anchor_info(), &bob_info(), &mut data);
        let solved = joint.solve_position_constraints(&mut data);
        assert!(!solved);
        assert_relative_eq!(data.positions[1].c.x, 2.5 - MAX_LINEAR_CORRECTION, epsilon = EPSILON);

        for _ in 0..3 {
            joint.solve_position_constraints(&mut data);
        }
        assert!(joint.solve_position_constraints(&mut data));
        assert_relative_eq!(data.positions[1].c.x, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_spring_skips_position_pass() {
        let (ha, hb) = handles();
        let mut joint = DistanceJoint::new(&DistanceJointDef::new(ha, hb).with_length(1.0).with_spring(4.0, 0.5));
        let mut positions = vec![
            Position::default(),
            Position {
                c: Vec2::new(2.0, 0.0),
                a: 0.0,
            },
        ];
        let mut velocities = vec![Velocity::default(); 2];
        let mut data = SolverData {
            step: TimeStep::new(1.0 / 60.0),
            positions: &mut positions,
            velocities: &mut velocities,
        };
        joint.init_velocity_constraints(&anchor_info(), &bob_info(), &mut data);
        assert!(joint.solve_position_constraints(&mut data));
        assert_eq!(data.positions[1].c, Vec2::new(2.0, 0.0));

        // The stretched spring pulls the bob back toward the anchor.
        joint.solve_velocity_constraints(&mut data);
        assert!(data.velocities[1].v.x < 0.0);
    }
}
