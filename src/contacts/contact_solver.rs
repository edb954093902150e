//! Sequential impulse solver for the contacts of one island.
//!
//! Velocity constraints are solved point by point with friction first, except that
//! two-point manifolds solve their normal impulses together as a 2x2 linear
//! complementarity problem. Position drift is removed afterwards with a
//! pseudo-impulse pass that works directly on positions.

use slotmap::SlotMap;

use crate::collision::{Manifold, ManifoldType, WorldManifold};
use crate::common::settings::{LINEAR_SLOP, MAX_LINEAR_CORRECTION, MAX_MANIFOLD_POINTS};
use crate::common::Settings;
use crate::integration::{Position, TimeStep, Velocity};
use crate::math::{Mat22, Rot, Transform, Vec2};
use crate::objects::{Body, BodyHandle, Fixture, FixtureHandle};

use super::{Contact, ContactHandle, ContactImpulse};

/// Above this condition number the block solver falls back to one point.
const MAX_CONDITION_NUMBER: f64 = 1000.0;

#[derive(Debug, Clone, Copy, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f64,
    tangent_impulse: f64,
    normal_mass: f64,
    tangent_mass: f64,
    velocity_bias: f64,
}

#[derive(Debug, Clone)]
struct VelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: Vec2,
    normal_mass: Mat22,
    k: Mat22,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f64,
    inv_mass_b: f64,
    inv_i_a: f64,
    inv_i_b: f64,
    friction: f64,
    restitution: f64,
    point_count: usize,
    contact: ContactHandle,
}

#[derive(Debug, Clone)]
struct PositionConstraint {
    manifold: Manifold,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f64,
    inv_mass_b: f64,
    inv_i_a: f64,
    inv_i_b: f64,
    local_center_a: Vec2,
    local_center_b: Vec2,
    radius_a: f64,
    radius_b: f64,
}

/// Body transform rebuilt from a solver position.
fn transform_of(position: &Position, local_center: Vec2) -> Transform {
    let rotation = Rot::new(position.a);
    Transform {
        position: position.c - rotation.apply(local_center),
        rotation,
    }
}

/// Normal, point and separation of one manifold point at the current positions.
fn position_manifold(pc: &PositionConstraint, xf_a: &Transform, xf_b: &Transform, index: usize) -> (Vec2, Vec2, f64) {
    let m = &pc.manifold;
    match m.kind {
        ManifoldType::Circles => {
            let point_a = xf_a.apply(m.local_point);
            let point_b = xf_b.apply(m.points[0].local_point);
            let normal = (point_b - point_a).normalize();
            let point = (point_a + point_b) * 0.5;
            let separation = (point_b - point_a).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, point, separation)
        }
        ManifoldType::FaceA => {
            let normal = xf_a.rotation.apply(m.local_normal);
            let plane_point = xf_a.apply(m.local_point);
            let clip_point = xf_b.apply(m.points[index].local_point);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, clip_point, separation)
        }
        ManifoldType::FaceB => {
            let normal = xf_b.rotation.apply(m.local_normal);
            let plane_point = xf_b.apply(m.local_point);
            let clip_point = xf_a.apply(m.points[index].local_point);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            // Keep the normal pointing from A to B.
            (-normal, clip_point, separation)
        }
    }
}

/// Constraint arrays are kept between islands and steps; `reset` refills them.
#[derive(Debug, Default)]
pub(crate) struct ContactSolver {
    velocity_threshold: f64,
    velocity_constraints: Vec<VelocityConstraint>,
    position_constraints: Vec<PositionConstraint>,
}

impl ContactSolver {
    /// Snapshots the touching contacts of an island. Bodies must already carry their
    /// island indices.
    pub(crate) fn reset(
        &mut self,
        step: TimeStep,
        settings: &Settings,
        handles: &[ContactHandle],
        contacts: &SlotMap<ContactHandle, Contact>,
        bodies: &SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
    ) {
        self.velocity_threshold = settings.velocity_threshold;
        self.velocity_constraints.clear();
        self.position_constraints.clear();

        for &handle in handles {
            let Some(contact) = contacts.get(handle) else {
                continue;
            };
            let (Some(body_a), Some(body_b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
                continue;
            };
            let (Some(fixture_a), Some(fixture_b)) =
                (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
            else {
                continue;
            };

            let manifold = contact.manifold;
            debug_assert!(manifold.point_count > 0);

            let mut vc = VelocityConstraint {
                points: [VelocityConstraintPoint::default(); MAX_MANIFOLD_POINTS],
                normal: Vec2::ZERO,
                normal_mass: Mat22::default(),
                k: Mat22::default(),
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_i,
                inv_i_b: body_b.inv_i,
                friction: contact.friction,
                restitution: contact.restitution,
                point_count: manifold.point_count,
                contact: handle,
            };
            for (vcp, mp) in vc.points.iter_mut().zip(manifold.points()) {
                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * mp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * mp.tangent_impulse;
                }
            }
            self.velocity_constraints.push(vc);

            self.position_constraints.push(PositionConstraint {
                manifold,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_i,
                inv_i_b: body_b.inv_i,
                local_center_a: body_a.sweep.local_center,
                local_center_b: body_b.sweep.local_center,
                radius_a: fixture_a.shape().radius(),
                radius_b: fixture_b.shape().radius(),
            });
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.velocity_constraints.len()
    }

    /// Computes anchors, effective masses and restitution bias at the current state.
    pub(crate) fn initialize_velocity_constraints(&mut self, positions: &[Position], velocities: &[Velocity]) {
        for (vc, pc) in self.velocity_constraints.iter_mut().zip(&self.position_constraints) {
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);

            let (pa, pb) = (positions[vc.index_a], positions[vc.index_b]);
            let (va, vb) = (velocities[vc.index_a], velocities[vc.index_b]);

            let xf_a = transform_of(&pa, pc.local_center_a);
            let xf_b = transform_of(&pb, pc.local_center_b);

            let world_manifold = WorldManifold::new(&pc.manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);
            vc.normal = world_manifold.normal;
            let tangent = vc.normal.cross_scalar(1.0);

            for (j, vcp) in vc.points[..vc.point_count].iter_mut().enumerate() {
                vcp.r_a = world_manifold.points[j] - pa.c;
                vcp.r_b = world_manifold.points[j] - pb.c;

                let rn_a = vcp.r_a.cross(vc.normal);
                let rn_b = vcp.r_b.cross(vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = vcp.r_a.cross(tangent);
                let rt_b = vcp.r_b.cross(tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Restitution only above the threshold approach speed.
                vcp.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    vb.v + Vec2::scalar_cross(vb.w, vcp.r_b) - va.v - Vec2::scalar_cross(va.w, vcp.r_a),
                );
                if v_rel < -self.velocity_threshold {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            if vc.point_count == 2 {
                let (p1, p2) = (&vc.points[0], &vc.points[1]);
                let rn1_a = p1.r_a.cross(vc.normal);
                let rn1_b = p1.r_b.cross(vc.normal);
                let rn2_a = p2.r_a.cross(vc.normal);
                let rn2_b = p2.r_b.cross(vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    vc.k = Mat22::new(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    vc.normal_mass = vc.k.inverse();
                } else {
                    // Nearly redundant points; solve only the first.
                    vc.point_count = 1;
                }
            }
        }
    }

    pub(crate) fn warm_start(&self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let tangent = vc.normal.cross_scalar(1.0);
            let mut va = velocities[vc.index_a];
            let mut vb = velocities[vc.index_b];

            for vcp in &vc.points[..vc.point_count] {
                let p = vc.normal * vcp.normal_impulse + tangent * vcp.tangent_impulse;
                va.w -= vc.inv_i_a * vcp.r_a.cross(p);
                va.v -= p * vc.inv_mass_a;
                vb.w += vc.inv_i_b * vcp.r_b.cross(p);
                vb.v += p * vc.inv_mass_b;
            }

            velocities[vc.index_a] = va;
            velocities[vc.index_b] = vb;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in &mut self.velocity_constraints {
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
            let mut va = velocities[vc.index_a];
            let mut vb = velocities[vc.index_b];

            let normal = vc.normal;
            let tangent = normal.cross_scalar(1.0);

            debug_assert!(vc.point_count == 1 || vc.point_count == 2);

            // Friction first: non-penetration matters more.
            for vcp in &mut vc.points[..vc.point_count] {
                let dv = vb.v + Vec2::scalar_cross(vb.w, vcp.r_b) - va.v - Vec2::scalar_cross(va.w, vcp.r_a);
                let vt = dv.dot(tangent);
                let lambda = vcp.tangent_mass * (-vt);

                let max_friction = vc.friction * vcp.normal_impulse;
                let new_impulse = (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                let p = tangent * lambda;
                va.v -= p * m_a;
                va.w -= i_a * vcp.r_a.cross(p);
                vb.v += p * m_b;
                vb.w += i_b * vcp.r_b.cross(p);
            }

            if vc.point_count == 1 {
                let vcp = &mut vc.points[0];
                let dv = vb.v + Vec2::scalar_cross(vb.w, vcp.r_b) - va.v - Vec2::scalar_cross(va.w, vcp.r_a);
                let vn = dv.dot(normal);
                let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                let lambda = new_impulse - vcp.normal_impulse;
                vcp.normal_impulse = new_impulse;

                let p = normal * lambda;
                va.v -= p * m_a;
                va.w -= i_a * vcp.r_a.cross(p);
                vb.v += p * m_b;
                vb.w += i_b * vcp.r_b.cross(p);
            } else {
                solve_block(vc, &mut va, &mut vb);
            }

            velocities[vc.index_a] = va;
            velocities[vc.index_b] = vb;
        }
    }

    /// Writes accumulated impulses back to the contact manifolds for warm starting.
    pub(crate) fn store_impulses(&self, contacts: &mut SlotMap<ContactHandle, Contact>) {
        for vc in &self.velocity_constraints {
            let Some(contact) = contacts.get_mut(vc.contact) else {
                continue;
            };
            for (mp, vcp) in contact.manifold.points.iter_mut().zip(&vc.points[..vc.point_count]) {
                mp.normal_impulse = vcp.normal_impulse;
                mp.tangent_impulse = vcp.tangent_impulse;
            }
        }
    }

    /// Impulses per contact, for post-solve reporting.
    pub(crate) fn impulses(&self) -> impl Iterator<Item = (ContactHandle, ContactImpulse)> + '_ {
        self.velocity_constraints.iter().map(|vc| {
            let mut impulse = ContactImpulse {
                count: vc.point_count,
                ..ContactImpulse::default()
            };
            for (j, vcp) in vc.points[..vc.point_count].iter().enumerate() {
                impulse.normal_impulses[j] = vcp.normal_impulse;
                impulse.tangent_impulses[j] = vcp.tangent_impulse;
            }
            (vc.contact, impulse)
        })
    }

    /// One Baumgarte pass over all contacts. True when the deepest penetration is
    /// within three slops.
    pub(crate) fn solve_position_constraints(&self, positions: &mut [Position], baumgarte: f64) -> bool {
        let min_separation = self.solve_positions(positions, baumgarte, None);
        min_separation >= -3.0 * LINEAR_SLOP
    }

    /// Position pass that only moves the two bodies of a TOI event; every other body
    /// is treated as static.
    pub(crate) fn solve_toi_position_constraints(
        &self,
        positions: &mut [Position],
        baumgarte: f64,
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        let min_separation = self.solve_positions(positions, baumgarte, Some((toi_index_a, toi_index_b)));
        min_separation >= -1.5 * LINEAR_SLOP
    }

    fn solve_positions(&self, positions: &mut [Position], baumgarte: f64, toi: Option<(usize, usize)>) -> f64 {
        let mut min_separation: f64 = 0.0;

        for pc in &self.position_constraints {
            let movable = |index: usize| toi.map_or(true, |(a, b)| index == a || index == b);
            let (m_a, i_a) = if movable(pc.index_a) {
                (pc.inv_mass_a, pc.inv_i_a)
            } else {
                (0.0, 0.0)
            };
            let (m_b, i_b) = if movable(pc.index_b) {
                (pc.inv_mass_b, pc.inv_i_b)
            } else {
                (0.0, 0.0)
            };

            let mut pa = positions[pc.index_a];
            let mut pb = positions[pc.index_b];

            for j in 0..pc.manifold.point_count {
                let xf_a = transform_of(&pa, pc.local_center_a);
                let xf_b = transform_of(&pb, pc.local_center_b);
                let (normal, point, separation) = position_manifold(pc, &xf_a, &xf_b, j);

                let r_a = point - pa.c;
                let r_b = point - pb.c;

                min_separation = min_separation.min(separation);

                // Leave a slop of overlap so contacts stay warm.
                let c = (baumgarte * (separation + LINEAR_SLOP)).clamp(-MAX_LINEAR_CORRECTION, 0.0);

                let rn_a = r_a.cross(normal);
                let rn_b = r_b.cross(normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -c / k } else { 0.0 };

                let p = normal * impulse;
                pa.c -= p * m_a;
                pa.a -= i_a * r_a.cross(p);
                pb.c += p * m_b;
                pb.a += i_b * r_b.cross(p);
            }

            positions[pc.index_a] = pa;
            positions[pc.index_b] = pb;
        }

        min_separation
    }
}

/// Two-point normal solve.
///
/// Finds `x >= 0` with `vn = A x + b >= 0` and `x_i * vn_i = 0` by enumerating the four
/// cases (both active, only first, only second, none). The accumulated impulse `a`
/// stays non-negative, so the incremental form `x = a + d` solves `vn = A d + b'` with
/// `b' = b - A a`.
fn solve_block(vc: &mut VelocityConstraint, va: &mut Velocity, vb: &mut Velocity) {
    let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
    let normal = vc.normal;
    let (cp1, cp2) = (vc.points[0], vc.points[1]);

    let a = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);
    debug_assert!(a.x >= 0.0 && a.y >= 0.0);

    let dv1 = vb.v + Vec2::scalar_cross(vb.w, cp1.r_b) - va.v - Vec2::scalar_cross(va.w, cp1.r_a);
    let dv2 = vb.v + Vec2::scalar_cross(vb.w, cp2.r_b) - va.v - Vec2::scalar_cross(va.w, cp2.r_a);
    let vn1 = dv1.dot(normal);
    let vn2 = dv2.dot(normal);

    let b = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias) - vc.k.mul(a);

    let candidates = || {
        // Both points active.
        let x = -vc.normal_mass.mul(b);
        if x.x >= 0.0 && x.y >= 0.0 {
            return Some(x);
        }

        // Only the first point active.
        let x = Vec2::new(-cp1.normal_mass * b.x, 0.0);
        let vn2 = vc.k.ex.y * x.x + b.y;
        if x.x >= 0.0 && vn2 >= 0.0 {
            return Some(x);
        }

        // Only the second point active.
        let x = Vec2::new(0.0, -cp2.normal_mass * b.y);
        let vn1 = vc.k.ey.x * x.y + b.x;
        if x.y >= 0.0 && vn1 >= 0.0 {
            return Some(x);
        }

        // Both separating.
        if b.x >= 0.0 && b.y >= 0.0 {
            return Some(Vec2::ZERO);
        }

        // No solution; leave the impulses untouched.
        None
    };

    if let Some(x) = candidates() {
        let d = x - a;
        let p1 = normal * d.x;
        let p2 = normal * d.y;
        va.v -= (p1 + p2) * m_a;
        va.w -= i_a * (cp1.r_a.cross(p1) + cp2.r_a.cross(p2));
        vb.v += (p1 + p2) * m_b;
        vb.w += i_b * (cp1.r_b.cross(p1) + cp2.r_b.cross(p2));
        vc.points[0].normal_impulse = x.x;
        vc.points[1].normal_impulse = x.y;
    }
}
