use crate::common::settings::{EPSILON, MAX_MANIFOLD_POINTS};
use crate::math::{Transform, Vec2};

/// Kind of geometric feature that produced a contact point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(u8)]
pub enum ContactFeatureType {
    #[default]
    Vertex = 0,
    Face = 1,
}

/// The pair of features that intersect to form a contact point.
///
/// Used as the identity of a manifold point across steps so cached impulses can
/// be matched to the same physical contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ContactFeature {
    pub index_a: u8,
    pub index_b: u8,
    pub type_a: ContactFeatureType,
    pub type_b: ContactFeatureType,
}

/// Identity of a manifold point.
pub type ContactId = ContactFeature;

impl ContactFeature {
    pub fn new(
        index_a: usize,
        type_a: ContactFeatureType,
        index_b: usize,
        type_b: ContactFeatureType,
    ) -> Self {
        Self {
            index_a: index_a as u8,
            index_b: index_b as u8,
            type_a,
            type_b,
        }
    }

    /// Packs the four bytes into one integer for fast comparison.
    pub fn key(&self) -> u32 {
        u32::from(self.index_a)
            | u32::from(self.index_b) << 8
            | (self.type_a as u32) << 16
            | (self.type_b as u32) << 24
    }

    /// Same feature pair seen from the other shape.
    pub fn swapped(self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

/// A contact point cached across steps.
///
/// `local_point` depends on the manifold type:
/// - `Circles`: center of circle B in B's frame
/// - `FaceA`: center of circle B or the clip point of polygon B, in B's frame
/// - `FaceB`: the clip point of polygon A, in A's frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManifoldPoint {
    pub local_point: Vec2,
    /// Accumulated non-penetration impulse.
    pub normal_impulse: f64,
    /// Accumulated friction impulse.
    pub tangent_impulse: f64,
    pub id: ContactId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifoldType {
    #[default]
    Circles,
    FaceA,
    FaceB,
}

/// Contact points and shared normal for one touching shape pair, in local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Manifold {
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    /// Unused for `Circles`; the reference face normal otherwise.
    pub local_normal: Vec2,
    /// `Circles`: center of circle A. `FaceA`/`FaceB`: a point on the reference face.
    pub local_point: Vec2,
    pub kind: ManifoldType,
    pub point_count: usize,
}

impl Manifold {
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }
}

/// Manifold evaluated in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldManifold {
    /// Points from A to B.
    pub normal: Vec2,
    /// Mid-surface contact points.
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// Negative when overlapping.
    pub separations: [f64; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    /// Evaluates `manifold` at the given transforms. The radii must belong to the shapes
    /// that produced the manifold.
    pub fn new(
        manifold: &Manifold,
        xf_a: &Transform,
        radius_a: f64,
        xf_b: &Transform,
        radius_b: f64,
    ) -> Self {
        let mut out = WorldManifold {
            normal: Vec2::UP,
            points: [Vec2::ZERO; MAX_MANIFOLD_POINTS],
            separations: [0.0; MAX_MANIFOLD_POINTS],
        };
        if manifold.point_count == 0 {
            return out;
        }

        match manifold.kind {
            ManifoldType::Circles => {
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                out.normal = Vec2::new(1.0, 0.0);
                if point_a.distance_squared(point_b) > EPSILON * EPSILON {
                    out.normal = (point_b - point_a).normalize();
                }
                let c_a = point_a + out.normal * radius_a;
                let c_b = point_b - out.normal * radius_b;
                out.points[0] = (c_a + c_b) * 0.5;
                out.separations[0] = (c_b - c_a).dot(out.normal);
            }
            ManifoldType::FaceA => {
                out.normal = xf_a.rotation.apply(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_b.apply(manifold.points[i].local_point);
                    let c_a = clip_point
                        + out.normal * (radius_a - (clip_point - plane_point).dot(out.normal));
                    let c_b = clip_point - out.normal * radius_b;
                    out.points[i] = (c_a + c_b) * 0.5;
                    out.separations[i] = (c_b - c_a).dot(out.normal);
                }
            }
            ManifoldType::FaceB => {
                out.normal = xf_b.rotation.apply(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_a.apply(manifold.points[i].local_point);
                    let c_b = clip_point
                        + out.normal * (radius_b - (clip_point - plane_point).dot(out.normal));
                    let c_a = clip_point - out.normal * radius_a;
                    out.points[i] = (c_a + c_b) * 0.5;
                    out.separations[i] = (c_a - c_b).dot(out.normal);
                }
                // Ensure normal points from A to B.
                out.normal = -out.normal;
            }
        }
        out
    }
}

/// How a manifold point changed between two evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointState {
    /// Point does not exist.
    #[default]
    Null,
    /// Point was added in the update.
    Add,
    /// Point persisted across the update.
    Persist,
    /// Point was removed in the update.
    Remove,
}

/// Classifies the points of two manifolds by contact id.
///
/// `state1` describes the points of `manifold1` (`Persist` or `Remove`), `state2` the
/// points of `manifold2` (`Persist` or `Add`).
pub fn get_point_states(
    manifold1: &Manifold,
    manifold2: &Manifold,
) -> (
    [PointState; MAX_MANIFOLD_POINTS],
    [PointState; MAX_MANIFOLD_POINTS],
) {
    let mut state1 = [PointState::Null; MAX_MANIFOLD_POINTS];
    let mut state2 = [PointState::Null; MAX_MANIFOLD_POINTS];

    for (i, p1) in manifold1.points().iter().enumerate() {
        let key = p1.id.key();
        state1[i] = if manifold2.points().iter().any(|p2| p2.id.key() == key) {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }

    for (i, p2) in manifold2.points().iter().enumerate() {
        let key = p2.id.key();
        state2[i] = if manifold1.points().iter().any(|p1| p1.id.key() == key) {
            PointState::Persist
        } else {
            PointState::Add
        };
    }

    (state1, state2)
}
