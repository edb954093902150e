use tracing::trace;

use crate::collision::{
    collide_circles, collide_edge_and_circle, collide_edge_and_polygon, collide_polygon_and_circle,
    collide_polygons, test_overlap, EpScratch, Manifold, WorldManifold,
};
use crate::common::{mix_friction, mix_restitution};
use crate::math::Transform;
use crate::objects::{BodyHandle, Fixture, FixtureHandle};
use crate::shapes::Shape;

use super::{ContactHandle, ContactListener};

/// One side of a contact's membership in a body's contact list.
///
/// Every body keeps a doubly linked list of its contacts threaded through these
/// nodes; `other` is the body on the far side of the contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEdge {
    pub other: BodyHandle,
    pub(crate) prev: Option<ContactHandle>,
    pub(crate) next: Option<ContactHandle>,
}

impl ContactEdge {
    fn new(other: BodyHandle) -> Self {
        Self {
            other,
            prev: None,
            next: None,
        }
    }

    pub fn next(&self) -> Option<ContactHandle> {
        self.next
    }
}

/// A potentially touching pair of fixture children.
///
/// A contact exists while the fixtures' broad-phase boxes overlap. It is `touching`
/// only while its manifold has points (or, for sensors, while the shapes overlap).
#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) fixture_a: FixtureHandle,
    pub(crate) fixture_b: FixtureHandle,
    pub(crate) child_a: usize,
    pub(crate) child_b: usize,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,

    pub(crate) manifold: Manifold,

    pub(crate) node_a: ContactEdge,
    pub(crate) node_b: ContactEdge,

    pub(crate) touching: bool,
    pub(crate) enabled: bool,
    /// Filtering must be re-run before the next update.
    pub(crate) filter_flag: bool,
    pub(crate) island_flag: bool,
    /// `toi` holds a valid cached value.
    pub(crate) toi_flag: bool,
    pub(crate) toi: f64,
    pub(crate) toi_count: usize,

    pub(crate) friction: f64,
    pub(crate) restitution: f64,
}

impl Contact {
    /// Builds a contact for a fixture pair, ordering it so that fixture A has the
    /// higher shape rank. Returns `None` for pairs that never collide (edges and chains
    /// against each other).
    pub(crate) fn new(
        fixture_a: FixtureHandle,
        a: &Fixture,
        child_a: usize,
        fixture_b: FixtureHandle,
        b: &Fixture,
        child_b: usize,
    ) -> Option<Self> {
        if a.shape_type() < b.shape_type() {
            return Self::new(fixture_b, b, child_b, fixture_a, a, child_a);
        }

        let supported = matches!(
            (a.shape(), b.shape()),
            (Shape::Circle(_), Shape::Circle(_))
                | (Shape::Polygon(_), Shape::Circle(_) | Shape::Polygon(_))
                | (Shape::Edge(_), Shape::Circle(_) | Shape::Polygon(_))
                | (Shape::Chain(_), Shape::Circle(_) | Shape::Polygon(_))
        );
        if !supported {
            return None;
        }

        Some(Self {
            fixture_a,
            fixture_b,
            child_a,
            child_b,
            body_a: a.body(),
            body_b: b.body(),
            manifold: Manifold::default(),
            node_a: ContactEdge::new(b.body()),
            node_b: ContactEdge::new(a.body()),
            touching: false,
            enabled: true,
            filter_flag: false,
            island_flag: false,
            toi_flag: false,
            toi: 0.0,
            toi_count: 0,
            friction: mix_friction(a.friction(), b.friction()),
            restitution: mix_restitution(a.restitution(), b.restitution()),
        })
    }

    pub fn fixture_a(&self) -> FixtureHandle {
        self.fixture_a
    }

    pub fn fixture_b(&self) -> FixtureHandle {
        self.fixture_b
    }

    pub fn child_index_a(&self) -> usize {
        self.child_a
    }

    pub fn child_index_b(&self) -> usize {
        self.child_b
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    /// Local-space manifold. Empty for sensors.
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    pub fn manifold_mut(&mut self) -> &mut Manifold {
        &mut self.manifold
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disables the contact for the current step. Use from [`ContactListener::pre_solve`].
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn friction(&self) -> f64 {
        self.friction
    }

    pub fn set_friction(&mut self, friction: f64) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f64) {
        self.restitution = restitution;
    }

    /// Forces the filter to be re-evaluated on the next collide pass.
    pub fn flag_for_filtering(&mut self) {
        self.filter_flag = true;
    }

    /// World-space view of the manifold for the given body transforms.
    pub fn world_manifold(
        &self,
        xf_a: &Transform,
        radius_a: f64,
        xf_b: &Transform,
        radius_b: f64,
    ) -> WorldManifold {
        WorldManifold::new(&self.manifold, xf_a, radius_a, xf_b, radius_b)
    }

    /// Node of this contact in `body`'s contact list.
    pub fn edge_for(&self, body: BodyHandle) -> &ContactEdge {
        if body == self.body_a {
            &self.node_a
        } else {
            debug_assert_eq!(body, self.body_b);
            &self.node_b
        }
    }

    pub(crate) fn edge_for_mut(&mut self, body: BodyHandle) -> &mut ContactEdge {
        if body == self.body_a {
            &mut self.node_a
        } else {
            debug_assert_eq!(body, self.body_b);
            &mut self.node_b
        }
    }

    /// Fresh manifold for the current transforms.
    pub(crate) fn evaluate(
        &self,
        shape_a: &Shape,
        xf_a: &Transform,
        shape_b: &Shape,
        xf_b: &Transform,
        scratch: &mut EpScratch,
    ) -> Manifold {
        match (shape_a, shape_b) {
            (Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
            (Shape::Polygon(a), Shape::Circle(b)) => collide_polygon_and_circle(a, xf_a, b, xf_b),
            (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
            (Shape::Edge(a), Shape::Circle(b)) => collide_edge_and_circle(a, xf_a, b, xf_b),
            (Shape::Edge(a), Shape::Polygon(b)) => collide_edge_and_polygon(scratch, a, xf_a, b, xf_b),
            (Shape::Chain(chain), Shape::Circle(b)) => {
                let edge = chain.child_edge(self.child_a);
                collide_edge_and_circle(&edge, xf_a, b, xf_b)
            }
            (Shape::Chain(chain), Shape::Polygon(b)) => {
                let edge = chain.child_edge(self.child_a);
                collide_edge_and_polygon(scratch, &edge, xf_a, b, xf_b)
            }
            _ => Manifold::default(),
        }
    }

    /// Recomputes the manifold and fires listener callbacks.
    ///
    /// Impulses of points whose ids survive are carried into the new manifold so the
    /// solver can warm start. Returns true when a non-sensor contact changed its
    /// touching state, in which case the caller wakes both bodies.
    pub(crate) fn update(
        &mut self,
        fixture_a: &Fixture,
        fixture_b: &Fixture,
        xf_a: &Transform,
        xf_b: &Transform,
        scratch: &mut EpScratch,
        mut listener: Option<&mut dyn ContactListener>,
    ) -> bool {
        let old_manifold = self.manifold;

        // Re-enable; pre_solve may disable it again.
        self.enabled = true;

        let was_touching = self.touching;
        let sensor = fixture_a.is_sensor() || fixture_b.is_sensor();

        let touching = if sensor {
            self.manifold.point_count = 0;
            test_overlap(
                fixture_a.shape(),
                self.child_a,
                xf_a,
                fixture_b.shape(),
                self.child_b,
                xf_b,
            )
        } else {
            let mut manifold = self.evaluate(fixture_a.shape(), xf_a, fixture_b.shape(), xf_b, scratch);
            for i in 0..manifold.point_count {
                let point = &mut manifold.points[i];
                point.normal_impulse = 0.0;
                point.tangent_impulse = 0.0;
                let key = point.id.key();
                if let Some(old) = old_manifold.points().iter().find(|old| old.id.key() == key) {
                    point.normal_impulse = old.normal_impulse;
                    point.tangent_impulse = old.tangent_impulse;
                }
            }
            self.manifold = manifold;
            manifold.point_count > 0
        };

        self.touching = touching;

        if let Some(listener) = listener.as_deref_mut() {
            if !was_touching && touching {
                trace!(fixture_a = ?self.fixture_a, fixture_b = ?self.fixture_b, "begin contact");
                listener.begin_contact(self);
            }
            if was_touching && !touching {
                trace!(fixture_a = ?self.fixture_a, fixture_b = ?self.fixture_b, "end contact");
                listener.end_contact(self);
            }
            if !sensor && touching {
                listener.pre_solve(self, &old_manifold);
            }
        }

        !sensor && was_touching != touching
    }
}
