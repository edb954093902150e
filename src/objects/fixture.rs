use crate::collision::{BroadPhase, ProxyId, RayCastInput, RayCastOutput, AABB};
use crate::common::Material;
use crate::math::{Transform, Vec2};
use crate::shapes::{MassData, Shape, ShapeType};

use super::{BodyHandle, FixtureHandle};

/// Collision filtering data.
///
/// Two fixtures in the same non-zero group always collide (positive group) or never
/// collide (negative group). Otherwise each fixture's mask must accept the other's
/// category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Filter {
    pub category_bits: u16,
    pub mask_bits: u16,
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.mask_bits & other.category_bits) != 0 && (self.category_bits & other.mask_bits) != 0
    }
}

/// Broad-phase payload: which fixture child a proxy belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixtureProxy {
    pub fixture: FixtureHandle,
    pub child_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ProxyEntry {
    pub(crate) aabb: AABB,
    pub(crate) proxy_id: ProxyId,
}

/// Everything needed to attach a shape to a body.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureDef {
    pub shape: Shape,
    pub material: Material,
    /// Sensors report overlap but generate no collision response.
    pub is_sensor: bool,
    pub filter: Filter,
    /// Game flag: characters may climb this surface.
    pub climbable: bool,
    /// Game flag: one-way surface characters may pass through from below.
    pub pervious: bool,
    pub user_data: u64,
}

impl FixtureDef {
    pub fn new(shape: impl Into<Shape>) -> Self {
        Self {
            shape: shape.into(),
            material: Material::default(),
            is_sensor: false,
            filter: Filter::default(),
            climbable: false,
            pervious: false,
            user_data: 0,
        }
    }

    #[must_use]
    pub fn with_density(mut self, density: f64) -> Self {
        self.material.density = density.max(0.0);
        self
    }

    #[must_use]
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.material.friction = friction.max(0.0);
        self
    }

    #[must_use]
    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.material.restitution = restitution.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    #[must_use]
    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn climbable(mut self) -> Self {
        self.climbable = true;
        self
    }

    #[must_use]
    pub fn pervious(mut self) -> Self {
        self.pervious = true;
        self
    }

    #[must_use]
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

/// A shape attached to a body, with material and filtering data.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub(crate) body: BodyHandle,
    pub(crate) shape: Shape,
    pub(crate) material: Material,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    pub(crate) proxies: Vec<ProxyEntry>,
    pub climbable: bool,
    pub pervious: bool,
    pub user_data: u64,
}

impl Fixture {
    pub(crate) fn new(body: BodyHandle, def: FixtureDef) -> Self {
        Self {
            body,
            shape: def.shape,
            material: def.material,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: Vec::new(),
            climbable: def.climbable,
            pervious: def.pervious,
            user_data: def.user_data,
        }
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape.shape_type()
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn density(&self) -> f64 {
        self.material.density
    }

    pub fn friction(&self) -> f64 {
        self.material.friction
    }

    /// Affects contacts created after the change.
    pub fn set_friction(&mut self, friction: f64) {
        self.material.friction = friction.max(0.0);
    }

    pub fn restitution(&self) -> f64 {
        self.material.restitution
    }

    /// Affects contacts created after the change.
    pub fn set_restitution(&mut self, restitution: f64) {
        self.material.restitution = restitution.clamp(0.0, 1.0);
    }

    pub fn mass_data(&self) -> MassData {
        self.shape.compute_mass(self.material.density)
    }

    /// Point containment test in world space, given the body transform.
    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        self.shape.test_point(xf, p)
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform, child_index: usize) -> Option<RayCastOutput> {
        self.shape.ray_cast(input, xf, child_index)
    }

    /// Swept box of a child as last given to the broad phase.
    pub fn aabb(&self, child_index: usize) -> Option<AABB> {
        self.proxies.get(child_index).map(|p| p.aabb)
    }

    pub(crate) fn proxy_id(&self, child_index: usize) -> Option<ProxyId> {
        self.proxies.get(child_index).map(|p| p.proxy_id)
    }

    pub(crate) fn create_proxies(
        &mut self,
        handle: FixtureHandle,
        broad_phase: &mut dyn BroadPhase<FixtureProxy>,
        xf: &Transform,
    ) {
        debug_assert!(self.proxies.is_empty());
        for child_index in 0..self.shape.child_count() {
            let aabb = self.shape.compute_aabb(xf, child_index);
            let proxy_id = broad_phase.create_proxy(
                aabb,
                FixtureProxy {
                    fixture: handle,
                    child_index,
                },
            );
            self.proxies.push(ProxyEntry { aabb, proxy_id });
        }
    }

    pub(crate) fn destroy_proxies(&mut self, broad_phase: &mut dyn BroadPhase<FixtureProxy>) {
        for proxy in self.proxies.drain(..) {
            broad_phase.destroy_proxy(proxy.proxy_id);
        }
    }

    /// Moves every proxy to cover the motion from `xf1` to `xf2`.
    pub(crate) fn synchronize(
        &mut self,
        broad_phase: &mut dyn BroadPhase<FixtureProxy>,
        xf1: &Transform,
        xf2: &Transform,
    ) {
        let displacement = xf2.position - xf1.position;
        for (child_index, proxy) in self.proxies.iter_mut().enumerate() {
            let aabb1 = self.shape.compute_aabb(xf1, child_index);
            let aabb2 = self.shape.compute_aabb(xf2, child_index);
            proxy.aabb = AABB::combine(&aabb1, &aabb2);
            broad_phase.move_proxy(proxy.proxy_id, proxy.aabb, displacement);
        }
    }

    pub(crate) fn touch_proxies(&self, broad_phase: &mut dyn BroadPhase<FixtureProxy>) {
        for proxy in &self.proxies {
            broad_phase.touch_proxy(proxy.proxy_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::GridBroadPhase;
    use crate::shapes::{Chain, Circle, Polygon};
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    fn handles() -> (BodyHandle, FixtureHandle) {
        let mut bodies: SlotMap<BodyHandle, ()> = SlotMap::with_key();
        let mut fixtures: SlotMap<FixtureHandle, ()> = SlotMap::with_key();
        (bodies.insert(()), fixtures.insert(()))
    }

    #[test]
    fn test_filter_groups_and_masks() {
        let a = Filter::default();
        let b = Filter::default();
        assert!(a.should_collide(&b));

        let never = Filter {
            group_index: -3,
            ..Filter::default()
        };
        assert!(!never.should_collide(&never));

        let always = Filter {
            group_index: 2,
            mask_bits: 0,
            ..Filter::default()
        };
        assert!(always.should_collide(&always));

        let debris = Filter {
            category_bits: 0x0004,
            mask_bits: 0x0001,
            group_index: 0,
        };
        let player = Filter {
            category_bits: 0x0002,
            mask_bits: 0xFFFF,
            group_index: 0,
        };
        assert!(!debris.should_collide(&player));
        assert!(debris.should_collide(&a));
    }

    #[test]
    fn test_def_builders() {
        let def = FixtureDef::new(Circle::new(1.0))
            .with_density(2.0)
            .with_friction(-1.0)
            .with_restitution(3.0)
            .sensor()
            .climbable()
            .pervious();
        assert_eq!(def.material.density, 2.0);
        assert_eq!(def.material.friction, 0.0);
        assert_eq!(def.material.restitution, 1.0);
        assert!(def.is_sensor && def.climbable && def.pervious);
    }

    #[test]
    fn test_mass_uses_density() {
        let (body, _) = handles();
        let fixture = Fixture::new(body, FixtureDef::new(Polygon::new_box(1.0, 0.5)).with_density(3.0));
        let md = fixture.mass_data();
        assert_relative_eq!(md.mass, 3.0 * 2.0);
    }

    #[test]
    fn test_proxies_follow_children() {
        let (body, handle) = handles();
        let mut bp: GridBroadPhase<FixtureProxy> = GridBroadPhase::new(2.0);
        let chain = Chain::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 1.0),
        ]);
        let mut fixture = Fixture::new(body, FixtureDef::new(chain));
        let xf = Transform::identity();
        fixture.create_proxies(handle, &mut bp, &xf);
        assert_eq!(fixture.proxies.len(), 2);
        assert_eq!(bp.proxy_count(), 2);
        assert_eq!(bp.user_data(fixture.proxies[1].proxy_id).child_index, 1);

        let moved = Transform::new(Vec2::new(5.0, 0.0), 0.0);
        fixture.synchronize(&mut bp, &xf, &moved);
        let aabb = fixture.aabb(0).unwrap();
        assert!(aabb.min.x <= 0.0 && aabb.max.x >= 6.0);

        fixture.destroy_proxies(&mut bp);
        assert_eq!(bp.proxy_count(), 0);
        assert!(fixture.aabb(0).is_none());
    }
}
