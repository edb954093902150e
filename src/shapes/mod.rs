pub mod chain;
pub mod circle;
pub mod edge;
pub mod polygon;

pub use chain::Chain;
pub use circle::Circle;
pub use edge::Edge;
pub use polygon::Polygon;

use crate::collision::{RayCastInput, RayCastOutput, AABB};
use crate::math::{Transform, Vec2};

/// Mass properties of a shape at a given density.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MassData {
    pub mass: f64,
    /// Centroid relative to the body origin.
    pub center: Vec2,
    /// Rotational inertia about the body origin.
    pub inertia: f64,
    pub area: f64,
}

/// Discriminant of [`Shape`], ordered so that contact pairs can be canonicalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShapeType {
    Circle,
    Polygon,
    Edge,
    Chain,
}

/// Enum representing the geometric shape attached to a fixture.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle(Circle),
    Polygon(Polygon),
    Edge(Edge),
    Chain(Chain),
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Circle(_) => ShapeType::Circle,
            Shape::Polygon(_) => ShapeType::Polygon,
            Shape::Edge(_) => ShapeType::Edge,
            Shape::Chain(_) => ShapeType::Chain,
        }
    }

    /// Number of child primitives; only chains have more than one.
    pub fn child_count(&self) -> usize {
        match self {
            Shape::Chain(chain) => chain.child_count(),
            _ => 1,
        }
    }

    /// Skin radius used by the narrow phase and distance queries.
    pub fn radius(&self) -> f64 {
        match self {
            Shape::Circle(c) => c.radius,
            Shape::Polygon(p) => p.radius,
            Shape::Edge(e) => e.radius,
            Shape::Chain(c) => c.radius,
        }
    }

    /// Point containment in world space. Edges and chains have no interior.
    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        match self {
            Shape::Circle(c) => c.test_point(xf, p),
            Shape::Polygon(poly) => poly.test_point(xf, p),
            Shape::Edge(_) | Shape::Chain(_) => false,
        }
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child_index: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(c) => c.ray_cast(input, xf),
            Shape::Polygon(p) => p.ray_cast(input, xf),
            Shape::Edge(e) => e.ray_cast(input, xf),
            Shape::Chain(c) => c.ray_cast(input, xf, child_index),
        }
    }

    pub fn compute_aabb(&self, xf: &Transform, child_index: usize) -> AABB {
        match self {
            Shape::Circle(c) => c.compute_aabb(xf),
            Shape::Polygon(p) => p.compute_aabb(xf),
            Shape::Edge(e) => e.compute_aabb(xf),
            Shape::Chain(c) => c.compute_aabb(xf, child_index),
        }
    }

    pub fn compute_mass(&self, density: f64) -> MassData {
        match self {
            Shape::Circle(c) => c.compute_mass(density),
            Shape::Polygon(p) => p.compute_mass(density),
            Shape::Edge(e) => e.compute_mass(density),
            Shape::Chain(_) => MassData::default(),
        }
    }
}

impl From<Circle> for Shape {
    fn from(c: Circle) -> Self {
        Shape::Circle(c)
    }
}

impl From<Polygon> for Shape {
    fn from(p: Polygon) -> Self {
        Shape::Polygon(p)
    }
}

impl From<Edge> for Shape {
    fn from(e: Edge) -> Self {
        Shape::Edge(e)
    }
}

impl From<Chain> for Shape {
    fn from(c: Chain) -> Self {
        Shape::Chain(c)
    }
}
