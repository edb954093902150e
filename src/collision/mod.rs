pub mod aabb;
pub mod broad_phase;
pub mod detection;
pub mod distance;
pub mod edge_collision;
pub mod manifold;
pub mod ray_cast;
pub mod time_of_impact;

// Re-export key types
pub use aabb::AABB;
pub use broad_phase::{BroadPhase, GridBroadPhase, ProxyId};
pub use detection::{
    clip_segment_to_line, collide_circles, collide_polygon_and_circle, collide_polygons, ClipVertex,
};
pub use distance::{distance, test_overlap, DistanceInput, DistanceOutput, DistanceProxy, SimplexCache};
pub use edge_collision::{collide_edge_and_circle, collide_edge_and_polygon, EpScratch};
pub use manifold::*;
pub use ray_cast::{RayCastInput, RayCastOutput};
pub use time_of_impact::{time_of_impact, ToiInput, ToiOutput, ToiState};
