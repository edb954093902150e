//! Time of impact along two sweeps.
//!
//! Each outer iteration finds the closest features with GJK and builds a
//! separating axis from them. The axis is then pushed back along the sweep with a
//! bisection/secant root finder until the deepest points on it reach the target
//! separation. Rotation is handled exactly because the axis is re-evaluated at
//! every trial time instead of bounded.

use super::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};
use crate::common::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, MAX_TOI_ITERATIONS, MAX_TOI_ROOT_ITERATIONS};
use crate::math::{Sweep, Vec2};

#[derive(Debug, Clone, Copy)]
pub struct ToiInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Upper bound of the search interval, usually 1.
    pub t_max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToiState {
    #[default]
    Unknown,
    /// Iteration budget exhausted, or the root finder lost the target.
    Failed,
    /// Core shapes already overlap at `t = 0`.
    Overlapped,
    /// Reached the target separation at `t`.
    Touching,
    /// Never get closer than the target within `t_max`.
    Separated,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ToiOutput {
    pub state: ToiState,
    /// Fraction of the sweep interval.
    pub t: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeparationKind {
    /// Axis between two vertices.
    Points,
    /// Axis is the normal of an edge of A.
    FaceA,
    /// Axis is the normal of an edge of B.
    FaceB,
}

/// Separating axis fixed in the frame of the feature that produced it.
#[derive(Debug)]
struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    /// Face midpoint in the owning body's frame (face kinds only).
    local_point: Vec2,
    /// World axis for `Points`, local face normal otherwise.
    axis: Vec2,
}

impl<'a> SeparationFunction<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t: f64,
    ) -> Self {
        debug_assert!(0 < cache.count && cache.count < 3);

        let xf_a = sweep_a.transform_at(t);
        let xf_b = sweep_b.transform_at(t);

        let mut f = Self {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationKind::Points,
            local_point: Vec2::ZERO,
            axis: Vec2::ZERO,
        };

        if cache.count == 1 {
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));
            f.axis = (point_b - point_a).normalize();
        } else if cache.index_a[0] == cache.index_a[1] {
            // Two points on B, one on A.
            f.kind = SeparationKind::FaceB;
            let b1 = proxy_b.vertex(cache.index_b[0]);
            let b2 = proxy_b.vertex(cache.index_b[1]);
            f.axis = (b2 - b1).cross_scalar(1.0).normalize();
            f.local_point = (b1 + b2) * 0.5;

            let normal = xf_b.rotation.apply(f.axis);
            let point_b = xf_b.apply(f.local_point);
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));
            if (point_a - point_b).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        } else {
            // Two points on A, one or two on B.
            f.kind = SeparationKind::FaceA;
            let a1 = proxy_a.vertex(cache.index_a[0]);
            let a2 = proxy_a.vertex(cache.index_a[1]);
            f.axis = (a2 - a1).cross_scalar(1.0).normalize();
            f.local_point = (a1 + a2) * 0.5;

            let normal = xf_a.rotation.apply(f.axis);
            let point_a = xf_a.apply(f.local_point);
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));
            if (point_b - point_a).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        }
        f
    }

    /// Deepest points along the axis at time `t`, with their separation.
    fn find_min_separation(&self, t: f64) -> (f64, usize, usize) {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationKind::Points => {
                let index_a = self.proxy_a.support(xf_a.rotation.apply_inverse(self.axis));
                let index_b = self.proxy_b.support(xf_b.rotation.apply_inverse(-self.axis));
                (self.evaluate(index_a, index_b, t), index_a, index_b)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.rotation.apply(self.axis);
                let index_b = self.proxy_b.support(xf_b.rotation.apply_inverse(-normal));
                (self.evaluate(0, index_b, t), 0, index_b)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.rotation.apply(self.axis);
                let index_a = self.proxy_a.support(xf_a.rotation.apply_inverse(-normal));
                (self.evaluate(index_a, 0, t), index_a, 0)
            }
        }
    }

    /// Separation of a fixed pair of features at time `t`. The index on the face
    /// side is ignored for the face kinds.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f64) -> f64 {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.rotation.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.rotation.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Earliest time in `[0, t_max]` at which the two swept proxies come within
/// `radius_a + radius_b - 3 * LINEAR_SLOP` of each other (never less than `LINEAR_SLOP`).
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;

    // Large rotations make the root finder unreliable.
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = input.t_max;

    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;
    debug_assert!(target > tolerance);

    let mut cache = SimplexCache::default();
    let mut t1 = 0.0;

    for _ in 0..MAX_TOI_ITERATIONS {
        let dist_input = DistanceInput {
            proxy_a: *proxy_a,
            proxy_b: *proxy_b,
            transform_a: sweep_a.transform_at(t1),
            transform_b: sweep_b.transform_at(t1),
            use_radii: false,
        };
        let separation = distance(&mut cache, &dist_input).distance;

        // Overlapping cores: continuous collision cannot help.
        if separation <= 0.0 {
            return ToiOutput {
                state: ToiState::Overlapped,
                t: 0.0,
            };
        }

        if separation < target + tolerance {
            return ToiOutput {
                state: ToiState::Touching,
                t: t1,
            };
        }

        let fcn = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest points on this axis. A new pair of deepest points can
        // appear once the first is resolved, so push back up to once per vertex.
        let mut t2 = t_max;
        for _ in 0..MAX_POLYGON_VERTICES {
            let (mut s2, index_a, index_b) = fcn.find_min_separation(t2);

            // Separated along this axis for the whole interval.
            if s2 > target + tolerance {
                return ToiOutput {
                    state: ToiState::Separated,
                    t: t_max,
                };
            }

            // Close enough at t2: advance and rebuild the axis.
            if s2 > target - tolerance {
                t1 = t2;
                break;
            }

            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            if s1 < target - tolerance {
                tracing::trace!(t = t1, s1, "time of impact root bracket lost");
                return ToiOutput {
                    state: ToiState::Failed,
                    t: t1,
                };
            }

            if s1 <= target + tolerance {
                return ToiOutput {
                    state: ToiState::Touching,
                    t: t1,
                };
            }

            // s1 is above the target and s2 below it: find the crossing, alternating
            // secant and bisection steps.
            let mut a1 = t1;
            let mut a2 = t2;
            for root_iteration in 0..MAX_TOI_ROOT_ITERATIONS {
                let t = if root_iteration % 2 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };

                let s = fcn.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }
            }
        }
    }

    tracing::trace!(t = t1, "time of impact did not converge");
    ToiOutput {
        state: ToiState::Failed,
        t: t1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::settings::POLYGON_RADIUS;
    use crate::shapes::{Circle, Edge, Polygon, Shape};
    use approx::assert_relative_eq;

    fn still(c: Vec2) -> Sweep {
        Sweep {
            c0: c,
            c,
            ..Sweep::default()
        }
    }

    fn moving(c0: Vec2, c: Vec2) -> Sweep {
        Sweep {
            c0,
            c,
            ..Sweep::default()
        }
    }

    #[test]
    fn test_fast_circle_hits_edge() {
        let edge: Shape = Edge::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)).into();
        let ball: Shape = Circle::new(0.1).into();
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&edge, 0),
            proxy_b: DistanceProxy::new(&ball, 0),
            sweep_a: still(Vec2::ZERO),
            sweep_b: moving(Vec2::new(0.0, -1.0), Vec2::new(0.0, 0.6667)),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);

        // Core distance at impact sits near the target separation.
        let target = 0.01 + 0.1 - 3.0 * LINEAR_SLOP;
        let y = -1.0 + out.t * 1.6667;
        assert!((y.abs() - target).abs() < 0.25 * LINEAR_SLOP + 1e-9);
        assert!(out.t > 0.5 && out.t < 0.6);
    }

    #[test]
    fn test_grazing_circle_hits_long_edge() {
        // 2 m along the edge for every 0.1 m toward it.
        let edge: Shape = Edge::new(Vec2::new(-50.0, 0.0), Vec2::new(50.0, 0.0)).into();
        let ball: Shape = Circle::new(0.05).into();
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&edge, 0),
            proxy_b: DistanceProxy::new(&ball, 0),
            sweep_a: still(Vec2::ZERO),
            sweep_b: moving(Vec2::new(0.0, 0.08), Vec2::new(2.0, -0.02)),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);

        let target = 0.01 + 0.05 - 3.0 * LINEAR_SLOP;
        let y = 0.08 - 0.1 * out.t;
        assert!((y - target).abs() < 0.25 * LINEAR_SLOP + 1e-9);
        assert_relative_eq!(out.t, 0.35, epsilon = 0.01);
    }

    #[test]
    fn test_box_corner_reaches_rotated_face() {
        // A's face is the separating feature, B brings a corner to it while turning.
        let ground: Shape = Polygon::new_box(5.0, 0.5).into();
        let crate_box: Shape = Polygon::new_box(0.5, 0.5).into();
        let mut sweep_b = moving(Vec2::new(-3.0, 3.0), Vec2::new(3.0, 0.0));
        sweep_b.a = 1.0;
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&ground, 0),
            proxy_b: DistanceProxy::new(&crate_box, 0),
            sweep_a: still(Vec2::ZERO),
            sweep_b,
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);

        let target = 2.0 * POLYGON_RADIUS - 3.0 * LINEAR_SLOP;
        let mut cache = SimplexCache::default();
        let gap = distance(
            &mut cache,
            &DistanceInput {
                proxy_a: input.proxy_a,
                proxy_b: input.proxy_b,
                transform_a: input.sweep_a.transform_at(out.t),
                transform_b: input.sweep_b.transform_at(out.t),
                use_radii: false,
            },
        )
        .distance;
        assert!((gap - target).abs() < 0.25 * LINEAR_SLOP + 1e-9);
    }

    #[test]
    fn test_separated_when_moving_apart() {
        let a: Shape = Polygon::new_box(0.5, 0.5).into();
        let b: Shape = Polygon::new_box(0.5, 0.5).into();
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&a, 0),
            proxy_b: DistanceProxy::new(&b, 0),
            sweep_a: still(Vec2::ZERO),
            sweep_b: moving(Vec2::new(2.0, 0.0), Vec2::new(4.0, 0.0)),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Separated);
        assert_relative_eq!(out.t, 1.0);
    }

    #[test]
    fn test_overlapped_at_start() {
        let a: Shape = Polygon::new_box(0.5, 0.5).into();
        let b: Shape = Polygon::new_box(0.5, 0.5).into();
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&a, 0),
            proxy_b: DistanceProxy::new(&b, 0),
            sweep_a: still(Vec2::ZERO),
            sweep_b: moving(Vec2::new(0.5, 0.0), Vec2::new(3.0, 0.0)),
            t_max: 1.0,
        };
        assert_eq!(time_of_impact(&input).state, ToiState::Overlapped);
    }

    #[test]
    fn test_stationary_pair_is_separated() {
        let a: Shape = Circle::new(0.5).into();
        let b: Shape = Circle::new(0.5).into();
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&a, 0),
            proxy_b: DistanceProxy::new(&b, 0),
            sweep_a: still(Vec2::ZERO),
            sweep_b: still(Vec2::new(3.0, 0.0)),
            t_max: 1.0,
        };
        assert_eq!(time_of_impact(&input).state, ToiState::Separated);
    }

    #[test]
    fn test_spinning_box_reaches_wall() {
        let wall: Shape = Polygon::new_box(0.1, 5.0).into();
        let spinner: Shape = Polygon::new_box(1.0, 0.1).into();
        let mut sweep_b = moving(Vec2::new(2.0, 0.0), Vec2::new(1.0, 0.0));
        sweep_b.a = 0.5;
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&wall, 0),
            proxy_b: DistanceProxy::new(&spinner, 0),
            sweep_a: still(Vec2::ZERO),
            sweep_b,
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);
        assert!(out.t > 0.0 && out.t < 1.0);
    }
}
