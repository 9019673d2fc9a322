//! GJK distance algorithm.
//!
//! Computes the distance between two convex support maps, or reports that
//! they overlap. The terminal simplex is handed to EPA for penetration depth
//! and carries the barycentric weights that give the closest points.

use nalgebra::{Point3, Vector3};
use sim_types::NarrowPhaseConfig;
use tracing::debug;

use crate::shape::SupportMap;
use crate::simplex::{Simplex, SupportMapping};

/// Squared distance under which the origin counts as enclosed.
const ORIGIN_TOLERANCE_SQ: f64 = 1e-12;

/// Outcome of a GJK query.
#[derive(Debug, Clone, Copy)]
pub enum GjkResult {
    /// The shapes overlap or touch.
    Collide {
        /// Terminal simplex, input for EPA.
        simplex: Simplex,
    },
    /// The shapes are separated.
    NoCollide {
        /// Distance between the shapes.
        separating_distance: f64,
        /// Terminal simplex, with weights for the closest points.
        simplex: Simplex,
    },
    /// No convergence within the iteration cap, or a degenerate direction.
    Invalid,
}

impl GjkResult {
    /// Whether the shapes overlap.
    #[must_use]
    pub fn is_collide(&self) -> bool {
        matches!(self, Self::Collide { .. })
    }

    /// Closest points on A and B for a separated result.
    #[must_use]
    pub fn closest_points(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        match self {
            Self::NoCollide { simplex, .. } => Some(simplex.closest_points()),
            _ => None,
        }
    }
}

/// GJK solver with tolerances taken from the narrow-phase configuration.
#[derive(Debug, Clone, Copy)]
pub struct GjkAlgorithm {
    max_iteration: usize,
    relative_tolerance: f64,
    minimum_tolerance: f64,
    percentage_increase: f64,
}

impl GjkAlgorithm {
    /// Create a solver.
    #[must_use]
    pub fn new(config: &NarrowPhaseConfig) -> Self {
        Self {
            max_iteration: config.gjk_max_iteration,
            relative_tolerance: config.gjk_relative_termination_tolerance,
            minimum_tolerance: config.gjk_minimum_termination_tolerance,
            percentage_increase: config.gjk_percentage_increase_of_minimum_tolerance,
        }
    }

    /// Run GJK between `a` and `b`.
    pub fn process<A, B>(&self, a: &A, b: &B) -> GjkResult
    where
        A: SupportMap + ?Sized,
        B: SupportMap + ?Sized,
    {
        let direction = Vector3::x();
        let mut simplex = Simplex::new();
        simplex.add(SupportMapping::new(
            a.support_point(&direction),
            b.support_point(&-direction),
        ));
        let mut v = simplex.reduce_closest_to_origin();
        let mut multiplier = 1.0;

        for iteration in 0..self.max_iteration {
            let vv = v.norm_squared();
            if vv <= ORIGIN_TOLERANCE_SQ {
                return GjkResult::Collide { simplex };
            }
            if !vv.is_finite() {
                debug!(iteration, "GJK direction is not finite");
                return GjkResult::Invalid;
            }

            let w = SupportMapping::new(a.support_point(&-v), b.support_point(&v));
            let vw = v.dot(&w.point.coords);

            let tolerance = (self.minimum_tolerance * multiplier).max(self.relative_tolerance * vv);
            if vv - vw <= tolerance || simplex.contains(&w.point) {
                if vw <= 0.0 {
                    return GjkResult::Collide { simplex };
                }
                return GjkResult::NoCollide {
                    separating_distance: vv.sqrt(),
                    simplex,
                };
            }

            if !simplex.add(w) {
                debug!(iteration, "GJK simplex overflow");
                return GjkResult::Invalid;
            }
            v = simplex.reduce_closest_to_origin();
            multiplier += self.percentage_increase;
        }

        debug!(
            max_iteration = self.max_iteration,
            distance = v.norm(),
            simplex_size = simplex.len(),
            "GJK did not converge"
        );
        GjkResult::Invalid
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::shape::{ConvexObject, ConvexShape};
    use approx::assert_relative_eq;
    use sim_types::PhysicsTransform;

    fn gjk() -> GjkAlgorithm {
        GjkAlgorithm::new(&NarrowPhaseConfig::default())
    }

    fn at(x: f64, y: f64, z: f64) -> PhysicsTransform {
        PhysicsTransform::from_position(Point3::new(x, y, z))
    }

    #[test]
    fn test_separated_boxes() {
        let cube = ConvexShape::Box {
            half_extents: Vector3::repeat(1.0),
        };
        let a = ConvexObject::new(&cube, at(0.0, 0.0, 0.0));
        let b = ConvexObject::new(&cube, at(3.0, 0.0, 0.0));

        match gjk().process(&a, &b) {
            GjkResult::NoCollide {
                separating_distance,
                simplex,
            } => {
                assert_relative_eq!(separating_distance, 1.0, epsilon = 1e-6);
                let (pa, pb) = simplex.closest_points();
                assert_relative_eq!(pa.x, 1.0, epsilon = 1e-6);
                assert_relative_eq!(pb.x, 2.0, epsilon = 1e-6);
            }
            other => panic!("expected NoCollide, got {other:?}"),
        }
    }

    #[test]
    fn test_overlapping_boxes() {
        let cube = ConvexShape::Box {
            half_extents: Vector3::repeat(0.5),
        };
        let a = ConvexObject::new(&cube, at(0.0, 0.0, 0.0));
        let b = ConvexObject::new(&cube, at(0.5, 0.0, 0.0));
        assert!(gjk().process(&a, &b).is_collide());
    }

    #[test]
    fn test_sphere_cores() {
        let sphere = ConvexShape::Sphere { radius: 1.0 };
        let a = ConvexObject::core(&sphere, at(0.0, 0.0, 0.0));
        let b = ConvexObject::core(&sphere, at(0.0, 3.0, 4.0));

        match gjk().process(&a, &b) {
            GjkResult::NoCollide {
                separating_distance,
                ..
            } => assert_relative_eq!(separating_distance, 5.0, epsilon = 1e-9),
            other => panic!("expected NoCollide, got {other:?}"),
        }
    }

    #[test]
    fn test_box_triangle_distance() {
        let cube = ConvexShape::Box {
            half_extents: Vector3::repeat(0.5),
        };
        let triangle = ConvexShape::Triangle {
            vertices: [
                Point3::new(-5.0, -5.0, 0.0),
                Point3::new(5.0, -5.0, 0.0),
                Point3::new(0.0, 5.0, 0.0),
            ],
        };
        let a = ConvexObject::new(&cube, at(0.0, 0.0, 0.8));
        let b = ConvexObject::new(&triangle, PhysicsTransform::identity());

        match gjk().process(&a, &b) {
            GjkResult::NoCollide {
                separating_distance,
                ..
            } => assert_relative_eq!(separating_distance, 0.3, epsilon = 1e-6),
            other => panic!("expected NoCollide, got {other:?}"),
        }
    }

    #[test]
    fn test_iteration_cap_is_invalid() {
        let config = NarrowPhaseConfig::default().gjk_max_iteration(0);
        let cube = ConvexShape::Box {
            half_extents: Vector3::repeat(1.0),
        };
        let a = ConvexObject::new(&cube, at(0.0, 0.0, 0.0));
        let b = ConvexObject::new(&cube, at(3.0, 0.0, 0.0));
        assert!(matches!(
            GjkAlgorithm::new(&config).process(&a, &b),
            GjkResult::Invalid
        ));
    }
}
