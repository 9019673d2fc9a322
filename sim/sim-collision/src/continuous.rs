//! Continuous collision detection by conservative advancement.
//!
//! Two convex shapes are swept linearly from their `from` to their `to`
//! positions, orientation held at `from`. A GJK ray cast on the Minkowski
//! difference advances the time of impact `t` in `[0, 1]` until the shapes
//! touch. The hit normal points from object 2 toward object 1.

use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use sim_types::{NarrowPhaseConfig, PhysicsTransform};
use tracing::debug;

use crate::body::Body;
use crate::shape::{ConvexObject, ConvexShape, SupportMap};
use crate::simplex::{Simplex, SupportMapping};

/// Hits on one body closer in time than this are the same hit.
const DUPLICATE_TIME_TOLERANCE: f64 = 1e-6;

/// A convex shape swept across one step.
#[derive(Debug, Clone, Copy)]
pub struct TemporalObject<'a> {
    shape: &'a ConvexShape,
    from: PhysicsTransform,
    to: PhysicsTransform,
}

impl<'a> TemporalObject<'a> {
    /// Shape moving from `from` to `to`.
    #[must_use]
    pub fn new(shape: &'a ConvexShape, from: PhysicsTransform, to: PhysicsTransform) -> Self {
        Self { shape, from, to }
    }

    /// Shape that does not move.
    #[must_use]
    pub fn stationary(shape: &'a ConvexShape, transform: PhysicsTransform) -> Self {
        Self::new(shape, transform, transform)
    }

    /// The swept shape.
    #[must_use]
    pub fn shape(&self) -> &'a ConvexShape {
        self.shape
    }

    /// Start transform.
    #[must_use]
    pub fn from(&self) -> &PhysicsTransform {
        &self.from
    }

    /// End transform.
    #[must_use]
    pub fn to(&self) -> &PhysicsTransform {
        &self.to
    }

    /// Displacement over the step.
    #[must_use]
    pub fn motion(&self) -> Vector3<f64> {
        self.to.position - self.from.position
    }

    /// Whether this is a ray (zero-radius sphere).
    #[must_use]
    pub fn is_ray(&self) -> bool {
        self.shape.is_ray()
    }
}

/// First contact between two swept shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeOfImpact {
    /// Unit normal from object 2 toward object 1 at impact.
    pub normal: Vector3<f64>,
    /// Contact point on object 2 at impact.
    pub hit_point_on_b: Point3<f64>,
    /// Fraction of the step at impact, in `[0, 1]`.
    pub time: f64,
}

/// A hit found by a sweep or ray query.
#[derive(Debug, Clone)]
pub struct ContinuousCollisionResult {
    /// Body that was hit.
    pub body2: Arc<Body>,
    /// Unit normal from the hit body toward the swept object.
    pub normal_from_object2: Vector3<f64>,
    /// Contact point on the hit body.
    pub hit_point_on_object2: Point3<f64>,
    /// Fraction of the sweep at impact, in `[0, 1]`.
    pub time_to_hit: f64,
}

/// Sweep results ordered by time of impact.
#[derive(Debug, Clone, Default)]
pub struct ContinuousCollisionSet {
    results: Vec<ContinuousCollisionResult>,
}

impl ContinuousCollisionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a result, keeping the set ordered. Equal times keep insertion order.
    ///
    /// A second hit on the same body at the same time (two triangles
    /// sharing the crossed edge) is dropped.
    pub fn insert(&mut self, result: ContinuousCollisionResult) {
        let duplicate = self.results.iter().any(|r| {
            r.body2.id() == result.body2.id()
                && (r.time_to_hit - result.time_to_hit).abs() <= DUPLICATE_TIME_TOLERANCE
        });
        if duplicate {
            return;
        }
        let index = self
            .results
            .partition_point(|r| r.time_to_hit <= result.time_to_hit);
        self.results.insert(index, result);
    }

    /// Earliest hit.
    #[must_use]
    pub fn first(&self) -> Option<&ContinuousCollisionResult> {
        self.results.first()
    }

    /// Hits in time order.
    pub fn iter(&self) -> impl Iterator<Item = &ContinuousCollisionResult> {
        self.results.iter()
    }

    /// Number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether nothing was hit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl IntoIterator for ContinuousCollisionSet {
    type Item = ContinuousCollisionResult;
    type IntoIter = std::vec::IntoIter<ContinuousCollisionResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// Conservative advancement between two temporal objects.
#[derive(Debug, Clone, Copy)]
pub struct ConservativeAdvancement {
    max_iteration: usize,
    termination_tolerance: f64,
}

impl ConservativeAdvancement {
    /// Create a solver.
    #[must_use]
    pub fn new(config: &NarrowPhaseConfig) -> Self {
        Self {
            max_iteration: config.ccd_max_iteration,
            termination_tolerance: config.ccd_termination_tolerance,
        }
    }

    /// Time of impact of `a` against `b`, or `None` if they do not meet
    /// during the step or already overlap at its start.
    #[must_use]
    pub fn process(&self, a: &TemporalObject<'_>, b: &TemporalObject<'_>) -> Option<TimeOfImpact> {
        let motion_a = a.motion();
        let motion_b = b.motion();
        let relative = motion_a - motion_b;

        let mut object_a = ConvexObject::new(a.shape, a.from);
        let mut object_b = ConvexObject::new(b.shape, b.from);
        let start_a = a.from.position;
        let start_b = b.from.position;

        let initial = SupportMapping::new(
            object_a.support_point(&-relative),
            object_b.support_point(&relative),
        );
        let mut direction = -initial.point.coords;
        let mut simplex = Simplex::new();
        let mut t = 0.0;
        let mut normal: Option<Vector3<f64>> = None;

        for _ in 0..self.max_iteration {
            let mut w = SupportMapping::new(
                object_a.support_point(&direction),
                object_b.support_point(&-direction),
            );
            let v = -direction;
            let vw = v.dot(&w.point.coords);

            if vw > 0.0 {
                let vr = v.dot(&relative);
                if vr >= -(f64::EPSILON * f64::EPSILON) {
                    return None;
                }
                let dt = -vw / vr;
                t += dt;
                if t > 1.0 {
                    return None;
                }
                normal = Some(v);

                let shift_a = motion_a * dt;
                let shift_b = motion_b * dt;
                simplex.translate(&shift_a, &shift_b);
                w.point_a += shift_a;
                w.point_b += shift_b;
                w.point += shift_a - shift_b;
                object_a = ConvexObject::new(a.shape, at_position(&a.from, start_a + motion_a * t));
                object_b = ConvexObject::new(b.shape, at_position(&b.from, start_b + motion_b * t));
            }

            // A repeated support point means the simplex cannot get closer
            if simplex.contains(&w.point) || !simplex.add(w) {
                return normal.map(|normal| impact(&normal, &simplex, t));
            }
            direction = -simplex.reduce_closest_to_origin();

            if direction.norm_squared() < self.termination_tolerance {
                return normal.map(|normal| impact(&normal, &simplex, t));
            }
        }

        debug!(
            max_iteration = self.max_iteration,
            time = t,
            distance = direction.norm(),
            "conservative advancement did not converge"
        );
        None
    }
}

fn impact(normal: &Vector3<f64>, simplex: &Simplex, time: f64) -> TimeOfImpact {
    let (_, hit_point_on_b) = simplex.closest_points();
    TimeOfImpact {
        normal: normal.normalize(),
        hit_point_on_b,
        time,
    }
}

fn at_position(transform: &PhysicsTransform, position: Point3<f64>) -> PhysicsTransform {
    PhysicsTransform::new(position, transform.orientation)
}
