//! Persistent contact manifolds.
//!
//! A [`ManifoldResult`] keeps up to four contact points for a body pair
//! across frames. Each point owns a shared warm-start cell holding the
//! impulses accumulated by the constraint solver; clones of a manifold
//! share those cells, so impulses written by the solver into the clone
//! handed to it are seen by the persistent manifold on the next frame.
//!
//! Points are matched between frames by their local position on object 2.
//! A matched point keeps its accumulated impulses; a dropped point loses
//! them.

use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use parking_lot::Mutex;
use smallvec::SmallVec;
use sim_types::PhysicsTransform;

use crate::body::Body;

/// Maximum number of points in a manifold.
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// Impulses accumulated by the constraint solver for one contact point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccumulatedSolvingData {
    /// Accumulated normal impulse (non-positive).
    pub acc_normal_impulse: f64,
    /// Accumulated friction impulse along the contact tangent.
    pub acc_tangent_impulse: f64,
}

/// One contact between two bodies.
#[derive(Debug, Clone)]
pub struct ManifoldContactPoint {
    /// Unit normal from object 2 toward object 1.
    pub normal_from_object2: Vector3<f64>,
    /// Contact point on object 1 (world).
    pub point_on_object1: Point3<f64>,
    /// Contact point on object 2 (world).
    pub point_on_object2: Point3<f64>,
    /// Contact point on object 1 in object 1's frame.
    pub local_point_on_object1: Point3<f64>,
    /// Contact point on object 2 in object 2's frame.
    pub local_point_on_object2: Point3<f64>,
    /// Signed distance along the normal; negative when penetrating.
    pub depth: f64,
    /// Whether this contact was predicted by continuous collision detection.
    pub predictive: bool,
    accumulated: Arc<Mutex<AccumulatedSolvingData>>,
}

impl ManifoldContactPoint {
    /// Snapshot of the warm-start impulses.
    #[must_use]
    pub fn accumulated(&self) -> AccumulatedSolvingData {
        *self.accumulated.lock()
    }

    /// Overwrite the warm-start impulses.
    pub fn store_accumulated(&self, data: AccumulatedSolvingData) {
        *self.accumulated.lock() = data;
    }

    /// Whether two points share the same warm-start cell.
    #[must_use]
    pub fn shares_accumulator_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.accumulated, &other.accumulated)
    }
}

/// Contact points between two bodies.
#[derive(Debug, Clone)]
pub struct ManifoldResult {
    body1: Arc<Body>,
    body2: Arc<Body>,
    points: SmallVec<[ManifoldContactPoint; MAX_MANIFOLD_POINTS]>,
    contact_breaking_threshold: f64,
}

impl ManifoldResult {
    /// Create an empty manifold.
    #[must_use]
    pub fn new(body1: Arc<Body>, body2: Arc<Body>, contact_breaking_threshold: f64) -> Self {
        Self {
            body1,
            body2,
            points: SmallVec::new(),
            contact_breaking_threshold,
        }
    }

    /// First body.
    #[must_use]
    pub fn body1(&self) -> &Arc<Body> {
        &self.body1
    }

    /// Second body.
    #[must_use]
    pub fn body2(&self) -> &Arc<Body> {
        &self.body2
    }

    /// Contact points.
    #[must_use]
    pub fn points(&self) -> &[ManifoldContactPoint] {
        &self.points
    }

    /// Number of contact points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the manifold has no contact point.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Distance beyond which contacts are dropped.
    #[must_use]
    pub fn contact_breaking_threshold(&self) -> f64 {
        self.contact_breaking_threshold
    }

    /// Remove every contact point.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Add a contact given its point on object 2, normal and depth.
    ///
    /// A point within the breaking threshold of an existing one replaces it
    /// and keeps its warm-start impulses. A full manifold keeps its deepest
    /// point and evicts the one whose loss leaves the largest contact area.
    pub fn add_contact_point(
        &mut self,
        transform1: &PhysicsTransform,
        transform2: &PhysicsTransform,
        normal_from_object2: Vector3<f64>,
        point_on_object2: Point3<f64>,
        depth: f64,
        predictive: bool,
    ) {
        let point_on_object1 = point_on_object2 + normal_from_object2 * depth;
        let local_point_on_object2 = transform2.inverse_transform_point(&point_on_object2);
        let merged = self.nearest_point(&local_point_on_object2);

        let point = ManifoldContactPoint {
            normal_from_object2,
            point_on_object1,
            point_on_object2,
            local_point_on_object1: transform1.inverse_transform_point(&point_on_object1),
            local_point_on_object2,
            depth,
            predictive,
            accumulated: merged.map_or_else(Arc::default, |i| Arc::clone(&self.points[i].accumulated)),
        };

        if let Some(i) = merged {
            self.points[i] = point;
        } else if self.points.len() < MAX_MANIFOLD_POINTS {
            self.points.push(point);
        } else {
            let i = self.eviction_index(&local_point_on_object2, depth);
            self.points[i] = point;
        }
    }

    /// Update world points and depths from the current transforms and drop
    /// contacts that separated or drifted beyond the breaking threshold.
    pub fn refresh(&mut self, transform1: &PhysicsTransform, transform2: &PhysicsTransform) {
        let threshold = self.contact_breaking_threshold;
        let mut i = 0;
        while i < self.points.len() {
            let point = &mut self.points[i];
            point.point_on_object1 = transform1.transform_point(&point.local_point_on_object1);
            point.point_on_object2 = transform2.transform_point(&point.local_point_on_object2);
            point.depth = (point.point_on_object1 - point.point_on_object2).dot(&point.normal_from_object2);

            let projected = point.point_on_object1 - point.normal_from_object2 * point.depth;
            let drift = (point.point_on_object2 - projected).norm_squared();

            if point.depth > threshold || drift > threshold * threshold {
                self.points.swap_remove(i);
            } else {
                i += 1;
            }
        }
    }

    fn nearest_point(&self, local_point_on_object2: &Point3<f64>) -> Option<usize> {
        let threshold_sq = self.contact_breaking_threshold * self.contact_breaking_threshold;
        self.points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p.local_point_on_object2 - local_point_on_object2).norm_squared()))
            .filter(|&(_, d)| d <= threshold_sq)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Index to replace in a full manifold.
    fn eviction_index(&self, candidate: &Point3<f64>, depth: f64) -> usize {
        let deepest = self
            .points
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.depth.total_cmp(&b.1.depth))
            .filter(|(_, p)| p.depth < depth)
            .map(|(i, _)| i);

        let locals: [Point3<f64>; MAX_MANIFOLD_POINTS] =
            std::array::from_fn(|i| self.points[i].local_point_on_object2);

        (0..MAX_MANIFOLD_POINTS)
            .filter(|&i| Some(i) != deepest)
            .map(|i| {
                let mut quad = locals;
                quad[i] = *candidate;
                (i, quad_area_measure(&quad))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map_or(0, |(i, _)| i)
    }
}

/// Squared-area measure of a quadrilateral given in no particular order.
fn quad_area_measure(p: &[Point3<f64>; 4]) -> f64 {
    let a = (p[0] - p[1]).cross(&(p[2] - p[3])).norm_squared();
    let b = (p[0] - p[2]).cross(&(p[1] - p[3])).norm_squared();
    let c = (p[0] - p[3]).cross(&(p[1] - p[2])).norm_squared();
    a.max(b).max(c)
}
