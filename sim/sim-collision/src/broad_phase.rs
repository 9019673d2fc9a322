//! Broad-phase interfaces and bounding boxes.
//!
//! Spatial partitioning is outside this crate: the narrow phase receives
//! candidate [`OverlappingPair`](crate::OverlappingPair)s from the caller and
//! asks a [`BroadPhase`] for the bodies a swept shape may hit. The
//! [`BruteForceBroadPhase`] and [`BodyList`] reference implementations are
//! O(n²) and O(n) respectively; they serve tests, benchmarks and small scenes.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sim_collision::{Body, BodyList, BruteForceBroadPhase, CollisionShape};
//! use sim_types::{BodyId, MassProperties, PhysicsTransform, ShapeConfig};
//! use nalgebra::Point3;
//!
//! let shape = Arc::new(CollisionShape::sphere(0.5));
//! let bodies = Arc::new(BodyList::new());
//! for (id, x) in [(1, 0.0), (2, 0.8), (3, 5.0)] {
//!     bodies.add(Arc::new(Body::rigid(
//!         BodyId::new(id),
//!         Arc::clone(&shape),
//!         PhysicsTransform::from_position(Point3::new(x, 0.0, 0.0)),
//!         MassProperties::sphere(1.0, 0.5).unwrap(),
//!         &ShapeConfig::default(),
//!     )));
//! }
//!
//! let broad_phase = BruteForceBroadPhase::new(bodies);
//! assert_eq!(broad_phase.find_pairs().len(), 1);
//! ```

use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use parking_lot::RwLock;
use sim_types::{BodyId, PhysicsTransform};

use crate::body::Body;
use crate::narrow_phase::OverlappingPair;

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3<f64>,
    /// Maximum corner of the bounding box.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a new AABB from minimum and maximum corners.
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Smallest AABB containing all `points`, or `None` for an empty iterator.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = *points.next()?;
        Some(points.fold(Self::new(first, first), |aabb, p| aabb.including(p)))
    }

    /// Grow this box to contain `point`.
    #[must_use]
    pub fn including(&self, point: &Point3<f64>) -> Self {
        Self {
            min: self.min.inf(point),
            max: self.max.sup(point),
        }
    }

    /// Smallest box containing both boxes.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Check if this AABB overlaps with another AABB.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Expand this AABB by a margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        let margin = Vector3::repeat(margin);
        Self {
            min: self.min - margin,
            max: self.max + margin,
        }
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Half of the size along each axis.
    #[must_use]
    pub fn half_extents(&self) -> Vector3<f64> {
        (self.max - self.min) * 0.5
    }

    /// The eight corners of the box.
    #[must_use]
    pub fn corners(&self) -> [Point3<f64>; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Point3::new(lo.x, lo.y, lo.z),
            Point3::new(hi.x, lo.y, lo.z),
            Point3::new(lo.x, hi.y, lo.z),
            Point3::new(hi.x, hi.y, lo.z),
            Point3::new(lo.x, lo.y, hi.z),
            Point3::new(hi.x, lo.y, hi.z),
            Point3::new(lo.x, hi.y, hi.z),
            Point3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Bounding box of this box after applying `transform`.
    #[must_use]
    pub fn transformed(&self, transform: &PhysicsTransform) -> Self {
        let corners = self.corners().map(|c| transform.transform_point(&c));
        Self::from_points(&corners).unwrap_or(*self)
    }

    /// Check whether the segment from `from` to `to` touches the box.
    ///
    /// Slab test on the three axes.
    #[must_use]
    pub fn intersects_segment(&self, from: &Point3<f64>, to: &Point3<f64>) -> bool {
        let direction = to - from;
        let mut t_min = 0.0_f64;
        let mut t_max = 1.0_f64;

        for axis in 0..3 {
            let d = direction[axis];
            let o = from[axis];
            if d.abs() < f64::EPSILON {
                if o < self.min[axis] || o > self.max[axis] {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t0 = (self.min[axis] - o) * inv;
            let mut t1 = (self.max[axis] - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return false;
            }
        }
        true
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Point3::origin(), Point3::origin())
    }
}

/// Source of CCD candidates.
pub trait BroadPhase: Send + Sync {
    /// Bodies whose bounds intersect `body`'s shape swept from `from` to `to`.
    ///
    /// The queried body itself must not be returned.
    fn body_test(
        &self,
        body: &Body,
        from: &PhysicsTransform,
        to: &PhysicsTransform,
    ) -> Vec<Arc<Body>>;
}

/// Owner of the bodies taking part in the simulation.
pub trait BodyContainer: Send + Sync {
    /// Snapshot of all bodies.
    fn bodies(&self) -> Vec<Arc<Body>>;
}

/// A plain list of bodies.
#[derive(Debug, Default)]
pub struct BodyList {
    bodies: RwLock<Vec<Arc<Body>>>,
}

impl BodyList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a body.
    pub fn add(&self, body: Arc<Body>) {
        self.bodies.write().push(body);
    }

    /// Remove a body by id. Returns the removed body if it was present.
    pub fn remove(&self, id: BodyId) -> Option<Arc<Body>> {
        let mut bodies = self.bodies.write();
        let index = bodies.iter().position(|b| b.id() == id)?;
        Some(bodies.remove(index))
    }

    /// Find a body by id.
    #[must_use]
    pub fn get(&self, id: BodyId) -> Option<Arc<Body>> {
        self.bodies.read().iter().find(|b| b.id() == id).cloned()
    }

    /// Number of bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.read().len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.read().is_empty()
    }
}

impl BodyContainer for BodyList {
    fn bodies(&self) -> Vec<Arc<Body>> {
        self.bodies.read().clone()
    }
}

/// Brute-force broad phase over a [`BodyList`].
#[derive(Debug)]
pub struct BruteForceBroadPhase {
    bodies: Arc<BodyList>,
    margin: f64,
}

impl BruteForceBroadPhase {
    /// Create a broad phase over `bodies`.
    #[must_use]
    pub fn new(bodies: Arc<BodyList>) -> Self {
        Self {
            bodies,
            margin: 0.0,
        }
    }

    /// Set the margin added around every bounding box.
    #[must_use]
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// The body list this broad phase reads.
    #[must_use]
    pub fn body_list(&self) -> &Arc<BodyList> {
        &self.bodies
    }

    /// All pairs of bodies whose bounds overlap, lower id first.
    #[must_use]
    pub fn find_pairs(&self) -> Vec<OverlappingPair> {
        let mut bodies = self.bodies.bodies();
        bodies.sort_by_key(|b| b.id());
        let aabbs: Vec<Aabb> = bodies
            .iter()
            .map(|b| b.shape().aabb(&b.transform()).expanded(self.margin))
            .collect();

        let mut pairs = Vec::new();
        for i in 0..bodies.len() {
            for j in (i + 1)..bodies.len() {
                if aabbs[i].overlaps(&aabbs[j]) {
                    pairs.push(OverlappingPair::new(
                        Arc::clone(&bodies[i]),
                        Arc::clone(&bodies[j]),
                    ));
                }
            }
        }
        pairs
    }
}

impl BroadPhase for BruteForceBroadPhase {
    fn body_test(
        &self,
        body: &Body,
        from: &PhysicsTransform,
        to: &PhysicsTransform,
    ) -> Vec<Arc<Body>> {
        let swept = body
            .shape()
            .aabb(from)
            .merged(&body.shape().aabb(to))
            .expanded(self.margin);

        self.bodies
            .bodies()
            .into_iter()
            .filter(|other| other.id() != body.id())
            .filter(|other| {
                let aabb = other.shape().aabb(&other.transform());
                aabb.expanded(self.margin).overlaps(&swept)
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::CollisionShape;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use sim_types::{MassProperties, ShapeConfig};

    fn sphere_at(id: u64, x: f64) -> Arc<Body> {
        Arc::new(Body::rigid(
            BodyId::new(id),
            Arc::new(CollisionShape::sphere(0.5)),
            PhysicsTransform::from_position(Point3::new(x, 0.0, 0.0)),
            MassProperties::sphere(1.0, 0.5).unwrap(),
            &ShapeConfig::default(),
        ))
    }

    #[test]
    fn test_aabb_overlap() {
        let a = Aabb::from_center(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        let b = Aabb::from_center(Point3::new(1.5, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let c = Aabb::from_center(Point3::new(3.0, 0.0, 0.0), Vector3::new(0.5, 0.5, 0.5));

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.merged(&c).overlaps(&c));
    }

    #[test]
    fn test_aabb_transformed() {
        let aabb = Aabb::from_center(Point3::origin(), Vector3::new(1.0, 0.5, 0.5));
        let rotated = aabb.transformed(&PhysicsTransform::new(
            Point3::new(0.0, 0.0, 2.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        ));

        assert_relative_eq!(rotated.half_extents().x, 0.5, epsilon = 1e-10);
        assert_relative_eq!(rotated.half_extents().y, 1.0, epsilon = 1e-10);
        assert_relative_eq!(rotated.center().z, 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_aabb_segment() {
        let aabb = Aabb::from_center(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        assert!(aabb.intersects_segment(&Point3::new(0.0, 5.0, 0.0), &Point3::new(0.0, -5.0, 0.0)));
        assert!(!aabb.intersects_segment(&Point3::new(2.0, 5.0, 0.0), &Point3::new(2.0, -5.0, 0.0)));
        assert!(!aabb.intersects_segment(&Point3::new(0.0, 5.0, 0.0), &Point3::new(0.0, 2.0, 0.0)));
    }

    #[test]
    fn test_body_list() {
        let list = BodyList::new();
        list.add(sphere_at(1, 0.0));
        list.add(sphere_at(2, 1.0));
        assert_eq!(list.len(), 2);
        assert!(list.get(BodyId::new(2)).is_some());
        assert!(list.remove(BodyId::new(1)).is_some());
        assert!(list.remove(BodyId::new(1)).is_none());
        assert_eq!(list.bodies().len(), 1);
    }

    #[test]
    fn test_body_test_sweep() {
        let list = Arc::new(BodyList::new());
        let mover = sphere_at(1, 0.0);
        list.add(Arc::clone(&mover));
        list.add(sphere_at(2, 4.0));
        list.add(sphere_at(3, -4.0));

        let broad_phase = BruteForceBroadPhase::new(list);
        let from = mover.transform();
        let to = PhysicsTransform::from_position(Point3::new(5.0, 0.0, 0.0));

        let hits = broad_phase.body_test(&mover, &from, &to);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), BodyId::new(2));
    }
}
