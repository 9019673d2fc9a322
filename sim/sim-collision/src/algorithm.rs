//! Collision algorithm selection and the discrete algorithms.
//!
//! [`select_algorithm`] maps a pair of shape types to an [`AlgorithmKind`]
//! and a `swapped` flag. A swapped selection means the algorithm expects
//! the pair's objects in reverse order; the narrow phase builds the
//! manifold in algorithm order, and nested dispatch (compound children,
//! concave triangles) flips the contacts back with [`Contact::flipped`].
//!
//! | pair | algorithm |
//! |---|---|
//! | sphere, sphere | `SphereSphere` |
//! | sphere, box | `SphereBox` (swapped if box first) |
//! | concave, convex or compound | `ConcaveAny` (swapped if concave second) |
//! | compound, convex or compound | `CompoundAny` (swapped if compound second) |
//! | convex, convex | `ConvexConvex` |
//! | concave, concave | unsupported |
//!
//! Every contact produced here uses the same convention: the normal points
//! from object 2 toward object 1, the point lies on object 2 and the depth
//! is negative when the objects penetrate.

use nalgebra::{Point3, Vector3};
use sim_types::{CollisionError, NarrowPhaseConfig, PhysicsTransform, Result};
use tracing::debug;

use crate::continuous::TimeOfImpact;
use crate::epa::{EpaAlgorithm, EpaResult};
use crate::gjk::{GjkAlgorithm, GjkResult};
use crate::pool::SyncFixedSizePool;
use crate::shape::{
    CompoundShape, ConcaveShape, ConvexObject, ConvexShape, ShapeCategory, ShapeRef, ShapeType,
    Triangle,
};

/// Distance under which a separation direction is considered undefined.
const NORMAL_EPSILON: f64 = 1e-12;

/// Discrete collision algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmKind {
    /// Closed form for two spheres.
    SphereSphere,
    /// Closed form for a sphere (object 1) against a box (object 2).
    SphereBox,
    /// GJK on cores, then EPA on the full shapes.
    ConvexConvex,
    /// Concave object 1 against anything: one convex query per triangle.
    ConcaveAny,
    /// Compound object 1 against anything: one query per child.
    CompoundAny,
}

/// An algorithm and the object order it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlgorithmSelection {
    /// Algorithm to run.
    pub kind: AlgorithmKind,
    /// Whether the algorithm takes the pair's objects in reverse order.
    pub swapped: bool,
}

impl AlgorithmSelection {
    const fn new(kind: AlgorithmKind, swapped: bool) -> Self {
        Self { kind, swapped }
    }
}

/// Pick the algorithm for a shape-type pair.
///
/// # Errors
///
/// Returns [`CollisionError::UnsupportedShapePair`] for two concave shapes.
pub fn select_algorithm(first: ShapeType, second: ShapeType) -> Result<AlgorithmSelection> {
    use AlgorithmKind::{CompoundAny, ConcaveAny, ConvexConvex, SphereBox, SphereSphere};
    use ShapeCategory::{Compound, Concave};

    let selection = match (first, second) {
        (ShapeType::Sphere, ShapeType::Sphere) => AlgorithmSelection::new(SphereSphere, false),
        (ShapeType::Sphere, ShapeType::Box) => AlgorithmSelection::new(SphereBox, false),
        (ShapeType::Box, ShapeType::Sphere) => AlgorithmSelection::new(SphereBox, true),
        _ => match (first.category(), second.category()) {
            (Concave, Concave) => {
                return Err(CollisionError::unsupported_pair(first.name(), second.name()));
            }
            (Concave, _) => AlgorithmSelection::new(ConcaveAny, false),
            (_, Concave) => AlgorithmSelection::new(ConcaveAny, true),
            (Compound, _) => AlgorithmSelection::new(CompoundAny, false),
            (_, Compound) => AlgorithmSelection::new(CompoundAny, true),
            _ => AlgorithmSelection::new(ConvexConvex, false),
        },
    };
    Ok(selection)
}

/// A contact produced by a discrete algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Unit normal from object 2 toward object 1.
    pub normal_from_object2: Vector3<f64>,
    /// Contact point on object 2.
    pub point_on_object2: Point3<f64>,
    /// Signed distance; negative when penetrating.
    pub depth: f64,
}

impl Contact {
    /// Contact point on object 1.
    #[must_use]
    pub fn point_on_object1(&self) -> Point3<f64> {
        self.point_on_object2 + self.normal_from_object2 * self.depth
    }

    /// The same contact seen with the objects exchanged.
    #[must_use]
    pub fn flipped(&self) -> Self {
        Self {
            normal_from_object2: -self.normal_from_object2,
            point_on_object2: self.point_on_object1(),
            depth: self.depth,
        }
    }
}

/// Result slot type of the narrow-phase pool.
#[derive(Debug, Clone, Copy)]
pub enum AlgorithmResult {
    /// GJK outcome.
    Gjk(GjkResult),
    /// EPA outcome.
    Epa(EpaResult),
    /// Conservative advancement outcome.
    Continuous(Option<TimeOfImpact>),
}

/// Pool recycling algorithm results between pairs.
pub type ResultPool = SyncFixedSizePool<AlgorithmResult>;

/// A shape placed in the world, as seen by the algorithms.
#[derive(Debug, Clone, Copy)]
pub struct CollisionObject<'a> {
    /// The shape.
    pub shape: ShapeRef<'a>,
    /// World transform.
    pub transform: PhysicsTransform,
}

impl<'a> CollisionObject<'a> {
    /// Place a shape.
    #[must_use]
    pub fn new(shape: ShapeRef<'a>, transform: PhysicsTransform) -> Self {
        Self { shape, transform }
    }

    fn shape_type(&self) -> ShapeType {
        self.shape.shape_type()
    }
}

/// Runs the discrete algorithms with shared solvers and a result pool.
#[derive(Debug)]
pub struct CollisionDispatcher {
    contact_breaking_threshold: f64,
    gjk: GjkAlgorithm,
    epa: EpaAlgorithm,
    pool: ResultPool,
}

impl CollisionDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(config: &NarrowPhaseConfig) -> Self {
        Self {
            contact_breaking_threshold: config.contact_breaking_threshold,
            gjk: GjkAlgorithm::new(config),
            epa: EpaAlgorithm::new(config),
            pool: ResultPool::new("narrow_phase_results", config.algorithm_pool_size, config.pool_overflow),
        }
    }

    /// The result pool.
    #[must_use]
    pub fn pool(&self) -> &ResultPool {
        &self.pool
    }

    /// Contact breaking threshold.
    #[must_use]
    pub fn contact_breaking_threshold(&self) -> f64 {
        self.contact_breaking_threshold
    }

    /// GJK solver.
    #[must_use]
    pub fn gjk(&self) -> &GjkAlgorithm {
        &self.gjk
    }

    /// Select an algorithm for `a` and `b` and append their contacts to
    /// `out`, expressed with `a` as object 1.
    ///
    /// # Errors
    ///
    /// Fails for unsupported shape pairs or on pool exhaustion under
    /// [`OverflowPolicy::Fail`](sim_types::OverflowPolicy::Fail).
    pub fn collide_selected(
        &self,
        a: &CollisionObject<'_>,
        b: &CollisionObject<'_>,
        triangles: &mut Vec<Triangle>,
        out: &mut Vec<Contact>,
    ) -> Result<()> {
        let selection = select_algorithm(a.shape_type(), b.shape_type())?;
        if selection.swapped {
            let start = out.len();
            self.collide(selection.kind, b, a, triangles, out)?;
            for contact in &mut out[start..] {
                *contact = contact.flipped();
            }
            Ok(())
        } else {
            self.collide(selection.kind, a, b, triangles, out)
        }
    }

    /// Run `kind` on `a` and `b`, already in algorithm order.
    ///
    /// `triangles` is scratch space for concave queries; it is left as it
    /// was found.
    ///
    /// # Errors
    ///
    /// Fails if the shapes do not match `kind`, for unsupported nested
    /// pairs, or on pool exhaustion under `OverflowPolicy::Fail`.
    pub fn collide(
        &self,
        kind: AlgorithmKind,
        a: &CollisionObject<'_>,
        b: &CollisionObject<'_>,
        triangles: &mut Vec<Triangle>,
        out: &mut Vec<Contact>,
    ) -> Result<()> {
        match (kind, a.shape, b.shape) {
            (
                AlgorithmKind::SphereSphere,
                ShapeRef::Convex(ConvexShape::Sphere { radius: ra }),
                ShapeRef::Convex(ConvexShape::Sphere { radius: rb }),
            ) => {
                self.sphere_sphere(a, *ra, b, *rb, out);
                Ok(())
            }
            (
                AlgorithmKind::SphereBox,
                ShapeRef::Convex(ConvexShape::Sphere { radius }),
                ShapeRef::Convex(ConvexShape::Box { half_extents }),
            ) => {
                self.sphere_box(a, *radius, b, half_extents, out);
                Ok(())
            }
            (AlgorithmKind::ConvexConvex, ShapeRef::Convex(sa), ShapeRef::Convex(sb)) => {
                self.convex_convex(sa, &a.transform, sb, &b.transform, out)
            }
            (AlgorithmKind::ConcaveAny, ShapeRef::Concave(concave), _) => {
                self.concave_any(concave, &a.transform, b, triangles, out)
            }
            (AlgorithmKind::CompoundAny, ShapeRef::Compound(compound), _) => {
                self.compound_any(compound, &a.transform, b, triangles, out)
            }
            _ => Err(CollisionError::unsupported_pair(
                a.shape_type().name(),
                b.shape_type().name(),
            )),
        }
    }

    fn sphere_sphere(
        &self,
        a: &CollisionObject<'_>,
        radius_a: f64,
        b: &CollisionObject<'_>,
        radius_b: f64,
        out: &mut Vec<Contact>,
    ) {
        let delta = a.transform.position - b.transform.position;
        let distance = delta.norm();
        let depth = distance - radius_a - radius_b;
        if depth > self.contact_breaking_threshold {
            return;
        }
        let normal = if distance > NORMAL_EPSILON {
            delta / distance
        } else {
            Vector3::y()
        };
        out.push(Contact {
            normal_from_object2: normal,
            point_on_object2: b.transform.position + normal * radius_b,
            depth,
        });
    }

    fn sphere_box(
        &self,
        sphere: &CollisionObject<'_>,
        radius: f64,
        cuboid: &CollisionObject<'_>,
        half_extents: &Vector3<f64>,
        out: &mut Vec<Contact>,
    ) {
        let center = cuboid
            .transform
            .inverse_transform_point(&sphere.transform.position);
        let clamped = Point3::from(center.coords.zip_map(half_extents, |c, h| c.clamp(-h, h)));
        let offset = center - clamped;
        let distance = offset.norm();

        let (local_normal, local_point, depth) = if distance > NORMAL_EPSILON {
            if distance - self.contact_breaking_threshold >= radius {
                return;
            }
            (offset / distance, clamped, distance - radius)
        } else {
            // Center inside the box: push out through the nearest face
            let gaps = half_extents - center.coords.abs();
            let axis = gaps.imin();
            let sign = if center[axis] < 0.0 { -1.0 } else { 1.0 };
            let mut normal = Vector3::zeros();
            normal[axis] = sign;
            let mut on_face = center;
            on_face[axis] = sign * half_extents[axis];
            (normal, on_face, -(gaps[axis] + radius))
        };

        out.push(Contact {
            normal_from_object2: cuboid.transform.transform_vector(&local_normal),
            point_on_object2: cuboid.transform.transform_point(&local_point),
            depth,
        });
    }

    fn convex_convex(
        &self,
        shape_a: &ConvexShape,
        transform_a: &PhysicsTransform,
        shape_b: &ConvexShape,
        transform_b: &PhysicsTransform,
        out: &mut Vec<Contact>,
    ) -> Result<()> {
        let core_a = ConvexObject::core(shape_a, *transform_a);
        let core_b = ConvexObject::core(shape_b, *transform_b);
        let margin = core_a.excluded_margin() + core_b.excluded_margin();

        // Results stay in their pool slots until the contact is built
        let core_result = self
            .pool
            .allocate(AlgorithmResult::Gjk(self.gjk.process(&core_a, &core_b)))?;
        let core_simplex = core_result.with(|result| match result {
            AlgorithmResult::Gjk(GjkResult::NoCollide {
                separating_distance,
                simplex,
            }) => {
                let depth = separating_distance - margin;
                if depth < self.contact_breaking_threshold && *separating_distance > NORMAL_EPSILON {
                    let (point_a, point_b) = simplex.closest_points();
                    let normal = (point_a - point_b) / *separating_distance;
                    out.push(Contact {
                        normal_from_object2: normal,
                        point_on_object2: point_b + normal * core_b.excluded_margin(),
                        depth,
                    });
                }
                None
            }
            AlgorithmResult::Gjk(GjkResult::Collide { simplex }) => Some(*simplex),
            _ => {
                debug!(
                    shape_a = %shape_a.shape_type(),
                    shape_b = %shape_b.shape_type(),
                    "GJK invalid on cores, contact skipped"
                );
                None
            }
        });
        let Some(core_simplex) = core_simplex else {
            return Ok(());
        };

        // Cores overlap: penetration of the full shapes
        let full_a = ConvexObject::new(shape_a, *transform_a);
        let full_b = ConvexObject::new(shape_b, *transform_b);
        let full_result = if margin > 0.0 {
            Some(
                self.pool
                    .allocate(AlgorithmResult::Gjk(self.gjk.process(&full_a, &full_b)))?,
            )
        } else {
            None
        };
        let simplex = match &full_result {
            Some(full_result) => full_result.with(|result| match result {
                AlgorithmResult::Gjk(GjkResult::Collide { simplex }) => Some(*simplex),
                _ => None,
            }),
            None => Some(core_simplex),
        };
        let Some(simplex) = simplex else {
            debug!(
                shape_a = %shape_a.shape_type(),
                shape_b = %shape_b.shape_type(),
                "GJK did not confirm overlap of full shapes, contact skipped"
            );
            return Ok(());
        };

        let epa_result = self
            .pool
            .allocate(AlgorithmResult::Epa(self.epa.process(&full_a, &full_b, &simplex)))?;
        epa_result.with(|result| match result {
            AlgorithmResult::Epa(EpaResult::Collide {
                contact_point_b,
                normal,
                depth,
                ..
            }) => out.push(Contact {
                normal_from_object2: *normal,
                point_on_object2: *contact_point_b,
                depth: -depth,
            }),
            AlgorithmResult::Epa(EpaResult::NoCollide) => {}
            _ => debug!(
                shape_a = %shape_a.shape_type(),
                shape_b = %shape_b.shape_type(),
                simplex_size = simplex.len(),
                "EPA invalid, contact skipped"
            ),
        });
        drop((epa_result, full_result, core_result));
        Ok(())
    }

    fn concave_any(
        &self,
        concave: &ConcaveShape,
        transform: &PhysicsTransform,
        other: &CollisionObject<'_>,
        triangles: &mut Vec<Triangle>,
        out: &mut Vec<Contact>,
    ) -> Result<()> {
        let relative = transform.inverse().compose(&other.transform);
        let query = other
            .shape
            .local_aabb()
            .transformed(&relative)
            .expanded(self.contact_breaking_threshold);

        let start = triangles.len();
        concave.find_triangles(&query, triangles);
        let end = triangles.len();

        let mut result = Ok(());
        for i in start..end {
            let triangle = ConvexShape::Triangle {
                vertices: triangles[i],
            };
            let object = CollisionObject::new(ShapeRef::Convex(&triangle), *transform);
            result = self.collide_selected(&object, other, triangles, out);
            if result.is_err() {
                break;
            }
        }
        triangles.truncate(start);
        result
    }

    fn compound_any(
        &self,
        compound: &CompoundShape,
        transform: &PhysicsTransform,
        other: &CollisionObject<'_>,
        triangles: &mut Vec<Triangle>,
        out: &mut Vec<Contact>,
    ) -> Result<()> {
        for child in compound.children() {
            let object = CollisionObject::new(
                ShapeRef::Convex(&child.shape),
                transform.compose(&child.transform),
            );
            self.collide_selected(&object, other, triangles, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::heightfield::HeightField;
    use crate::shape::CollisionShape;
    use approx::assert_relative_eq;

    fn dispatcher() -> CollisionDispatcher {
        CollisionDispatcher::new(&NarrowPhaseConfig::default())
    }

    fn at(x: f64, y: f64, z: f64) -> PhysicsTransform {
        PhysicsTransform::from_position(Point3::new(x, y, z))
    }

    fn contacts(a: &CollisionShape, ta: PhysicsTransform, b: &CollisionShape, tb: PhysicsTransform) -> Vec<Contact> {
        let mut out = Vec::new();
        let mut triangles = Vec::new();
        dispatcher()
            .collide_selected(
                &CollisionObject::new(a.as_shape_ref(), ta),
                &CollisionObject::new(b.as_shape_ref(), tb),
                &mut triangles,
                &mut out,
            )
            .unwrap();
        assert!(triangles.is_empty());
        out
    }

    #[test]
    fn test_selection_table() {
        use AlgorithmKind::*;
        let cases = [
            (ShapeType::Sphere, ShapeType::Sphere, SphereSphere, false),
            (ShapeType::Sphere, ShapeType::Box, SphereBox, false),
            (ShapeType::Box, ShapeType::Sphere, SphereBox, true),
            (ShapeType::Box, ShapeType::Capsule, ConvexConvex, false),
            (ShapeType::Cone, ShapeType::Triangle, ConvexConvex, false),
            (ShapeType::HeightField, ShapeType::Sphere, ConcaveAny, false),
            (ShapeType::Box, ShapeType::TriangleMesh, ConcaveAny, true),
            (ShapeType::Compound, ShapeType::TriangleMesh, ConcaveAny, true),
            (ShapeType::Compound, ShapeType::Box, CompoundAny, false),
            (ShapeType::Sphere, ShapeType::Compound, CompoundAny, true),
            (ShapeType::Compound, ShapeType::Compound, CompoundAny, false),
        ];
        for (first, second, kind, swapped) in cases {
            let selection = select_algorithm(first, second).unwrap();
            assert_eq!(selection.kind, kind, "{first} / {second}");
            assert_eq!(selection.swapped, swapped, "{first} / {second}");
        }

        let err = select_algorithm(ShapeType::HeightField, ShapeType::TriangleMesh).unwrap_err();
        assert!(matches!(err, CollisionError::UnsupportedShapePair { .. }));
    }

    #[test]
    fn test_flipped_contact() {
        let contact = Contact {
            normal_from_object2: Vector3::y(),
            point_on_object2: Point3::new(0.0, 1.0, 0.0),
            depth: -0.1,
        };
        let flipped = contact.flipped();
        assert_eq!(flipped.normal_from_object2, -Vector3::y());
        assert_relative_eq!(flipped.point_on_object2.y, 0.9, epsilon = 1e-12);
        assert_relative_eq!(flipped.point_on_object1().y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_sphere() {
        let sphere = CollisionShape::sphere(0.5);
        let out = contacts(&sphere, at(0.0, 0.9, 0.0), &sphere, at(0.0, 0.0, 0.0));
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].depth, -0.1, epsilon = 1e-12);
        assert_relative_eq!(out[0].normal_from_object2, Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(out[0].point_on_object2.y, 0.5, epsilon = 1e-12);

        assert!(contacts(&sphere, at(0.0, 2.0, 0.0), &sphere, at(0.0, 0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_sphere_box_outside_and_inside() {
        let sphere = CollisionShape::sphere(0.5);
        let cube = CollisionShape::cuboid(Vector3::repeat(1.0));

        let out = contacts(&sphere, at(0.0, 1.4, 0.0), &cube, at(0.0, 0.0, 0.0));
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].depth, -0.1, epsilon = 1e-12);
        assert_relative_eq!(out[0].normal_from_object2, Vector3::y(), epsilon = 1e-12);

        // Center inside, nearest face is +x
        let out = contacts(&sphere, at(0.8, 0.1, 0.0), &cube, at(0.0, 0.0, 0.0));
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].depth, -0.7, epsilon = 1e-12);
        assert_relative_eq!(out[0].normal_from_object2, Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(out[0].point_on_object2.x, 1.0, epsilon = 1e-12);

        // Too far
        assert!(contacts(&sphere, at(0.0, 1.6, 0.0), &cube, at(0.0, 0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_box_sphere_swapped_contact() {
        let sphere = CollisionShape::sphere(0.5);
        let cube = CollisionShape::cuboid(Vector3::repeat(1.0));
        // Box as object 1, sphere above it as object 2
        let out = contacts(&cube, at(0.0, 0.0, 0.0), &sphere, at(0.0, 1.4, 0.0));
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].normal_from_object2, -Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(out[0].point_on_object2.y, 0.9, epsilon = 1e-12);
        assert_relative_eq!(out[0].depth, -0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_convex_convex_margin_contact() {
        let capsule = CollisionShape::capsule(0.5, 0.25);
        let cube = CollisionShape::cuboid(Vector3::repeat(0.5));
        // Capsule bottom at z = 0.51, box top at 0.5
        let out = contacts(&capsule, at(0.0, 0.0, 1.26), &cube, at(0.0, 0.0, 0.0));
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].depth, 0.01, epsilon = 1e-6);
        assert_relative_eq!(out[0].normal_from_object2, Vector3::z(), epsilon = 1e-6);
    }

    #[test]
    fn test_compound_contacts() {
        let dumbbell = CollisionShape::compound(vec![
            (at(-1.0, 0.0, 0.0), ConvexShape::Sphere { radius: 0.5 }),
            (at(1.0, 0.0, 0.0), ConvexShape::Sphere { radius: 0.5 }),
        ])
        .unwrap();
        let floor = CollisionShape::cuboid(Vector3::new(5.0, 0.5, 5.0));

        let out = contacts(&dumbbell, at(0.0, 0.95, 0.0), &floor, at(0.0, 0.0, 0.0));
        assert_eq!(out.len(), 2);
        for contact in &out {
            assert_relative_eq!(contact.depth, -0.05, epsilon = 1e-9);
            assert_relative_eq!(contact.normal_from_object2, Vector3::y(), epsilon = 1e-9);
        }

        // Floor first: contacts are flipped back into pair order
        let out = contacts(&floor, at(0.0, 0.0, 0.0), &dumbbell, at(0.0, 0.95, 0.0));
        assert_eq!(out.len(), 2);
        for contact in &out {
            assert_relative_eq!(contact.normal_from_object2, -Vector3::y(), epsilon = 1e-9);
            assert_relative_eq!(contact.point_on_object2.y, 0.45, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_heightfield_contacts() {
        let terrain = CollisionShape::height_field(HeightField::flat(11, 11, 1.0, 0.0).unwrap());
        let sphere = CollisionShape::sphere(0.5);

        let out = contacts(&sphere, at(2.3, 4.6, 0.45), &terrain, PhysicsTransform::identity());
        let deepest = out
            .iter()
            .min_by(|a, b| a.depth.total_cmp(&b.depth))
            .unwrap();
        assert_relative_eq!(deepest.depth, -0.05, epsilon = 1e-6);
        assert_relative_eq!(deepest.normal_from_object2, Vector3::z(), epsilon = 1e-6);
        assert_relative_eq!(deepest.point_on_object2.z, 0.0, epsilon = 1e-6);
        assert!(out.iter().all(|c| c.depth < 0.02 && c.normal_from_object2.z > 0.0));

        assert!(contacts(&sphere, at(2.3, 4.6, 2.0), &terrain, PhysicsTransform::identity()).is_empty());
    }

    #[test]
    fn test_concave_pair_is_rejected() {
        let terrain = CollisionShape::height_field(HeightField::flat(3, 3, 1.0, 0.0).unwrap());
        let mut out = Vec::new();
        let mut triangles = Vec::new();
        let object = CollisionObject::new(terrain.as_shape_ref(), PhysicsTransform::identity());
        assert!(dispatcher()
            .collide_selected(&object, &object, &mut triangles, &mut out)
            .is_err());
    }
}
