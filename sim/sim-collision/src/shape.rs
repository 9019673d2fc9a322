//! Collision shapes and support mapping.
//!
//! Shapes form a closed set of three capabilities:
//!
//! - [`ConvexShape`]: answers support-point queries and feeds GJK, EPA and
//!   conservative advancement directly.
//! - [`ConcaveShape`]: answers spatial triangle queries; every triangle is
//!   then handled as a convex shape.
//! - [`CompoundShape`]: a list of convex children, each with a local transform.
//!
//! Shapes are immutable value data. Bodies share them through `Arc`.
//!
//! # Margins
//!
//! Spheres and capsules are stored as a *core* (a point or a segment) plus a
//! margin equal to their radius. GJK on the cores is cheap and exact, and the
//! margin is added back when computing contact depth. All other shapes have
//! a zero margin.

use nalgebra::{Point3, Vector3};
use sim_types::{CollisionError, PhysicsTransform, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::broad_phase::Aabb;
use crate::heightfield::HeightField;
use crate::mesh::TriangleMesh;

/// Vertices of a triangle.
pub type Triangle = [Point3<f64>; 3];

/// Direction length under which a support query treats the direction as zero.
const DIRECTION_EPSILON: f64 = 1e-12;

/// Capability class of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeCategory {
    /// Support-mapped convex shape.
    Convex,
    /// Triangle soup answering spatial queries.
    Concave,
    /// Convex children with local transforms.
    Compound,
}

/// Concrete shape type, used for algorithm dispatch and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeType {
    /// Sphere.
    Sphere,
    /// Box.
    Box,
    /// Capsule.
    Capsule,
    /// Cylinder.
    Cylinder,
    /// Cone.
    Cone,
    /// Convex hull of a point cloud.
    ConvexHull,
    /// Single triangle.
    Triangle,
    /// Height field.
    HeightField,
    /// Triangle mesh.
    TriangleMesh,
    /// Compound of convex children.
    Compound,
}

impl ShapeType {
    /// Capability class of this type.
    #[must_use]
    pub fn category(self) -> ShapeCategory {
        match self {
            Self::HeightField | Self::TriangleMesh => ShapeCategory::Concave,
            Self::Compound => ShapeCategory::Compound,
            _ => ShapeCategory::Convex,
        }
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sphere => "Sphere",
            Self::Box => "Box",
            Self::Capsule => "Capsule",
            Self::Cylinder => "Cylinder",
            Self::Cone => "Cone",
            Self::ConvexHull => "ConvexHull",
            Self::Triangle => "Triangle",
            Self::HeightField => "HeightField",
            Self::TriangleMesh => "TriangleMesh",
            Self::Compound => "Compound",
        }
    }
}

impl std::fmt::Display for ShapeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Convex shapes
// =============================================================================

/// A convex shape in its local frame.
///
/// Capsules, cylinders and cones are aligned with the local Z axis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConvexShape {
    /// Sphere centered at the origin.
    Sphere {
        /// Radius.
        radius: f64,
    },
    /// Box centered at the origin.
    Box {
        /// Half size along each axis.
        half_extents: Vector3<f64>,
    },
    /// Capsule: a segment along Z swept by a sphere.
    Capsule {
        /// Half length of the core segment.
        half_length: f64,
        /// Radius.
        radius: f64,
    },
    /// Cylinder along Z.
    Cylinder {
        /// Half height.
        half_length: f64,
        /// Radius.
        radius: f64,
    },
    /// Cone along Z with its apex at `+half_height`.
    Cone {
        /// Half height.
        half_height: f64,
        /// Base radius.
        radius: f64,
    },
    /// Convex hull of a set of points.
    ConvexHull {
        /// Hull points (not necessarily all on the hull).
        points: Vec<Point3<f64>>,
    },
    /// A single triangle.
    Triangle {
        /// Vertices.
        vertices: Triangle,
    },
}

impl ConvexShape {
    /// Concrete type.
    #[must_use]
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Self::Sphere { .. } => ShapeType::Sphere,
            Self::Box { .. } => ShapeType::Box,
            Self::Capsule { .. } => ShapeType::Capsule,
            Self::Cylinder { .. } => ShapeType::Cylinder,
            Self::Cone { .. } => ShapeType::Cone,
            Self::ConvexHull { .. } => ShapeType::ConvexHull,
            Self::Triangle { .. } => ShapeType::Triangle,
        }
    }

    /// Radius added around the core shape.
    #[must_use]
    pub fn margin(&self) -> f64 {
        match self {
            Self::Sphere { radius } | Self::Capsule { radius, .. } => *radius,
            _ => 0.0,
        }
    }

    /// Whether this is a zero-radius sphere, i.e. a ray cast probe.
    #[must_use]
    pub fn is_ray(&self) -> bool {
        matches!(self, Self::Sphere { radius } if *radius == 0.0)
    }

    /// Furthest point in `direction` (local space).
    ///
    /// With `include_margin` false, spheres and capsules answer for their
    /// core point or segment.
    #[must_use]
    pub fn local_support(&self, direction: &Vector3<f64>, include_margin: bool) -> Point3<f64> {
        let core = match self {
            Self::Sphere { .. } => Point3::origin(),
            Self::Box { half_extents } => Point3::new(
                half_extents.x.copysign(direction.x),
                half_extents.y.copysign(direction.y),
                half_extents.z.copysign(direction.z),
            ),
            Self::Capsule { half_length, .. } => {
                Point3::new(0.0, 0.0, half_length.copysign(direction.z))
            }
            Self::Cylinder {
                half_length,
                radius,
            } => {
                let radial = Vector3::new(direction.x, direction.y, 0.0);
                let radial_norm = radial.norm();
                let (x, y) = if radial_norm > DIRECTION_EPSILON {
                    (radial.x / radial_norm * radius, radial.y / radial_norm * radius)
                } else {
                    (*radius, 0.0)
                };
                Point3::new(x, y, half_length.copysign(direction.z))
            }
            Self::Cone {
                half_height,
                radius,
            } => {
                let apex = Point3::new(0.0, 0.0, *half_height);
                let radial = Vector3::new(direction.x, direction.y, 0.0);
                let radial_norm = radial.norm();
                let rim = if radial_norm > DIRECTION_EPSILON {
                    Point3::new(
                        radial.x / radial_norm * radius,
                        radial.y / radial_norm * radius,
                        -half_height,
                    )
                } else {
                    Point3::new(*radius, 0.0, -half_height)
                };
                if apex.coords.dot(direction) >= rim.coords.dot(direction) {
                    apex
                } else {
                    rim
                }
            }
            Self::ConvexHull { points } => furthest_point(points, direction),
            Self::Triangle { vertices } => furthest_point(vertices, direction),
        };

        let margin = self.margin();
        if include_margin && margin > 0.0 {
            let norm = direction.norm();
            if norm > DIRECTION_EPSILON {
                return core + direction * (margin / norm);
            }
        }
        core
    }

    /// Local bounds, margin included.
    #[must_use]
    pub fn local_aabb(&self) -> Aabb {
        match self {
            Self::Sphere { radius } => Aabb::from_center(Point3::origin(), Vector3::repeat(*radius)),
            Self::Box { half_extents } => Aabb::from_center(Point3::origin(), *half_extents),
            Self::Capsule {
                half_length,
                radius,
            } => Aabb::from_center(
                Point3::origin(),
                Vector3::new(*radius, *radius, half_length + radius),
            ),
            Self::Cylinder {
                half_length: h,
                radius: r,
            }
            | Self::Cone {
                half_height: h,
                radius: r,
            } => Aabb::from_center(Point3::origin(), Vector3::new(*r, *r, *h)),
            Self::ConvexHull { points } => Aabb::from_points(points).unwrap_or_default(),
            Self::Triangle { vertices } => Aabb::from_points(vertices).unwrap_or_default(),
        }
    }

    /// Bounds in world space under `transform`.
    #[must_use]
    pub fn aabb(&self, transform: &PhysicsTransform) -> Aabb {
        match self {
            Self::Sphere { radius } => Aabb::from_center(transform.position, Vector3::repeat(*radius)),
            _ => self.local_aabb().transformed(transform),
        }
    }

    /// Smallest distance from the local origin to the surface (lower bound).
    #[must_use]
    pub fn min_distance_to_center(&self) -> f64 {
        match self {
            Self::Sphere { radius } | Self::Capsule { radius, .. } => *radius,
            Self::Box { half_extents } => half_extents.min(),
            Self::Cylinder {
                half_length: h,
                radius: r,
            }
            | Self::Cone {
                half_height: h,
                radius: r,
            } => r.min(*h),
            Self::ConvexHull { .. } => self.local_aabb().half_extents().min(),
            Self::Triangle { .. } => 0.0,
        }
    }
}

fn furthest_point(points: &[Point3<f64>], direction: &Vector3<f64>) -> Point3<f64> {
    points
        .iter()
        .copied()
        .max_by(|a, b| a.coords.dot(direction).total_cmp(&b.coords.dot(direction)))
        .unwrap_or_else(Point3::origin)
}

// =============================================================================
// Concave and compound shapes
// =============================================================================

/// A concave shape answering triangle queries.
#[derive(Debug, Clone, PartialEq)]
pub enum ConcaveShape {
    /// Regular height grid.
    HeightField(HeightField),
    /// BVH-indexed triangle mesh.
    TriangleMesh(TriangleMesh),
}

impl ConcaveShape {
    /// Concrete type.
    #[must_use]
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Self::HeightField(_) => ShapeType::HeightField,
            Self::TriangleMesh(_) => ShapeType::TriangleMesh,
        }
    }

    /// Local bounds.
    #[must_use]
    pub fn local_aabb(&self) -> Aabb {
        match self {
            Self::HeightField(field) => field.local_aabb(),
            Self::TriangleMesh(mesh) => mesh.local_aabb(),
        }
    }

    /// Append the triangles overlapping `aabb` (local space) to `out`.
    pub fn find_triangles(&self, aabb: &Aabb, out: &mut Vec<Triangle>) {
        match self {
            Self::HeightField(field) => field.find_triangles(aabb, out),
            Self::TriangleMesh(mesh) => mesh.find_triangles(aabb, out),
        }
    }

    /// Append the triangles a local-space segment may cross to `out`.
    pub fn find_segment_triangles(&self, from: &Point3<f64>, to: &Point3<f64>, out: &mut Vec<Triangle>) {
        match self {
            Self::HeightField(field) => field.find_segment_triangles(from, to, out),
            Self::TriangleMesh(mesh) => mesh.find_segment_triangles(from, to, out),
        }
    }
}

/// A convex child of a compound shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundChild {
    /// Transform relative to the compound's frame.
    pub transform: PhysicsTransform,
    /// Child shape.
    pub shape: ConvexShape,
}

/// A rigid assembly of convex shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundShape {
    children: Vec<CompoundChild>,
}

impl CompoundShape {
    /// Create a compound shape.
    ///
    /// # Errors
    ///
    /// Returns [`CollisionError::InvalidConfig`] if `children` is empty.
    pub fn new(children: Vec<CompoundChild>) -> Result<Self> {
        if children.is_empty() {
            return Err(CollisionError::invalid_config(
                "compound shape needs at least one child",
            ));
        }
        Ok(Self { children })
    }

    /// Children with their local transforms.
    #[must_use]
    pub fn children(&self) -> &[CompoundChild] {
        &self.children
    }

    /// Local bounds of all children.
    #[must_use]
    pub fn local_aabb(&self) -> Aabb {
        self.children
            .iter()
            .map(|c| c.shape.aabb(&c.transform))
            .reduce(|a, b| a.merged(&b))
            .unwrap_or_default()
    }
}

// =============================================================================
// CollisionShape
// =============================================================================

/// Any collision shape.
#[derive(Debug, Clone, PartialEq)]
pub enum CollisionShape {
    /// Convex shape.
    Convex(ConvexShape),
    /// Concave shape.
    Concave(ConcaveShape),
    /// Compound shape.
    Compound(CompoundShape),
}

impl CollisionShape {
    /// Sphere with the given radius.
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        Self::Convex(ConvexShape::Sphere { radius })
    }

    /// Box with the given half extents.
    #[must_use]
    pub fn cuboid(half_extents: Vector3<f64>) -> Self {
        Self::Convex(ConvexShape::Box { half_extents })
    }

    /// Capsule along Z.
    #[must_use]
    pub fn capsule(half_length: f64, radius: f64) -> Self {
        Self::Convex(ConvexShape::Capsule {
            half_length,
            radius,
        })
    }

    /// Cylinder along Z.
    #[must_use]
    pub fn cylinder(half_length: f64, radius: f64) -> Self {
        Self::Convex(ConvexShape::Cylinder {
            half_length,
            radius,
        })
    }

    /// Cone along Z.
    #[must_use]
    pub fn cone(half_height: f64, radius: f64) -> Self {
        Self::Convex(ConvexShape::Cone {
            half_height,
            radius,
        })
    }

    /// Convex hull of `points`.
    ///
    /// # Errors
    ///
    /// Returns [`CollisionError::InvalidConfig`] if `points` is empty.
    pub fn convex_hull(points: Vec<Point3<f64>>) -> Result<Self> {
        if points.is_empty() {
            return Err(CollisionError::invalid_config(
                "convex hull needs at least one point",
            ));
        }
        Ok(Self::Convex(ConvexShape::ConvexHull { points }))
    }

    /// Single triangle.
    #[must_use]
    pub fn triangle(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Self {
        Self::Convex(ConvexShape::Triangle {
            vertices: [a, b, c],
        })
    }

    /// Height field.
    #[must_use]
    pub fn height_field(field: HeightField) -> Self {
        Self::Concave(ConcaveShape::HeightField(field))
    }

    /// Triangle mesh.
    #[must_use]
    pub fn triangle_mesh(mesh: TriangleMesh) -> Self {
        Self::Concave(ConcaveShape::TriangleMesh(mesh))
    }

    /// Compound of `(local transform, convex shape)` children.
    pub fn compound(children: Vec<(PhysicsTransform, ConvexShape)>) -> Result<Self> {
        let children = children
            .into_iter()
            .map(|(transform, shape)| CompoundChild { transform, shape })
            .collect();
        Ok(Self::Compound(CompoundShape::new(children)?))
    }

    /// Concrete type.
    #[must_use]
    pub fn shape_type(&self) -> ShapeType {
        self.as_shape_ref().shape_type()
    }

    /// Borrowed view used by the dispatcher.
    #[must_use]
    pub fn as_shape_ref(&self) -> ShapeRef<'_> {
        match self {
            Self::Convex(shape) => ShapeRef::Convex(shape),
            Self::Concave(shape) => ShapeRef::Concave(shape),
            Self::Compound(shape) => ShapeRef::Compound(shape),
        }
    }

    /// Local bounds.
    #[must_use]
    pub fn local_aabb(&self) -> Aabb {
        match self {
            Self::Convex(shape) => shape.local_aabb(),
            Self::Concave(shape) => shape.local_aabb(),
            Self::Compound(shape) => shape.local_aabb(),
        }
    }

    /// Bounds in world space under `transform`.
    #[must_use]
    pub fn aabb(&self, transform: &PhysicsTransform) -> Aabb {
        match self {
            Self::Convex(shape) => shape.aabb(transform),
            _ => self.local_aabb().transformed(transform),
        }
    }

    /// Smallest distance from the local origin to the surface (lower bound).
    #[must_use]
    pub fn min_distance_to_center(&self) -> f64 {
        match self {
            Self::Convex(shape) => shape.min_distance_to_center(),
            Self::Concave(shape) => shape.local_aabb().half_extents().min(),
            Self::Compound(shape) => shape
                .children()
                .iter()
                .map(|c| c.shape.min_distance_to_center())
                .fold(f64::INFINITY, f64::min),
        }
    }

    /// Distance a body with this shape may travel in one step before
    /// continuous collision detection is used.
    #[must_use]
    pub fn ccd_motion_threshold(&self, factor: f64) -> f64 {
        self.min_distance_to_center() * 2.0 * factor
    }
}

/// Borrowed shape, either a body's whole shape or a compound child.
#[derive(Debug, Clone, Copy)]
pub enum ShapeRef<'a> {
    /// Convex shape.
    Convex(&'a ConvexShape),
    /// Concave shape.
    Concave(&'a ConcaveShape),
    /// Compound shape.
    Compound(&'a CompoundShape),
}

impl ShapeRef<'_> {
    /// Concrete type.
    #[must_use]
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Self::Convex(shape) => shape.shape_type(),
            Self::Concave(shape) => shape.shape_type(),
            Self::Compound(_) => ShapeType::Compound,
        }
    }

    /// Local bounds.
    #[must_use]
    pub fn local_aabb(&self) -> Aabb {
        match self {
            Self::Convex(shape) => shape.local_aabb(),
            Self::Concave(shape) => shape.local_aabb(),
            Self::Compound(shape) => shape.local_aabb(),
        }
    }
}

// =============================================================================
// Support mapping
// =============================================================================

/// World-space support mapping of a convex object.
pub trait SupportMap {
    /// Furthest point of the object in `direction`.
    fn support_point(&self, direction: &Vector3<f64>) -> Point3<f64>;
}

/// A convex shape placed in the world.
#[derive(Debug, Clone, Copy)]
pub struct ConvexObject<'a> {
    shape: &'a ConvexShape,
    transform: PhysicsTransform,
    include_margin: bool,
}

impl<'a> ConvexObject<'a> {
    /// Full shape, margin included.
    #[must_use]
    pub fn new(shape: &'a ConvexShape, transform: PhysicsTransform) -> Self {
        Self {
            shape,
            transform,
            include_margin: true,
        }
    }

    /// Core shape only (sphere center, capsule segment).
    #[must_use]
    pub fn core(shape: &'a ConvexShape, transform: PhysicsTransform) -> Self {
        Self {
            shape,
            transform,
            include_margin: false,
        }
    }

    /// The wrapped shape.
    #[must_use]
    pub fn shape(&self) -> &'a ConvexShape {
        self.shape
    }

    /// World transform.
    #[must_use]
    pub fn transform(&self) -> &PhysicsTransform {
        &self.transform
    }

    /// Margin that this object leaves out of its support points.
    #[must_use]
    pub fn excluded_margin(&self) -> f64 {
        if self.include_margin {
            0.0
        } else {
            self.shape.margin()
        }
    }
}

impl SupportMap for ConvexObject<'_> {
    fn support_point(&self, direction: &Vector3<f64>) -> Point3<f64> {
        let local_dir = self.transform.inverse_transform_vector(direction);
        let local = self.shape.local_support(&local_dir, self.include_margin);
        self.transform.transform_point(&local)
    }
}
