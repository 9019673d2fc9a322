//! Rigid body data types.
//!
//! Identity, transform, velocity, mass and surface properties of the bodies
//! taking part in collision detection. These types carry no locking and no
//! shape; they are the plain values that live inside a body's state.

use std::ops::Mul;

use nalgebra::{Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier for a body.
///
/// Ordering on ids defines the lock order used when two bodies are
/// accessed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u64);

impl BodyId {
    /// Create a new body ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for BodyId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({})", self.0)
    }
}

/// Position and orientation of a body or of a shape relative to its body.
///
/// # Example
///
/// ```
/// use sim_types::PhysicsTransform;
/// use nalgebra::{Point3, Vector3};
///
/// let from = PhysicsTransform::from_position(Point3::new(0.0, 1.0, 0.0));
/// let to = from.integrate(&Vector3::new(0.0, -10.0, 0.0), &Vector3::zeros(), 0.1);
/// assert!((to.position.y - 0.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhysicsTransform {
    /// Position in world coordinates.
    pub position: Point3<f64>,
    /// Orientation as a unit quaternion.
    pub orientation: UnitQuaternion<f64>,
}

impl Default for PhysicsTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl PhysicsTransform {
    /// Identity transform (origin, no rotation).
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            orientation: UnitQuaternion::identity(),
        }
    }

    /// Create a transform from a position only.
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            orientation: UnitQuaternion::identity(),
        }
    }

    /// Create a transform from position and orientation.
    #[must_use]
    pub const fn new(position: Point3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Convert to an isometry.
    #[must_use]
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(self.position.coords.into(), self.orientation)
    }

    /// Transform a point from local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.orientation * local.coords
    }

    /// Rotate a vector from local to world coordinates.
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.orientation * local
    }

    /// Transform a point from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.orientation.inverse() * (world - self.position))
    }

    /// Rotate a vector from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_vector(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.orientation.inverse() * world
    }

    /// Compute the inverse transform.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv_rotation = self.orientation.inverse();
        Self {
            position: Point3::from(-(inv_rotation * self.position.coords)),
            orientation: inv_rotation,
        }
    }

    /// Compose two transforms: `self * other`.
    ///
    /// `other` is expressed in the local frame of `self`.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(&other.position),
            orientation: self.orientation * other.orientation,
        }
    }

    /// Predict the transform after moving with the given velocities for `dt`.
    ///
    /// Position advances by `linear * dt`. The orientation is rotated by the
    /// scaled axis `angular * dt`.
    #[must_use]
    pub fn integrate(&self, linear: &Vector3<f64>, angular: &Vector3<f64>, dt: f64) -> Self {
        let rotation = UnitQuaternion::from_scaled_axis(angular * dt);
        Self {
            position: self.position + linear * dt,
            orientation: rotation * self.orientation,
        }
    }

    /// Transform at fraction `t` of the way to `other`.
    ///
    /// Only the position is interpolated; the orientation of `self` is kept.
    #[must_use]
    pub fn lerp_position(&self, other: &Self, t: f64) -> Self {
        Self {
            position: Point3::from(self.position.coords.lerp(&other.position.coords, t)),
            orientation: self.orientation,
        }
    }

    /// Check if the transform contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.orientation.coords.iter().all(|x| x.is_finite())
    }
}

impl Mul for PhysicsTransform {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.compose(&rhs)
    }
}

impl Mul<&PhysicsTransform> for &PhysicsTransform {
    type Output = PhysicsTransform;

    fn mul(self, rhs: &PhysicsTransform) -> PhysicsTransform {
        self.compose(rhs)
    }
}

/// Linear and angular velocity of a body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Twist {
    /// Linear velocity in world coordinates (m/s).
    pub linear: Vector3<f64>,
    /// Angular velocity in world coordinates (rad/s).
    pub angular: Vector3<f64>,
}

impl Default for Twist {
    fn default() -> Self {
        Self::zero()
    }
}

impl Twist {
    /// Create a twist with specified linear and angular velocity.
    #[must_use]
    pub const fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// Create a zero twist (at rest).
    #[must_use]
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// Create a twist with linear velocity only.
    #[must_use]
    pub fn linear(v: Vector3<f64>) -> Self {
        Self {
            linear: v,
            angular: Vector3::zeros(),
        }
    }

    /// Velocity of a point at `offset` from the center of mass.
    ///
    /// `v_point` = `v_linear` + omega × r
    #[must_use]
    pub fn velocity_at_point(&self, offset: &Vector3<f64>) -> Vector3<f64> {
        self.linear + self.angular.cross(offset)
    }

    /// Check if the twist contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.linear.iter().all(|x| x.is_finite()) && self.angular.iter().all(|x| x.is_finite())
    }
}

/// Mass and inertia of a rigid body.
///
/// A mass of zero marks a static body: inverse mass and inverse inertia
/// are both zero.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    mass: f64,
    inverse_mass: f64,
    local_inertia: Vector3<f64>,
    inverse_local_inertia: Vector3<f64>,
}

impl MassProperties {
    /// Create mass properties from a mass and a diagonal local inertia.
    pub fn new(mass: f64, local_inertia: Vector3<f64>) -> crate::Result<Self> {
        if !mass.is_finite() || mass < 0.0 {
            return Err(crate::CollisionError::invalid_mass(format!(
                "mass must be finite and non-negative, got {mass}"
            )));
        }
        if local_inertia.iter().any(|i| !i.is_finite() || *i < 0.0) {
            return Err(crate::CollisionError::invalid_mass(
                "local inertia must be finite and non-negative",
            ));
        }

        if mass == 0.0 {
            return Ok(Self::static_body());
        }

        let inverse_local_inertia =
            local_inertia.map(|i| if i > 0.0 { 1.0 / i } else { 0.0 });
        Ok(Self {
            mass,
            inverse_mass: 1.0 / mass,
            local_inertia,
            inverse_local_inertia,
        })
    }

    /// Mass properties of an immovable body.
    #[must_use]
    pub fn static_body() -> Self {
        Self {
            mass: 0.0,
            inverse_mass: 0.0,
            local_inertia: Vector3::zeros(),
            inverse_local_inertia: Vector3::zeros(),
        }
    }

    /// Mass properties of a uniform solid sphere.
    ///
    /// Inertia of a solid sphere: I = (2/5) * m * r²
    pub fn sphere(mass: f64, radius: f64) -> crate::Result<Self> {
        let i = 0.4 * mass * radius * radius;
        Self::new(mass, Vector3::new(i, i, i))
    }

    /// Mass properties of a uniform solid box.
    ///
    /// - Ixx = (1/12) * m * (y² + z²)
    /// - Iyy = (1/12) * m * (x² + z²)
    /// - Izz = (1/12) * m * (x² + y²)
    pub fn cuboid(mass: f64, half_extents: Vector3<f64>) -> crate::Result<Self> {
        let x2 = 4.0 * half_extents.x * half_extents.x;
        let y2 = 4.0 * half_extents.y * half_extents.y;
        let z2 = 4.0 * half_extents.z * half_extents.z;

        Self::new(
            mass,
            Vector3::new(
                mass * (y2 + z2) / 12.0,
                mass * (x2 + z2) / 12.0,
                mass * (x2 + y2) / 12.0,
            ),
        )
    }

    /// Total mass in kg (0 for static bodies).
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Inverse mass (0 for static bodies).
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        self.inverse_mass
    }

    /// Diagonal of the inertia tensor in body space.
    #[must_use]
    pub fn local_inertia(&self) -> Vector3<f64> {
        self.local_inertia
    }

    /// Check if this represents an immovable body.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.inverse_mass == 0.0
    }

    /// Inverse inertia tensor in world space for the given orientation.
    ///
    /// `R * diag(1/I) * R^T`
    #[must_use]
    pub fn world_inverse_inertia(&self, orientation: &UnitQuaternion<f64>) -> Matrix3<f64> {
        let rotation = orientation.to_rotation_matrix();
        let rotation = rotation.matrix();
        rotation * Matrix3::from_diagonal(&self.inverse_local_inertia) * rotation.transpose()
    }
}

impl Default for MassProperties {
    fn default() -> Self {
        Self::static_body()
    }
}

/// Surface properties used when resolving contacts.
///
/// Both coefficients are finite and non-negative. Use [`Material::new`] or
/// the fallible builders to change them.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Material {
    restitution: f64,
    friction: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            restitution: 0.2,
            friction: 0.5,
        }
    }
}

impl Material {
    /// Create a material.
    ///
    /// # Errors
    ///
    /// Returns [`CollisionError::InvalidConfig`](crate::CollisionError::InvalidConfig)
    /// if either coefficient is negative or not finite.
    pub fn new(restitution: f64, friction: f64) -> crate::Result<Self> {
        Ok(Self {
            restitution: check_coefficient("restitution", restitution)?,
            friction: check_coefficient("friction", friction)?,
        })
    }

    /// Set the restitution (0 = inelastic, 1 = perfectly elastic).
    ///
    /// # Errors
    ///
    /// Fails if `restitution` is negative or not finite.
    pub fn with_restitution(mut self, restitution: f64) -> crate::Result<Self> {
        self.restitution = check_coefficient("restitution", restitution)?;
        Ok(self)
    }

    /// Set the Coulomb friction coefficient.
    ///
    /// # Errors
    ///
    /// Fails if `friction` is negative or not finite.
    pub fn with_friction(mut self, friction: f64) -> crate::Result<Self> {
        self.friction = check_coefficient("friction", friction)?;
        Ok(self)
    }

    /// Coefficient of restitution.
    #[must_use]
    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    /// Coulomb friction coefficient.
    #[must_use]
    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Friction used for a contact between two materials.
    #[must_use]
    pub fn combined_friction(&self, other: &Self) -> f64 {
        (self.friction * other.friction).sqrt()
    }

    /// Restitution used for a contact between two materials.
    #[must_use]
    pub fn combined_restitution(&self, other: &Self) -> f64 {
        self.restitution.max(other.restitution)
    }
}

fn check_coefficient(name: &str, value: f64) -> crate::Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(crate::CollisionError::invalid_config(format!(
            "material {name} must be finite and non-negative, got {value}"
        )))
    }
}

/// Linear and angular velocity damping, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Damping {
    linear: f64,
    angular: f64,
}

impl Damping {
    /// Create a damping pair, rejecting values outside `[0, 1]`.
    pub fn new(linear: f64, angular: f64) -> crate::Result<Self> {
        if !(0.0..=1.0).contains(&linear) {
            return Err(crate::CollisionError::InvalidDamping {
                kind: "linear",
                value: linear,
            });
        }
        if !(0.0..=1.0).contains(&angular) {
            return Err(crate::CollisionError::InvalidDamping {
                kind: "angular",
                value: angular,
            });
        }
        Ok(Self { linear, angular })
    }

    /// Linear damping.
    #[must_use]
    pub fn linear(&self) -> f64 {
        self.linear
    }

    /// Angular damping.
    #[must_use]
    pub fn angular(&self) -> f64 {
        self.angular
    }
}
