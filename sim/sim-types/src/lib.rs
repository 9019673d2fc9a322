//! Core data types for collision detection and contact resolution.
//!
//! This crate provides the plain values shared by the collision pipeline:
//!
//! - [`PhysicsTransform`] - Position and orientation, with composition and integration
//! - [`Twist`], [`MassProperties`], [`Material`], [`Damping`] - Rigid body properties
//! - [`CollisionConfig`] - Narrow phase, solver and shape tunables
//! - [`CollisionError`] - The error type used across the workspace
//!
//! # Design Philosophy
//!
//! These types are **pure data**. Shapes, locking and algorithms live in
//! `sim-collision`; the impulse solver lives in `sim-constraint`.
//!
//! # Conventions
//!
//! - Right-handed coordinates
//! - Contact normals point from the second object toward the first
//! - Penetration depths are negative
//!
//! # Example
//!
//! ```
//! use sim_types::{PhysicsTransform, Twist};
//! use nalgebra::{Point3, Vector3};
//!
//! let twist = Twist::linear(Vector3::new(0.0, 0.0, -2.0));
//! let from = PhysicsTransform::from_position(Point3::new(0.0, 0.0, 1.0));
//! let to = from.integrate(&twist.linear, &twist.angular, 0.5);
//!
//! assert!(to.position.z.abs() < 1e-10);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-types/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
// Allow certain clippy lints that are overly pedantic for type definitions
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod error;

pub use body::{BodyId, Damping, MassProperties, Material, PhysicsTransform, Twist};
pub use config::{CollisionConfig, NarrowPhaseConfig, OverflowPolicy, ShapeConfig, SolverConfig};
pub use error::CollisionError;

// Re-export math types for convenience
pub use nalgebra::{Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for collision operations.
pub type Result<T> = std::result::Result<T, CollisionError>;
