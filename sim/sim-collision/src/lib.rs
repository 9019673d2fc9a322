//! Narrow-phase and continuous collision detection.
//!
//! This crate turns candidate body pairs into contact manifolds:
//!
//! - [`CollisionShape`] - Convex primitives, height fields, triangle meshes and compounds
//! - [`Body`] / [`GhostBody`] - Bodies with lock-protected mutable state
//! - [`BruteForceBroadPhase`] - A simple [`BroadPhase`] over a [`BodyList`]
//! - [`NarrowPhase`] - Pair processing, predictive contacts and ray tests
//! - [`ManifoldResult`] - Persistent contact points with warm-start cells
//!
//! # Algorithms
//!
//! | Pair | Algorithm |
//! |------|-----------|
//! | sphere / sphere | closed form |
//! | sphere / box | closed form |
//! | convex / convex | GJK on the cores, EPA on deep penetration |
//! | concave / convex | triangles from the mid phase, then convex / convex |
//! | compound / anything | per child |
//!
//! Concave against concave is not supported and is reported as
//! [`CollisionError::UnsupportedShapePair`](sim_types::CollisionError::UnsupportedShapePair).
//!
//! # Conventions
//!
//! Contact normals point from object 2 toward object 1, and a penetrating
//! contact has a negative depth: `point_on_object1 = point_on_object2 +
//! normal * depth`.
//!
//! # Threading
//!
//! Each body's state sits behind its own lock. A pair locks both bodies
//! with [`lock_pair`], lower id first, so a ghost body may be processed on
//! another thread while the main step runs.

#![doc(html_root_url = "https://docs.rs/sim-collision/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // nalgebra constructors are not const
    clippy::suboptimal_flops,          // mul_add rewrites hurt readability
    clippy::cast_precision_loss,       // usize to f64 for grid coordinates
    clippy::cast_possible_truncation,  // f64 to usize after clamping
    clippy::cast_sign_loss,            // f64 to usize after clamping
    clippy::missing_errors_doc,        // Error docs added where non-obvious
    clippy::module_name_repetitions,
)]

mod algorithm;
mod body;
mod broad_phase;
mod continuous;
mod epa;
mod gjk;
mod heightfield;
mod manifold;
mod mesh;
mod mid_phase;
mod narrow_phase;
pub mod pool;
mod shape;
mod simplex;

pub use algorithm::{
    select_algorithm, AlgorithmKind, AlgorithmResult, AlgorithmSelection, CollisionDispatcher,
    CollisionObject, Contact, ResultPool,
};
pub use body::{lock_pair, Body, BodyKind, BodyState, GhostBody};
pub use broad_phase::{Aabb, BodyContainer, BodyList, BroadPhase, BruteForceBroadPhase};
pub use continuous::{
    ConservativeAdvancement, ContinuousCollisionResult, ContinuousCollisionSet, TemporalObject,
    TimeOfImpact,
};
pub use epa::{EpaAlgorithm, EpaResult};
pub use gjk::{GjkAlgorithm, GjkResult};
pub use heightfield::HeightField;
pub use manifold::{
    AccumulatedSolvingData, ManifoldContactPoint, ManifoldResult, MAX_MANIFOLD_POINTS,
};
pub use mesh::TriangleMesh;
pub use mid_phase::{Bvh, BvhPrimitive};
pub use narrow_phase::{CollisionAlgorithm, NarrowPhase, OverlappingPair, Ray};
pub use pool::{FixedSizePool, Pooled, SyncFixedSizePool};
pub use shape::{
    CollisionShape, CompoundChild, CompoundShape, ConcaveShape, ConvexObject, ConvexShape,
    ShapeCategory, ShapeRef, ShapeType, SupportMap, Triangle,
};
pub use simplex::{Simplex, SupportMapping};
