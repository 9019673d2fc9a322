//! Collision bodies and per-body locking.
//!
//! A [`Body`] couples an immutable identity and shape with mutable state
//! (transform, velocity, mass, material) held behind a per-body
//! `parking_lot::Mutex`. The mutex is the body's exclusive access token:
//!
//! - the overlapping-pair pass takes two tokens with [`lock_pair`], which
//!   always locks the lower [`BodyId`] first;
//! - the predictive pass and CCD targets take one token at a time and never
//!   hold two at once.
//!
//! With a single global order and no nested single locks, deadlock cannot
//! occur even when ghost queries run on other threads.

use std::sync::Arc;

use nalgebra::Vector3;
use parking_lot::{Mutex, MutexGuard};
use sim_types::{BodyId, Damping, MassProperties, Material, PhysicsTransform, ShapeConfig, Twist};

use crate::narrow_phase::OverlappingPair;
use crate::shape::CollisionShape;

/// What a body takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    /// Dynamic or static rigid body; contacts produce impulses.
    Rigid,
    /// Trigger volume; contacts are reported but never solved.
    Ghost,
}

/// Mutable state of a body, guarded by the body's lock.
#[derive(Debug, Clone)]
pub struct BodyState {
    /// World transform.
    pub transform: PhysicsTransform,
    /// Whether the body is awake.
    pub active: bool,
    /// Linear and angular velocity.
    pub twist: Twist,
    /// Mass and inertia.
    pub mass: MassProperties,
    /// Surface material.
    pub material: Material,
    /// Per-axis scale applied to linear impulses.
    pub linear_factor: Vector3<f64>,
    /// Per-axis scale applied to angular impulses.
    pub angular_factor: Vector3<f64>,
    /// Velocity damping.
    pub damping: Damping,
    /// Step displacement above which continuous collision detection runs.
    pub ccd_motion_threshold: f64,
}

impl BodyState {
    /// Inverse mass scaled per axis by the linear factor.
    #[must_use]
    pub fn linear_inverse_mass(&self) -> Vector3<f64> {
        self.linear_factor * self.mass.inverse_mass()
    }

    /// Whether the body moves under impulses.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        !self.mass.is_static()
    }
}

/// A body taking part in collision detection.
#[derive(Debug)]
pub struct Body {
    id: BodyId,
    shape: Arc<CollisionShape>,
    kind: BodyKind,
    state: Mutex<BodyState>,
}

impl Body {
    /// Create a rigid body.
    ///
    /// The CCD motion threshold is derived from the shape and
    /// `shape_config.ccd_motion_threshold_factor`.
    #[must_use]
    pub fn rigid(
        id: BodyId,
        shape: Arc<CollisionShape>,
        transform: PhysicsTransform,
        mass: MassProperties,
        shape_config: &ShapeConfig,
    ) -> Self {
        let ccd_motion_threshold =
            shape.ccd_motion_threshold(shape_config.ccd_motion_threshold_factor);
        Self {
            id,
            shape,
            kind: BodyKind::Rigid,
            state: Mutex::new(BodyState {
                transform,
                active: !mass.is_static(),
                twist: Twist::zero(),
                mass,
                material: Material::default(),
                linear_factor: Vector3::repeat(1.0),
                angular_factor: Vector3::repeat(1.0),
                damping: Damping::default(),
                ccd_motion_threshold,
            }),
        }
    }

    /// Create a ghost body. Ghosts are static and never sweep.
    #[must_use]
    pub fn ghost(id: BodyId, shape: Arc<CollisionShape>, transform: PhysicsTransform) -> Self {
        Self {
            id,
            shape,
            kind: BodyKind::Ghost,
            state: Mutex::new(BodyState {
                transform,
                active: true,
                twist: Twist::zero(),
                mass: MassProperties::static_body(),
                material: Material::default(),
                linear_factor: Vector3::zeros(),
                angular_factor: Vector3::zeros(),
                damping: Damping::default(),
                ccd_motion_threshold: f64::INFINITY,
            }),
        }
    }

    /// Set the initial velocity.
    #[must_use]
    pub fn with_twist(self, twist: Twist) -> Self {
        self.state.lock().twist = twist;
        self
    }

    /// Set the surface material.
    #[must_use]
    pub fn with_material(self, material: Material) -> Self {
        self.state.lock().material = material;
        self
    }

    /// Set the per-axis linear factor.
    #[must_use]
    pub fn with_linear_factor(self, factor: Vector3<f64>) -> Self {
        self.state.lock().linear_factor = factor;
        self
    }

    /// Set the per-axis angular factor.
    #[must_use]
    pub fn with_angular_factor(self, factor: Vector3<f64>) -> Self {
        self.state.lock().angular_factor = factor;
        self
    }

    /// Set velocity damping.
    #[must_use]
    pub fn with_damping(self, damping: Damping) -> Self {
        self.state.lock().damping = damping;
        self
    }

    /// Set the active flag.
    #[must_use]
    pub fn with_active(self, active: bool) -> Self {
        self.state.lock().active = active;
        self
    }

    /// Body identifier.
    #[must_use]
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Shared shape.
    #[must_use]
    pub fn shape(&self) -> &Arc<CollisionShape> {
        &self.shape
    }

    /// Body kind.
    #[must_use]
    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    /// Whether this is a ghost body.
    #[must_use]
    pub fn is_ghost(&self) -> bool {
        self.kind == BodyKind::Ghost
    }

    /// Take this body's exclusive access token.
    ///
    /// Never call this while holding another body's guard; use
    /// [`lock_pair`] instead.
    pub fn lock(&self) -> MutexGuard<'_, BodyState> {
        self.state.lock()
    }

    /// Current transform (takes the lock briefly).
    #[must_use]
    pub fn transform(&self) -> PhysicsTransform {
        self.state.lock().transform
    }

    /// Current velocity (takes the lock briefly).
    #[must_use]
    pub fn twist(&self) -> Twist {
        self.state.lock().twist
    }

    /// Whether the body is active (takes the lock briefly).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }
}

/// Lock two distinct bodies, lower id first.
///
/// Guards are returned in argument order.
pub fn lock_pair<'a>(
    a: &'a Body,
    b: &'a Body,
) -> (MutexGuard<'a, BodyState>, MutexGuard<'a, BodyState>) {
    debug_assert_ne!(a.id(), b.id(), "lock_pair on the same body");
    if a.id() < b.id() {
        let first = a.lock();
        let second = b.lock();
        (first, second)
    } else {
        let second = b.lock();
        let first = a.lock();
        (first, second)
    }
}

/// A ghost body and the pairs it currently overlaps.
///
/// The pair container is guarded separately from the body state so the
/// broad phase can update it while the narrow phase works on a copy.
#[derive(Debug)]
pub struct GhostBody {
    body: Arc<Body>,
    pairs: Mutex<Vec<OverlappingPair>>,
}

impl GhostBody {
    /// Wrap a ghost body.
    #[must_use]
    pub fn new(body: Arc<Body>) -> Self {
        Self {
            body,
            pairs: Mutex::new(Vec::new()),
        }
    }

    /// The ghost's body.
    #[must_use]
    pub fn body(&self) -> &Arc<Body> {
        &self.body
    }

    /// Start tracking an overlap with `other`. Duplicates are ignored.
    pub fn add_overlapping_pair(&self, other: Arc<Body>) {
        let mut pairs = self.pairs.lock();
        if pairs.iter().any(|p| p.body2().id() == other.id()) {
            return;
        }
        pairs.push(OverlappingPair::new(Arc::clone(&self.body), other));
    }

    /// Stop tracking an overlap. Returns whether a pair was removed.
    pub fn remove_overlapping_pair(&self, other: BodyId) -> bool {
        let mut pairs = self.pairs.lock();
        let before = pairs.len();
        pairs.retain(|p| p.body2().id() != other);
        pairs.len() != before
    }

    /// Number of tracked pairs.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.pairs.lock().len()
    }

    /// Replace the contents of `scratch` with a copy of the tracked pairs.
    pub fn copy_pairs_into(&self, scratch: &mut Vec<OverlappingPair>) {
        scratch.clear();
        scratch.extend(self.pairs.lock().iter().cloned());
    }

    /// Store processed pairs back, matched by body ids.
    ///
    /// Pairs removed since the copy was taken are not resurrected.
    pub fn store_pairs(&self, processed: &[OverlappingPair]) {
        let mut pairs = self.pairs.lock();
        for pair in pairs.iter_mut() {
            if let Some(done) = processed.iter().find(|p| p.same_bodies(pair)) {
                pair.clone_algorithm_from(done);
            }
        }
    }
}
