//! Narrow phase: per-pair contact generation and predictive contacts.
//!
//! [`NarrowPhase::process`] runs two passes over a step:
//!
//! 1. **Overlapping pairs.** For every candidate pair with an active body,
//!    both bodies are locked (lower id first), the cached algorithm is
//!    reused or selected, the persistent manifold is refreshed and the
//!    algorithm adds the new contacts. Non-empty manifolds are returned as
//!    clones that share warm-start cells with the persistent ones.
//! 2. **Predictive contacts.** Every active rigid body whose step
//!    displacement exceeds its CCD motion threshold is swept against the
//!    broad phase's candidates. The earliest hit becomes one predictive
//!    contact in a fresh manifold.
//!
//! Pairs are processed in the order given, so the output is deterministic.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nalgebra::{Point3, Vector3};
//! use sim_collision::{Body, BodyList, BruteForceBroadPhase, CollisionShape, NarrowPhase};
//! use sim_types::{BodyId, CollisionConfig, MassProperties, PhysicsTransform, ShapeConfig};
//!
//! let bodies = Arc::new(BodyList::new());
//! let cube = Arc::new(CollisionShape::cuboid(Vector3::repeat(0.5)));
//! for (id, x) in [(1, 0.0), (2, 0.5)] {
//!     bodies.add(Arc::new(Body::rigid(
//!         BodyId::new(id),
//!         Arc::clone(&cube),
//!         PhysicsTransform::from_position(Point3::new(x, 0.0, 0.0)),
//!         MassProperties::cuboid(1.0, Vector3::repeat(0.5)).unwrap(),
//!         &ShapeConfig::default(),
//!     )));
//! }
//!
//! let broad_phase = Arc::new(BruteForceBroadPhase::new(Arc::clone(&bodies)));
//! let mut pairs = broad_phase.find_pairs();
//! let narrow_phase = NarrowPhase::new(&CollisionConfig::default(), broad_phase, bodies).unwrap();
//!
//! let manifolds = narrow_phase.process(1.0 / 60.0, &mut pairs).unwrap();
//! assert_eq!(manifolds.len(), 1);
//! assert!(manifolds[0].points()[0].depth < 0.0);
//! ```

use std::sync::Arc;

use nalgebra::Point3;
use sim_types::{
    CollisionConfig, CollisionError, NarrowPhaseConfig, PhysicsTransform, Result, ShapeConfig,
};
use tracing::{error, trace};

use crate::algorithm::{
    select_algorithm, AlgorithmResult, AlgorithmSelection, CollisionDispatcher, CollisionObject,
    Contact, ResultPool,
};
use crate::body::{lock_pair, Body, GhostBody};
use crate::broad_phase::{BodyContainer, BroadPhase};
use crate::continuous::{
    ConservativeAdvancement, ContinuousCollisionResult, ContinuousCollisionSet, TemporalObject,
};
use crate::manifold::ManifoldResult;
use crate::shape::{CollisionShape, ConvexShape, Triangle};

/// Cached algorithm of a pair: its selection and persistent manifold.
#[derive(Debug, Clone)]
pub struct CollisionAlgorithm {
    selection: AlgorithmSelection,
    manifold: ManifoldResult,
}

impl CollisionAlgorithm {
    /// The selected algorithm.
    #[must_use]
    pub fn selection(&self) -> AlgorithmSelection {
        self.selection
    }

    /// Persistent manifold, bodies in algorithm order.
    #[must_use]
    pub fn manifold(&self) -> &ManifoldResult {
        &self.manifold
    }
}

/// A candidate pair produced by the broad phase.
#[derive(Debug, Clone)]
pub struct OverlappingPair {
    body1: Arc<Body>,
    body2: Arc<Body>,
    algorithm: Option<CollisionAlgorithm>,
}

impl OverlappingPair {
    /// Create a pair with no cached algorithm.
    #[must_use]
    pub fn new(body1: Arc<Body>, body2: Arc<Body>) -> Self {
        Self {
            body1,
            body2,
            algorithm: None,
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

    /// Cached algorithm, once the pair has been processed.
    #[must_use]
    pub fn algorithm(&self) -> Option<&CollisionAlgorithm> {
        self.algorithm.as_ref()
    }

    /// Whether both pairs join the same bodies in the same order.
    #[must_use]
    pub fn same_bodies(&self, other: &Self) -> bool {
        self.body1.id() == other.body1.id() && self.body2.id() == other.body2.id()
    }

    /// Replace the cached algorithm with a copy of `other`'s.
    pub fn clone_algorithm_from(&mut self, other: &Self) {
        self.algorithm.clone_from(&other.algorithm);
    }
}

/// A ray from `origin` to `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start point.
    pub origin: Point3<f64>,
    /// End point.
    pub end: Point3<f64>,
}

impl Ray {
    /// Create a ray.
    #[must_use]
    pub fn new(origin: Point3<f64>, end: Point3<f64>) -> Self {
        Self { origin, end }
    }
}

/// Scratch buffers reused across the pairs of one call.
struct Scratch {
    triangles: Vec<Triangle>,
    contacts: Vec<Contact>,
}

impl Scratch {
    fn new(shape_config: &ShapeConfig) -> Self {
        Self {
            triangles: Vec::with_capacity(shape_config.triangle_shape_pool_size),
            contacts: Vec::new(),
        }
    }
}

/// Narrow-phase collision detection.
pub struct NarrowPhase {
    config: NarrowPhaseConfig,
    shape_config: ShapeConfig,
    dispatcher: CollisionDispatcher,
    continuous: ConservativeAdvancement,
    broad_phase: Arc<dyn BroadPhase>,
    bodies: Arc<dyn BodyContainer>,
}

impl std::fmt::Debug for NarrowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrowPhase")
            .field("config", &self.config)
            .field("shape_config", &self.shape_config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl NarrowPhase {
    /// Create a narrow phase.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(
        config: &CollisionConfig,
        broad_phase: Arc<dyn BroadPhase>,
        bodies: Arc<dyn BodyContainer>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.narrow_phase.clone(),
            shape_config: config.shape.clone(),
            dispatcher: CollisionDispatcher::new(&config.narrow_phase),
            continuous: ConservativeAdvancement::new(&config.narrow_phase),
            broad_phase,
            bodies,
        })
    }

    /// Narrow-phase configuration.
    #[must_use]
    pub fn config(&self) -> &NarrowPhaseConfig {
        &self.config
    }

    /// Pool backing the algorithm results.
    #[must_use]
    pub fn pool(&self) -> &ResultPool {
        self.dispatcher.pool()
    }

    /// Process one step: overlapping pairs, then predictive contacts.
    ///
    /// # Errors
    ///
    /// Returns [`CollisionError::InvalidTimestep`] for a non-positive `dt`,
    /// and aborts on unsupported shapes or shape pairs, or on pool
    /// exhaustion under `OverflowPolicy::Fail`.
    pub fn process(&self, dt: f64, pairs: &mut [OverlappingPair]) -> Result<Vec<ManifoldResult>> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(CollisionError::InvalidTimestep(dt));
        }

        let mut scratch = Scratch::new(&self.shape_config);
        let mut manifolds = Vec::new();
        for pair in pairs.iter_mut() {
            self.process_pair(pair, &mut scratch, &mut manifolds)?;
        }
        let overlapping = manifolds.len();

        self.process_predictive(dt, &mut scratch, &mut manifolds)?;

        trace!(
            pairs = pairs.len(),
            overlapping,
            predictive = manifolds.len() - overlapping,
            "narrow phase step"
        );
        Ok(manifolds)
    }

    /// Process the pairs of a ghost body.
    ///
    /// The ghost's pairs are copied into `scratch`, processed, and their
    /// cached algorithms stored back. Safe to call from any thread, also
    /// while [`process`](Self::process) runs.
    ///
    /// # Errors
    ///
    /// As [`process`](Self::process).
    pub fn process_ghost_body(
        &self,
        ghost: &GhostBody,
        scratch: &mut Vec<OverlappingPair>,
    ) -> Result<Vec<ManifoldResult>> {
        ghost.copy_pairs_into(scratch);

        let mut buffers = Scratch::new(&self.shape_config);
        let mut manifolds = Vec::new();
        for pair in scratch.iter_mut() {
            self.process_pair(pair, &mut buffers, &mut manifolds)?;
        }

        ghost.store_pairs(scratch);
        Ok(manifolds)
    }

    /// Cast a ray against `candidates`. Ghost bodies are ignored.
    ///
    /// # Errors
    ///
    /// Fails on pool exhaustion under `OverflowPolicy::Fail`.
    pub fn ray_test(&self, ray: &Ray, candidates: &[Arc<Body>]) -> Result<ContinuousCollisionSet> {
        let probe = ConvexShape::Sphere { radius: 0.0 };
        let from = PhysicsTransform::from_position(ray.origin);
        let to = PhysicsTransform::from_position(ray.end);

        let mut triangles = Vec::new();
        let mut set = ContinuousCollisionSet::new();
        self.sweep_convex(&TemporalObject::new(&probe, from, to), candidates, &mut triangles, &mut set)?;
        Ok(set)
    }

    fn process_pair(
        &self,
        pair: &mut OverlappingPair,
        scratch: &mut Scratch,
        manifolds: &mut Vec<ManifoldResult>,
    ) -> Result<()> {
        let body1 = Arc::clone(&pair.body1);
        let body2 = Arc::clone(&pair.body2);
        if body1.id() == body2.id() {
            return Ok(());
        }

        let (state1, state2) = lock_pair(&body1, &body2);
        if !state1.active && !state2.active {
            return Ok(());
        }

        if pair.algorithm.is_none() {
            let selection =
                select_algorithm(body1.shape().shape_type(), body2.shape().shape_type())
                    .map_err(|e| {
                        error!(
                            body1 = %body1.id(),
                            body2 = %body2.id(),
                            shape1 = %body1.shape().shape_type(),
                            shape2 = %body2.shape().shape_type(),
                            "no collision algorithm for shape pair"
                        );
                        e
                    })?;
            let (first, second) = if selection.swapped {
                (Arc::clone(&body2), Arc::clone(&body1))
            } else {
                (Arc::clone(&body1), Arc::clone(&body2))
            };
            pair.algorithm = Some(CollisionAlgorithm {
                selection,
                manifold: ManifoldResult::new(first, second, self.config.contact_breaking_threshold),
            });
        }
        let Some(algorithm) = pair.algorithm.as_mut() else {
            return Ok(());
        };

        let (first, second) = if algorithm.selection.swapped {
            ((&body2, state2.transform), (&body1, state1.transform))
        } else {
            ((&body1, state1.transform), (&body2, state2.transform))
        };

        algorithm.manifold.refresh(&first.1, &second.1);

        scratch.contacts.clear();
        let object1 = CollisionObject::new(first.0.shape().as_shape_ref(), first.1);
        let object2 = CollisionObject::new(second.0.shape().as_shape_ref(), second.1);
        self.dispatcher
            .collide(
                algorithm.selection.kind,
                &object1,
                &object2,
                &mut scratch.triangles,
                &mut scratch.contacts,
            )
            .map_err(|e| {
                error!(
                    body1 = %first.0.id(),
                    body2 = %second.0.id(),
                    error = %e,
                    "collision algorithm failed"
                );
                e
            })?;

        for contact in &scratch.contacts {
            algorithm.manifold.add_contact_point(
                &first.1,
                &second.1,
                contact.normal_from_object2,
                contact.point_on_object2,
                contact.depth,
                false,
            );
        }
        drop((state1, state2));

        if !algorithm.manifold.is_empty() {
            manifolds.push(algorithm.manifold.clone());
        }
        Ok(())
    }

    fn process_predictive(
        &self,
        dt: f64,
        scratch: &mut Scratch,
        manifolds: &mut Vec<ManifoldResult>,
    ) -> Result<()> {
        for body in self.bodies.bodies() {
            if body.is_ghost() {
                continue;
            }
            let (from, twist, threshold) = {
                let state = body.lock();
                if !state.active || !state.is_dynamic() {
                    continue;
                }
                (state.transform, state.twist, state.ccd_motion_threshold)
            };

            let to = from.integrate(&twist.linear, &twist.angular, dt);
            let motion = to.position - from.position;
            if motion.norm() <= threshold {
                continue;
            }

            let candidates = self.broad_phase.body_test(&body, &from, &to);
            if candidates.is_empty() {
                continue;
            }
            let hits = self.sweep_body(&body, &from, &to, &candidates, &mut scratch.triangles)?;
            let Some(hit) = hits.first() else {
                continue;
            };

            let depth = (motion * hit.time_to_hit).dot(&-hit.normal_from_object2);
            trace!(
                body = %body.id(),
                hit = %hit.body2.id(),
                time_to_hit = hit.time_to_hit,
                depth,
                "predictive contact"
            );

            let target_transform = hit.body2.transform();
            let mut manifold = ManifoldResult::new(
                Arc::clone(&body),
                Arc::clone(&hit.body2),
                self.config.contact_breaking_threshold,
            );
            manifold.add_contact_point(
                &from,
                &target_transform,
                hit.normal_from_object2,
                hit.hit_point_on_object2,
                depth,
                true,
            );
            manifolds.push(manifold);
        }
        Ok(())
    }

    fn sweep_body(
        &self,
        body: &Body,
        from: &PhysicsTransform,
        to: &PhysicsTransform,
        candidates: &[Arc<Body>],
        triangles: &mut Vec<Triangle>,
    ) -> Result<ContinuousCollisionSet> {
        let mut set = ContinuousCollisionSet::new();
        match body.shape().as_ref() {
            CollisionShape::Convex(shape) => {
                let moving = TemporalObject::new(shape, *from, *to);
                self.sweep_convex(&moving, candidates, triangles, &mut set)?;
            }
            CollisionShape::Compound(compound) => {
                for child in compound.children() {
                    let moving = TemporalObject::new(
                        &child.shape,
                        from.compose(&child.transform),
                        to.compose(&child.transform),
                    );
                    self.sweep_convex(&moving, candidates, triangles, &mut set)?;
                }
            }
            CollisionShape::Concave(_) => {
                let shape_type = body.shape().shape_type();
                error!(body = %body.id(), shape = %shape_type, "moving concave body cannot be swept");
                return Err(CollisionError::unsupported_shape(
                    shape_type.name(),
                    "continuous collision of a moving body",
                ));
            }
        }
        Ok(set)
    }

    fn sweep_convex(
        &self,
        moving: &TemporalObject<'_>,
        candidates: &[Arc<Body>],
        triangles: &mut Vec<Triangle>,
        set: &mut ContinuousCollisionSet,
    ) -> Result<()> {
        for target in candidates {
            if target.is_ghost() {
                continue;
            }
            let transform = target.transform();
            match target.shape().as_ref() {
                CollisionShape::Convex(shape) => {
                    self.sweep_against(moving, shape, transform, target, set)?;
                }
                CollisionShape::Compound(compound) => {
                    for child in compound.children() {
                        let child_transform = transform.compose(&child.transform);
                        self.sweep_against(moving, &child.shape, child_transform, target, set)?;
                    }
                }
                CollisionShape::Concave(concave) => {
                    let to_local = transform.inverse();
                    let start = triangles.len();
                    if moving.is_ray() {
                        concave.find_segment_triangles(
                            &to_local.transform_point(&moving.from().position),
                            &to_local.transform_point(&moving.to().position),
                            triangles,
                        );
                    } else {
                        let swept = moving
                            .shape()
                            .aabb(&to_local.compose(moving.from()))
                            .merged(&moving.shape().aabb(&to_local.compose(moving.to())));
                        concave.find_triangles(&swept, triangles);
                    }

                    let mut result = Ok(());
                    for i in start..triangles.len() {
                        let triangle = ConvexShape::Triangle {
                            vertices: triangles[i],
                        };
                        result = self.sweep_against(moving, &triangle, transform, target, set);
                        if result.is_err() {
                            break;
                        }
                    }
                    triangles.truncate(start);
                    result?;
                }
            }
        }
        Ok(())
    }

    fn sweep_against(
        &self,
        moving: &TemporalObject<'_>,
        shape: &ConvexShape,
        transform: PhysicsTransform,
        target: &Arc<Body>,
        set: &mut ContinuousCollisionSet,
    ) -> Result<()> {
        let stationary = TemporalObject::stationary(shape, transform);
        let result = self
            .dispatcher
            .pool()
            .allocate(AlgorithmResult::Continuous(self.continuous.process(moving, &stationary)))?;
        let hit = result.with(|result| match result {
            AlgorithmResult::Continuous(Some(toi)) => Some(ContinuousCollisionResult {
                body2: Arc::clone(target),
                normal_from_object2: toi.normal,
                hit_point_on_object2: toi.hit_point_on_b,
                time_to_hit: toi.time,
            }),
            _ => None,
        });
        if let Some(hit) = hit {
            set.insert(hit);
        }
        drop(result);
        Ok(())
    }
}
