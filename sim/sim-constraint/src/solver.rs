//! Sequential impulse solver for contact constraints.
//!
//! This module turns the contact manifolds produced by the narrow phase
//! into velocity impulses on the bodies they join.
//!
//! # Solver Approach
//!
//! Each call to [`ConstraintSolver::solve`] runs three stages:
//!
//! 1. **Setup.** Body velocities are snapshotted and every contact point
//!    becomes one constraint with a normal row and a friction row. Warm
//!    starting reapplies the impulses accumulated last step.
//! 2. **Iterate.** For a fixed number of iterations, every friction row is
//!    solved, then every normal row (projected Gauss-Seidel). Accumulated
//!    normal impulses are clamped to `<= 0` and friction to the Coulomb cone.
//! 3. **Write-back.** Velocities go back to the dynamic bodies and the
//!    accumulated impulses into the manifold points' warm-start cells.
//!
//! # Sign Convention
//!
//! Contact normals point from object 2 toward object 1, and the relative
//! velocity is `(v2 + ω2 × r2) - (v1 + ω1 × r1)`. A positive normal
//! velocity means the bodies approach, so non-penetration impulses are
//! non-positive along the normal.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nalgebra::{Point3, Vector3};
//! use sim_collision::{Body, CollisionShape, ManifoldResult};
//! use sim_constraint::ConstraintSolver;
//! use sim_types::{BodyId, MassProperties, PhysicsTransform, ShapeConfig, SolverConfig, Twist};
//!
//! let ball = Arc::new(
//!     Body::rigid(
//!         BodyId::new(1),
//!         Arc::new(CollisionShape::sphere(0.5)),
//!         PhysicsTransform::from_position(Point3::new(0.0, 0.5, 0.0)),
//!         MassProperties::sphere(1.0, 0.5).unwrap(),
//!         &ShapeConfig::default(),
//!     )
//!     .with_twist(Twist::linear(Vector3::new(0.0, -3.0, 0.0))),
//! );
//! let ground = Arc::new(Body::rigid(
//!     BodyId::new(2),
//!     Arc::new(CollisionShape::cuboid(Vector3::new(5.0, 0.5, 5.0))),
//!     PhysicsTransform::from_position(Point3::new(0.0, -0.5, 0.0)),
//!     MassProperties::static_body(),
//!     &ShapeConfig::default(),
//! ));
//!
//! let mut manifold = ManifoldResult::new(Arc::clone(&ball), Arc::clone(&ground), 0.02);
//! manifold.add_contact_point(
//!     &ball.transform(),
//!     &ground.transform(),
//!     Vector3::y(),
//!     Point3::origin(),
//!     -0.001,
//!     false,
//! );
//!
//! let solver = ConstraintSolver::new(SolverConfig::default()).unwrap();
//! solver.solve(1.0 / 60.0, &[manifold]).unwrap();
//! assert!(ball.twist().linear.y >= 0.0);
//! ```

use std::sync::Arc;

use hashbrown::HashMap;
use nalgebra::{Matrix3, Point3, Vector3};
use sim_collision::pool::FixedSizePool;
use sim_collision::{AccumulatedSolvingData, Body, ManifoldContactPoint, ManifoldResult};
use sim_types::{BodyId, CollisionError, Material, OverflowPolicy, Result, SolverConfig};
use tracing::{error, trace};

/// Tangential speeds below this produce no friction direction.
const TANGENT_EPSILON: f64 = 1e-9;

/// Denominators at or below this magnitude are treated as zero.
const DENOMINATOR_EPSILON: f64 = 1e-12;

// ============================================================================
// Solving data
// ============================================================================

/// Velocity and mass snapshot of one body for the duration of a solve.
#[derive(Debug, Clone)]
struct SolvingBody {
    body: Arc<Body>,
    dynamic: bool,
    position: Point3<f64>,
    linear_velocity: Vector3<f64>,
    angular_velocity: Vector3<f64>,
    inverse_mass: f64,
    inverse_inertia: Matrix3<f64>,
    linear_factor: Vector3<f64>,
    angular_factor: Vector3<f64>,
    material: Material,
}

impl SolvingBody {
    fn snapshot(body: &Arc<Body>) -> Self {
        let state = body.lock();
        Self {
            body: Arc::clone(body),
            dynamic: state.is_dynamic(),
            position: state.transform.position,
            linear_velocity: state.twist.linear,
            angular_velocity: state.twist.angular,
            inverse_mass: state.mass.inverse_mass(),
            inverse_inertia: state
                .mass
                .world_inverse_inertia(&state.transform.orientation),
            linear_factor: state.linear_factor,
            angular_factor: state.angular_factor,
            material: state.material,
        }
    }

    fn velocity_at(&self, r: &Vector3<f64>) -> Vector3<f64> {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    /// Apply `sign * impulse` at offset `r`.
    fn apply_impulse(&mut self, impulse: &Vector3<f64>, r: &Vector3<f64>, sign: f64) {
        if !self.dynamic {
            return;
        }
        let scaled = impulse.component_mul(&self.linear_factor);
        self.linear_velocity += scaled * (self.inverse_mass * sign);
        let angular = (self.inverse_inertia * r.cross(&scaled)).component_mul(&self.angular_factor);
        self.angular_velocity += angular * sign;
    }
}

/// Contact geometry shared by the normal and friction rows.
#[derive(Debug, Clone, Copy)]
pub struct CommonSolvingData {
    /// First body.
    pub body1: BodyId,
    /// Second body.
    pub body2: BodyId,
    /// Contact point relative to body 1's center.
    pub r1: Vector3<f64>,
    /// Contact point relative to body 2's center.
    pub r2: Vector3<f64>,
    /// Unit normal from body 2 toward body 1.
    pub normal: Vector3<f64>,
    /// Friction direction, zero when there is no tangential motion.
    pub tangent: Vector3<f64>,
    /// Signed contact depth.
    pub depth: f64,
}

/// Per-constraint solver coefficients.
#[derive(Debug, Clone, Copy)]
pub struct ImpulseSolvingData {
    /// Combined friction coefficient.
    pub friction: f64,
    /// Effective mass denominator of the normal row.
    pub normal_denominator: f64,
    /// Effective mass denominator of the friction row.
    pub tangent_denominator: f64,
    /// Target normal velocity.
    pub bias: f64,
}

/// Everything the solver keeps for one contact point.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintSolvingData {
    /// Contact geometry.
    pub common: CommonSolvingData,
    /// Solver coefficients.
    pub impulse: ImpulseSolvingData,
    /// Impulses accumulated so far.
    pub accumulated: AccumulatedSolvingData,
}

/// Summary of one [`ConstraintSolver::solve`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverResult {
    /// Contact points turned into constraints.
    pub constraint_count: usize,
    /// Contact points skipped (separated, or involving a ghost body).
    pub skipped_count: usize,
    /// Impulses skipped because of a zero denominator.
    pub degenerate_count: usize,
}

// ============================================================================
// Solver
// ============================================================================

/// Warm-started sequential impulse solver.
///
/// Holds a single-threaded pool for per-step solving data, so a solver is
/// used from one thread at a time.
#[derive(Debug)]
pub struct ConstraintSolver {
    config: SolverConfig,
    pool: FixedSizePool<ConstraintSolvingData>,
}

impl ConstraintSolver {
    /// Create a solver.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(config: SolverConfig) -> Result<Self> {
        config.validate()?;
        let pool = FixedSizePool::new(
            "constraint_solving",
            config.constraint_solving_pool_size,
            OverflowPolicy::HeapFallback,
        );
        Ok(Self { config, pool })
    }

    /// Solver configuration.
    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Pool backing the per-step solving data.
    #[must_use]
    pub fn pool(&self) -> &FixedSizePool<ConstraintSolvingData> {
        &self.pool
    }

    /// Solve the contacts of `manifolds` and update body velocities.
    ///
    /// # Errors
    ///
    /// Returns [`CollisionError::InvalidTimestep`] for a non-positive `dt`.
    pub fn solve(&self, dt: f64, manifolds: &[ManifoldResult]) -> Result<SolverResult> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(CollisionError::InvalidTimestep(dt));
        }

        let mut result = SolverResult::default();
        let mut bodies: HashMap<BodyId, SolvingBody> = HashMap::new();
        let mut constraints = Vec::new();
        let mut points: Vec<&ManifoldContactPoint> = Vec::new();

        // Setup
        for manifold in manifolds {
            let (body1, body2) = (manifold.body1(), manifold.body2());
            if body1.is_ghost() || body2.is_ghost() {
                result.skipped_count += manifold.len();
                continue;
            }
            bodies
                .entry(body1.id())
                .or_insert_with(|| SolvingBody::snapshot(body1));
            bodies
                .entry(body2.id())
                .or_insert_with(|| SolvingBody::snapshot(body2));

            for point in manifold.points() {
                if point.depth > 0.0 && !point.predictive {
                    result.skipped_count += 1;
                    continue;
                }
                let (Some(solving1), Some(solving2)) = (bodies.get(&body1.id()), bodies.get(&body2.id()))
                else {
                    continue;
                };
                let data = self.setup_constraint(dt, point, solving1, solving2);
                constraints.push(self.pool.allocate(data)?);
                points.push(point);
            }
        }
        result.constraint_count = constraints.len();

        if self.config.use_warm_starting {
            for constraint in &constraints {
                let data = constraint.get();
                let impulse = data.common.normal * data.accumulated.acc_normal_impulse
                    + data.common.tangent * data.accumulated.acc_tangent_impulse;
                apply(&mut bodies, &data.common, &impulse);
            }
        }

        // Iterate
        for _ in 0..self.config.iterations {
            for constraint in &mut constraints {
                constraint.with_mut(|data| {
                    if !solve_tangent(&mut bodies, data) {
                        result.degenerate_count += 1;
                    }
                });
            }
            for constraint in &mut constraints {
                constraint.with_mut(|data| {
                    if !solve_normal(&mut bodies, data) {
                        result.degenerate_count += 1;
                    }
                });
            }
        }

        // Write-back
        for (constraint, point) in constraints.iter().zip(&points) {
            point.store_accumulated(constraint.get().accumulated);
        }
        for solving in bodies.values().filter(|b| b.dynamic) {
            let mut state = solving.body.lock();
            state.twist.linear = solving.linear_velocity;
            state.twist.angular = solving.angular_velocity;
        }

        trace!(
            constraints = result.constraint_count,
            skipped = result.skipped_count,
            degenerate = result.degenerate_count,
            iterations = self.config.iterations,
            "contact constraints solved"
        );
        Ok(result)
    }

    fn setup_constraint(
        &self,
        dt: f64,
        point: &ManifoldContactPoint,
        body1: &SolvingBody,
        body2: &SolvingBody,
    ) -> ConstraintSolvingData {
        let p = point.point_on_object2;
        let r1 = p - body1.position;
        let r2 = p - body2.position;
        let normal = point.normal_from_object2;

        let relative = body2.velocity_at(&r2) - body1.velocity_at(&r1);
        let vn = relative.dot(&normal);
        let tangential = relative - normal * vn;
        let tangent = if tangential.norm() > TANGENT_EPSILON {
            tangential.normalize()
        } else {
            Vector3::zeros()
        };

        let friction = body1.material.combined_friction(&body2.material);
        let restitution = body1.material.combined_restitution(&body2.material);
        let restitution_bias = if vn > self.config.restitution_velocity_threshold {
            -restitution * vn
        } else {
            0.0
        };
        let bias = (self.config.bias_factor / dt * point.depth).min(restitution_bias);

        let accumulated = if self.config.use_warm_starting {
            point.accumulated()
        } else {
            AccumulatedSolvingData::default()
        };

        ConstraintSolvingData {
            common: CommonSolvingData {
                body1: body1.body.id(),
                body2: body2.body.id(),
                r1,
                r2,
                normal,
                tangent,
                depth: point.depth,
            },
            impulse: ImpulseSolvingData {
                friction,
                normal_denominator: denominator(body1, body2, &r1, &r2, &normal),
                tangent_denominator: denominator(body1, body2, &r1, &r2, &tangent),
                bias,
            },
            accumulated,
        }
    }
}

/// `m1⁻¹ + m2⁻¹ + ((I1⁻¹(r1×d))×r1 + (I2⁻¹(r2×d))×r2)·d`
fn denominator(
    body1: &SolvingBody,
    body2: &SolvingBody,
    r1: &Vector3<f64>,
    r2: &Vector3<f64>,
    direction: &Vector3<f64>,
) -> f64 {
    let angular1 = (body1.inverse_inertia * r1.cross(direction)).cross(r1);
    let angular2 = (body2.inverse_inertia * r2.cross(direction)).cross(r2);
    body1.inverse_mass + body2.inverse_mass + (angular1 + angular2).dot(direction)
}

fn relative_velocity(bodies: &HashMap<BodyId, SolvingBody>, common: &CommonSolvingData) -> Option<Vector3<f64>> {
    let body1 = bodies.get(&common.body1)?;
    let body2 = bodies.get(&common.body2)?;
    Some(body2.velocity_at(&common.r2) - body1.velocity_at(&common.r1))
}

/// Apply `impulse`: subtracted from body 1, added to body 2.
fn apply(bodies: &mut HashMap<BodyId, SolvingBody>, common: &CommonSolvingData, impulse: &Vector3<f64>) {
    if let Some(body1) = bodies.get_mut(&common.body1) {
        body1.apply_impulse(impulse, &common.r1, -1.0);
    }
    if let Some(body2) = bodies.get_mut(&common.body2) {
        body2.apply_impulse(impulse, &common.r2, 1.0);
    }
}

fn is_degenerate(denominator: f64) -> bool {
    !denominator.is_finite() || denominator.abs() <= DENOMINATOR_EPSILON
}

fn log_degenerate(bodies: &HashMap<BodyId, SolvingBody>, data: &ConstraintSolvingData, row: &str) {
    let (Some(body1), Some(body2)) = (bodies.get(&data.common.body1), bodies.get(&data.common.body2)) else {
        return;
    };
    error!(
        row,
        body1 = %data.common.body1,
        body2 = %data.common.body2,
        inverse_mass1 = body1.inverse_mass,
        inverse_mass2 = body2.inverse_mass,
        inverse_inertia1 = ?body1.inverse_inertia,
        inverse_inertia2 = ?body2.inverse_inertia,
        r1 = ?data.common.r1,
        r2 = ?data.common.r2,
        normal = ?data.common.normal,
        tangent = ?data.common.tangent,
        normal_denominator = data.impulse.normal_denominator,
        tangent_denominator = data.impulse.tangent_denominator,
        "zero denominator in contact constraint, impulse skipped"
    );
}

/// Friction row. Returns `false` when the impulse was skipped.
fn solve_tangent(bodies: &mut HashMap<BodyId, SolvingBody>, data: &mut ConstraintSolvingData) -> bool {
    if data.common.tangent == Vector3::zeros() {
        return true;
    }
    if is_degenerate(data.impulse.tangent_denominator) {
        log_degenerate(bodies, data, "tangent");
        return false;
    }
    let Some(relative) = relative_velocity(bodies, &data.common) else {
        return true;
    };

    let vt = relative.dot(&data.common.tangent);
    let lambda = -vt / data.impulse.tangent_denominator;
    let bound = (-data.impulse.friction * data.accumulated.acc_normal_impulse).max(0.0);
    if !bound.is_finite() {
        error!(
            body1 = %data.common.body1,
            body2 = %data.common.body2,
            friction = data.impulse.friction,
            acc_normal_impulse = data.accumulated.acc_normal_impulse,
            "non-finite friction bound, impulse skipped"
        );
        return false;
    }
    let old = data.accumulated.acc_tangent_impulse;
    data.accumulated.acc_tangent_impulse = (old + lambda).clamp(-bound, bound);

    let delta = data.accumulated.acc_tangent_impulse - old;
    apply(bodies, &data.common, &(data.common.tangent * delta));
    true
}

/// Non-penetration row. Returns `false` when the impulse was skipped.
fn solve_normal(bodies: &mut HashMap<BodyId, SolvingBody>, data: &mut ConstraintSolvingData) -> bool {
    if is_degenerate(data.impulse.normal_denominator) {
        log_degenerate(bodies, data, "normal");
        return false;
    }
    let Some(relative) = relative_velocity(bodies, &data.common) else {
        return true;
    };

    let vn = relative.dot(&data.common.normal);
    let lambda = (-vn + data.impulse.bias) / data.impulse.normal_denominator;
    let old = data.accumulated.acc_normal_impulse;
    data.accumulated.acc_normal_impulse = (old + lambda).min(0.0);

    let delta = data.accumulated.acc_normal_impulse - old;
    apply(bodies, &data.common, &(data.common.normal * delta));
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sim_collision::CollisionShape;
    use sim_types::{MassProperties, PhysicsTransform, ShapeConfig, Twist};

    fn ball(id: u64, position: Point3<f64>, velocity: Vector3<f64>) -> Arc<Body> {
        Arc::new(
            Body::rigid(
                BodyId::new(id),
                Arc::new(CollisionShape::sphere(0.5)),
                PhysicsTransform::from_position(position),
                MassProperties::sphere(1.0, 0.5).unwrap(),
                &ShapeConfig::default(),
            )
            .with_twist(Twist::linear(velocity))
            .with_material(Material::default().with_restitution(0.0).unwrap()),
        )
    }

    fn ground() -> Arc<Body> {
        Arc::new(
            Body::rigid(
                BodyId::new(100),
                Arc::new(CollisionShape::cuboid(Vector3::new(5.0, 0.5, 5.0))),
                PhysicsTransform::from_position(Point3::new(0.0, -0.5, 0.0)),
                MassProperties::static_body(),
                &ShapeConfig::default(),
            )
            .with_material(Material::default().with_restitution(0.0).unwrap()),
        )
    }

    fn contact(body1: &Arc<Body>, body2: &Arc<Body>, point: Point3<f64>, depth: f64) -> ManifoldResult {
        let mut manifold = ManifoldResult::new(Arc::clone(body1), Arc::clone(body2), 0.02);
        manifold.add_contact_point(
            &body1.transform(),
            &body2.transform(),
            Vector3::y(),
            point,
            depth,
            false,
        );
        manifold
    }

    fn solver() -> ConstraintSolver {
        ConstraintSolver::new(SolverConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(ConstraintSolver::new(SolverConfig::default().iterations(0)).is_err());
        assert!(matches!(
            solver().solve(-1.0, &[]),
            Err(CollisionError::InvalidTimestep(_))
        ));
    }

    #[test]
    fn test_falling_ball_is_stopped() {
        let ball = ball(1, Point3::new(0.0, 0.5, 0.0), Vector3::new(0.0, -2.0, 0.0));
        let ground = ground();
        let manifold = contact(&ball, &ground, Point3::origin(), 0.0);

        let result = solver().solve(1.0 / 60.0, &[manifold.clone()]).unwrap();
        assert_eq!(result.constraint_count, 1);
        assert_relative_eq!(ball.twist().linear.y, 0.0, epsilon = 1e-9);
        assert!(manifold.points()[0].accumulated().acc_normal_impulse < 0.0);
        // Static bodies keep their velocity
        assert_eq!(ground.twist(), Twist::zero());
    }

    #[test]
    fn test_penetration_bias_pushes_out() {
        let ball = ball(1, Point3::new(0.0, 0.49, 0.0), Vector3::zeros());
        let ground = ground();
        let manifold = contact(&ball, &ground, Point3::new(0.0, -0.01, 0.0), -0.01);

        solver().solve(0.01, &[manifold]).unwrap();
        // bias = 0.3 / 0.01 * -0.01, the ball leaves at 0.3 m/s
        assert_relative_eq!(ball.twist().linear.y, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn test_restitution_above_threshold() {
        let ball = ball(1, Point3::new(0.0, 0.5, 0.0), Vector3::new(0.0, -4.0, 0.0));
        {
            let mut state = ball.lock();
            state.material = Material::default().with_restitution(0.5).unwrap();
        }
        let ground = ground();
        let manifold = contact(&ball, &ground, Point3::origin(), 0.0);

        solver().solve(1.0 / 60.0, &[manifold]).unwrap();
        assert_relative_eq!(ball.twist().linear.y, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_separated_points_are_skipped() {
        let ball = ball(1, Point3::new(0.0, 0.51, 0.0), Vector3::new(0.0, -1.0, 0.0));
        let ground = ground();
        let manifold = contact(&ball, &ground, Point3::origin(), 0.01);

        let result = solver().solve(1.0 / 60.0, &[manifold]).unwrap();
        assert_eq!(result.constraint_count, 0);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(ball.twist().linear.y, -1.0);
    }

    #[test]
    fn test_ghost_manifolds_are_skipped() {
        let ghost = Arc::new(Body::ghost(
            BodyId::new(7),
            Arc::new(CollisionShape::sphere(1.0)),
            PhysicsTransform::identity(),
        ));
        let ball = ball(1, Point3::new(0.0, 0.5, 0.0), Vector3::new(0.0, -2.0, 0.0));
        let manifold = contact(&ball, &ghost, Point3::origin(), -0.1);

        let result = solver().solve(1.0 / 60.0, &[manifold]).unwrap();
        assert_eq!(result.skipped_count, 1);
        assert_eq!(ball.twist().linear.y, -2.0);
    }

    #[test]
    fn test_friction_stops_sliding_within_cone() {
        let ball = ball(1, Point3::new(0.0, 0.5, 0.0), Vector3::new(0.1, -2.0, 0.0));
        let ground = ground();
        let manifold = contact(&ball, &ground, Point3::origin(), 0.0);

        solver().solve(1.0 / 60.0, &[manifold.clone()]).unwrap();
        let data = manifold.points()[0].accumulated();
        assert!(data.acc_tangent_impulse.abs() <= -0.5 * data.acc_normal_impulse + 1e-12);
        // Sliding slowed down
        assert!(ball.twist().linear.x.abs() < 0.1);
    }

    #[test]
    fn test_two_dynamic_bodies_exchange_momentum() {
        let upper = ball(1, Point3::new(0.0, 1.0, 0.0), Vector3::new(0.0, -1.0, 0.0));
        let lower = ball(2, Point3::new(0.0, 0.0, 0.0), Vector3::zeros());
        let manifold = contact(&upper, &lower, Point3::new(0.0, 0.5, 0.0), 0.0);

        solver().solve(1.0 / 60.0, &[manifold]).unwrap();
        let total = upper.twist().linear + lower.twist().linear;
        assert_relative_eq!(total, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(upper.twist().linear.y, -0.5, epsilon = 1e-9);
        assert_relative_eq!(lower.twist().linear.y, -0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_pool_is_released_after_solve() {
        let ball = ball(1, Point3::new(0.0, 0.5, 0.0), Vector3::new(0.0, -2.0, 0.0));
        let ground = ground();
        let solver = solver();
        solver
            .solve(1.0 / 60.0, &[contact(&ball, &ground, Point3::origin(), 0.0)])
            .unwrap();
        assert_eq!(solver.pool().free_count(), solver.pool().capacity());
    }
}
