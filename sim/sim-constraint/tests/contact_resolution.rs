//! Integration tests for contact resolution.
//!
//! Contacts come from the real narrow phase and are handed to the solver,
//! the way a physics step would drive both.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use proptest::prelude::*;
use sim_collision::{
    AccumulatedSolvingData, Body, BodyContainer, BodyList, BroadPhase, BruteForceBroadPhase,
    CollisionShape, ManifoldResult, NarrowPhase,
};
use sim_constraint::ConstraintSolver;
use sim_types::{
    BodyId, CollisionConfig, Material, MassProperties, PhysicsTransform, ShapeConfig,
    SolverConfig, Twist,
};

const GRAVITY: f64 = 9.81;

// ============================================================================
// Fixtures
// ============================================================================

struct World {
    broad_phase: Arc<BruteForceBroadPhase>,
    narrow_phase: NarrowPhase,
    solver: ConstraintSolver,
}

impl World {
    fn new(bodies: &[Arc<Body>]) -> Self {
        let config = CollisionConfig::default();
        let list = Arc::new(BodyList::new());
        for body in bodies {
            list.add(Arc::clone(body));
        }
        let broad_phase = Arc::new(BruteForceBroadPhase::new(Arc::clone(&list)));
        let narrow_phase = NarrowPhase::new(
            &config,
            Arc::clone(&broad_phase) as Arc<dyn BroadPhase>,
            list as Arc<dyn BodyContainer>,
        )
        .unwrap();
        let solver = ConstraintSolver::new(config.solver).unwrap();
        Self {
            broad_phase,
            narrow_phase,
            solver,
        }
    }

    fn step(&self, dt: f64) -> Vec<ManifoldResult> {
        let mut pairs = self.broad_phase.find_pairs();
        let manifolds = self.narrow_phase.process(dt, &mut pairs).unwrap();
        self.solver.solve(dt, &manifolds).unwrap();
        manifolds
    }
}

fn ground(material: Material) -> Arc<Body> {
    Arc::new(
        Body::rigid(
            BodyId::new(100),
            Arc::new(CollisionShape::cuboid(Vector3::new(10.0, 0.5, 10.0))),
            PhysicsTransform::from_position(Point3::new(0.0, -0.5, 0.0)),
            MassProperties::static_body(),
            &ShapeConfig::default(),
        )
        .with_material(material),
    )
}

fn sphere(radius: f64, height: f64, velocity: Vector3<f64>, material: Material) -> Arc<Body> {
    Arc::new(
        Body::rigid(
            BodyId::new(1),
            Arc::new(CollisionShape::sphere(radius)),
            PhysicsTransform::from_position(Point3::new(0.0, height, 0.0)),
            MassProperties::sphere(1.0, radius).unwrap(),
            &ShapeConfig::default(),
        )
        .with_twist(Twist::linear(velocity))
        .with_material(material),
    )
}

fn inelastic() -> Material {
    Material::default().with_restitution(0.0).unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn fast_sphere_above_ground_is_stopped() {
    let ball = sphere(0.1, 0.101, Vector3::new(0.0, -10.0, 0.0), Material::default());
    let world = World::new(&[Arc::clone(&ball), ground(Material::default())]);

    let manifolds = world.step(0.016);
    assert!(manifolds.iter().any(|m| m.points().iter().any(|p| p.predictive)));
    assert!(ball.twist().linear.y >= -1e-6);
}

#[test]
fn penetrating_box_is_pushed_out() {
    let cube = Arc::new(
        Body::rigid(
            BodyId::new(1),
            Arc::new(CollisionShape::cuboid(Vector3::repeat(0.5))),
            PhysicsTransform::from_position(Point3::new(0.0, 0.45, 0.0)),
            MassProperties::cuboid(1.0, Vector3::repeat(0.5)).unwrap(),
            &ShapeConfig::default(),
        )
        .with_material(inelastic()),
    );
    let world = World::new(&[Arc::clone(&cube), ground(inelastic())]);

    let manifolds = world.step(1.0 / 60.0);
    assert_eq!(manifolds.len(), 1);
    assert!(cube.twist().linear.y > 0.0);
    for point in manifolds[0].points() {
        assert!(point.accumulated().acc_normal_impulse <= 0.0);
    }
}

#[test]
fn warm_started_resting_contact_does_not_drift() {
    let dt = 1.0 / 60.0;
    let ball = sphere(0.5, 0.499, Vector3::zeros(), inelastic());
    let world = World::new(&[Arc::clone(&ball), ground(inelastic())]);

    let mut pairs = world.broad_phase.find_pairs();
    let mut impulses = Vec::new();
    for _ in 0..20 {
        // Gravity pulls the ball into the ground every step
        ball.lock().twist = Twist::linear(Vector3::new(0.0, -GRAVITY * dt, 0.0));
        let manifolds = world.narrow_phase.process(dt, &mut pairs).unwrap();
        world.solver.solve(dt, &manifolds).unwrap();

        assert_eq!(manifolds.len(), 1);
        assert_eq!(manifolds[0].len(), 1);
        impulses.push(manifolds[0].points()[0].accumulated());
    }

    for window in impulses.windows(2).skip(1) {
        assert_relative_eq!(
            window[0].acc_normal_impulse,
            window[1].acc_normal_impulse,
            epsilon = 1e-9
        );
        assert!(window[1].acc_tangent_impulse.abs() < 1e-9);
    }
    // Ball leaves each step at the position-correction speed
    assert_relative_eq!(ball.twist().linear.y, 0.3 / dt * 0.001, epsilon = 1e-9);
}

#[test]
fn disabled_warm_start_starts_from_zero() {
    let dt = 1.0 / 60.0;
    let ball = sphere(0.5, 0.5, Vector3::new(0.0, -1.0, 0.0), inelastic());
    let ground = ground(inelastic());
    let config = CollisionConfig::default();
    let list = Arc::new(BodyList::new());
    list.add(Arc::clone(&ball));
    list.add(Arc::clone(&ground));
    let broad_phase = Arc::new(BruteForceBroadPhase::new(Arc::clone(&list)));
    let narrow_phase = NarrowPhase::new(
        &config,
        Arc::clone(&broad_phase) as Arc<dyn BroadPhase>,
        list as Arc<dyn BodyContainer>,
    )
    .unwrap();
    let solver = ConstraintSolver::new(config.solver.warm_starting(false)).unwrap();

    let mut pairs = broad_phase.find_pairs();
    for _ in 0..2 {
        ball.lock().twist = Twist::linear(Vector3::new(0.0, -1.0, 0.0));
        let manifolds = narrow_phase.process(dt, &mut pairs).unwrap();
        solver.solve(dt, &manifolds).unwrap();
        // Same impulse every step: nothing carried over
        assert_relative_eq!(
            manifolds[0].points()[0].accumulated().acc_normal_impulse,
            -1.0,
            epsilon = 1e-9
        );
    }
}

#[test]
fn negative_friction_is_rejected() {
    assert!(Material::default().with_friction(-0.1).is_err());
    assert!(Material::default().with_friction(f64::NAN).is_err());
    assert!(Material::new(0.0, -1.0).is_err());
}

#[test]
fn sliding_contact_with_bad_warm_start_does_not_panic() {
    let ball = sphere(0.5, 0.499, Vector3::new(1.0, -2.0, 0.0), inelastic());
    let ground = ground(inelastic());

    let mut manifold = ManifoldResult::new(Arc::clone(&ball), Arc::clone(&ground), 0.02);
    manifold.add_contact_point(
        &ball.transform(),
        &ground.transform(),
        Vector3::y(),
        Point3::new(0.0, -0.001, 0.0),
        -0.001,
        false,
    );
    // A positive normal impulse would turn the friction bound negative
    manifold.points()[0].store_accumulated(AccumulatedSolvingData {
        acc_normal_impulse: 2.0,
        acc_tangent_impulse: 0.0,
    });

    let solver = ConstraintSolver::new(SolverConfig::default()).unwrap();
    solver.solve(1.0 / 60.0, &[manifold.clone()]).unwrap();

    let data = manifold.points()[0].accumulated();
    assert!(data.acc_normal_impulse <= 0.0);
    assert!(data.acc_tangent_impulse.abs() <= -0.5 * data.acc_normal_impulse + 1e-9);
    assert!(ball.twist().linear.y >= -1e-6);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn resting_contact_never_approaches(
        vy in -20.0f64..2.0,
        vx in -3.0f64..3.0,
        penetration in 0.0f64..0.01,
        mass in 0.1f64..50.0,
    ) {
        let ball = Arc::new(
            Body::rigid(
                BodyId::new(1),
                Arc::new(CollisionShape::sphere(0.5)),
                PhysicsTransform::from_position(Point3::new(0.0, 0.5 - penetration, 0.0)),
                MassProperties::sphere(mass, 0.5).unwrap(),
                &ShapeConfig::default(),
            )
            .with_twist(Twist::linear(Vector3::new(vx, vy, 0.0)))
            .with_material(inelastic()),
        );
        let ground = ground(inelastic());

        let mut manifold = ManifoldResult::new(Arc::clone(&ball), Arc::clone(&ground), 0.02);
        manifold.add_contact_point(
            &ball.transform(),
            &ground.transform(),
            Vector3::y(),
            Point3::new(0.0, -penetration, 0.0),
            -penetration,
            false,
        );

        let solver = ConstraintSolver::new(SolverConfig::default()).unwrap();
        solver.solve(1.0 / 60.0, &[manifold.clone()]).unwrap();

        let twist = ball.twist();
        // Velocity of the contact point on the ball along the normal
        let r = Vector3::new(0.0, -0.5, 0.0);
        let normal_velocity = twist.velocity_at_point(&r).y;
        prop_assert!(normal_velocity >= -1e-6, "normal velocity {}", normal_velocity);

        let data = manifold.points()[0].accumulated();
        prop_assert!(data.acc_normal_impulse <= 0.0);
        prop_assert!(data.acc_tangent_impulse.abs() <= -0.5 * data.acc_normal_impulse + 1e-9);
    }
}
