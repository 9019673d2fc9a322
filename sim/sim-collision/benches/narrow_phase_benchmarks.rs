//! Benchmarks for narrow-phase collision detection.
//!
//! Run with: cargo bench -p sim-collision

#![allow(missing_docs, clippy::unwrap_used, clippy::cast_precision_loss)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nalgebra::{Point3, UnitQuaternion, Vector3};
use sim_collision::{
    Body, BodyContainer, BodyList, BroadPhase, BruteForceBroadPhase, CollisionShape, ConvexObject,
    ConvexShape, EpaAlgorithm, GjkAlgorithm, GjkResult, HeightField, NarrowPhase, Ray,
    TriangleMesh,
};
use sim_types::{
    BodyId, CollisionConfig, MassProperties, NarrowPhaseConfig, PhysicsTransform, ShapeConfig,
};

/// Flat square grid of `cells × cells` quads, two triangles each.
fn generate_floor_mesh(cells: usize) -> TriangleMesh {
    let size = 10.0;
    let step = size / cells as f64;
    let mut vertices = Vec::with_capacity((cells + 1) * (cells + 1));
    for y in 0..=cells {
        for x in 0..=cells {
            vertices.push(Point3::new(
                x as f64 * step - size / 2.0,
                y as f64 * step - size / 2.0,
                0.0,
            ));
        }
    }

    let mut indices = Vec::with_capacity(cells * cells * 2);
    for y in 0..cells {
        for x in 0..cells {
            let i = y * (cells + 1) + x;
            indices.push([i, i + 1, i + cells + 2]);
            indices.push([i, i + cells + 2, i + cells + 1]);
        }
    }
    TriangleMesh::new(vertices, indices).unwrap()
}

fn scene(bodies: Vec<Body>) -> (Arc<BruteForceBroadPhase>, NarrowPhase) {
    let list = Arc::new(BodyList::new());
    for body in bodies {
        list.add(Arc::new(body));
    }
    let broad_phase = Arc::new(BruteForceBroadPhase::new(Arc::clone(&list)));
    let narrow_phase = NarrowPhase::new(
        &CollisionConfig::default(),
        Arc::clone(&broad_phase) as Arc<dyn BroadPhase>,
        list as Arc<dyn BodyContainer>,
    )
    .unwrap();
    (broad_phase, narrow_phase)
}

fn body(id: u64, shape: CollisionShape, position: Point3<f64>, dynamic: bool) -> Body {
    let mass = if dynamic {
        MassProperties::sphere(1.0, 0.5).unwrap()
    } else {
        MassProperties::static_body()
    };
    Body::rigid(
        BodyId::new(id),
        Arc::new(shape),
        PhysicsTransform::from_position(position),
        mass,
        &ShapeConfig::default(),
    )
}

/// GJK distance and EPA penetration between convex shapes.
fn bench_gjk_epa(c: &mut Criterion) {
    let mut group = c.benchmark_group("gjk_epa");
    let config = NarrowPhaseConfig::default();
    let gjk = GjkAlgorithm::new(&config);
    let epa = EpaAlgorithm::new(&config);

    let cube = ConvexShape::Box {
        half_extents: Vector3::repeat(0.5),
    };
    let cylinder = ConvexShape::Cylinder {
        half_length: 0.5,
        radius: 0.4,
    };
    let rotated = PhysicsTransform::new(
        Point3::new(0.6, 0.2, 0.1),
        UnitQuaternion::from_euler_angles(0.3, 0.2, 0.7),
    );

    for (name, shape) in [("box_box", &cube), ("box_cylinder", &cylinder)] {
        let a = ConvexObject::new(&cube, PhysicsTransform::identity());
        let far = ConvexObject::new(shape, PhysicsTransform::from_position(Point3::new(3.0, 0.0, 0.0)));
        let near = ConvexObject::new(shape, rotated);

        group.bench_function(BenchmarkId::new("separated", name), |b| {
            b.iter(|| black_box(gjk.process(&a, &far)));
        });

        group.bench_function(BenchmarkId::new("penetrating", name), |b| {
            b.iter(|| {
                if let GjkResult::Collide { simplex } = gjk.process(&a, &near) {
                    black_box(epa.process(&a, &near, &simplex));
                }
            });
        });
    }

    group.finish();
}

/// Sphere resting on meshes of growing triangle count.
fn bench_sphere_on_mesh(c: &mut Criterion) {
    let mut group = c.benchmark_group("sphere_on_mesh");

    for cells in [4, 16, 64] {
        let mesh = generate_floor_mesh(cells);
        let triangles = mesh.triangle_count();
        let (broad_phase, narrow_phase) = scene(vec![
            body(1, CollisionShape::triangle_mesh(mesh), Point3::origin(), false),
            body(2, CollisionShape::sphere(0.5), Point3::new(0.1, 0.2, 0.45), true),
        ]);
        let mut pairs = broad_phase.find_pairs();

        group.throughput(Throughput::Elements(triangles as u64));
        group.bench_with_input(
            BenchmarkId::new("triangles", triangles),
            &triangles,
            |b, _| {
                b.iter(|| black_box(narrow_phase.process(1.0 / 60.0, &mut pairs).unwrap()));
            },
        );
    }

    group.finish();
}

/// A row of boxes resting on a height field.
fn bench_stack_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_step");
    group.sample_size(50);

    for count in [8u64, 32] {
        let terrain = HeightField::from_fn(33, 33, 0.5, |x, y| 0.05 * (x + y).sin()).unwrap();
        let mut bodies = vec![body(
            1000,
            CollisionShape::height_field(terrain),
            Point3::new(-8.0, -8.0, 0.0),
            false,
        )];
        for i in 0..count {
            let x = (i % 8) as f64 * 1.2 - 4.0;
            let y = (i / 8) as f64 * 1.2 - 4.0;
            bodies.push(body(
                i,
                CollisionShape::cuboid(Vector3::repeat(0.5)),
                Point3::new(x, y, 0.5),
                true,
            ));
        }
        let (broad_phase, narrow_phase) = scene(bodies);
        let mut pairs = broad_phase.find_pairs();

        group.bench_with_input(BenchmarkId::new("boxes", count), &count, |b, _| {
            b.iter(|| black_box(narrow_phase.process(1.0 / 60.0, &mut pairs).unwrap()));
        });
    }

    group.finish();
}

/// Ray casts against a field of spheres.
fn bench_ray_test(c: &mut Criterion) {
    let bodies: Vec<Body> = (0..64)
        .map(|i| {
            let position = Point3::new((i % 8) as f64 * 2.0, 0.0, (i / 8) as f64 * 2.0);
            body(i, CollisionShape::sphere(0.5), position, false)
        })
        .collect();
    let (broad_phase, narrow_phase) = scene(bodies);
    let candidates = broad_phase.body_list().bodies();
    let ray = Ray::new(Point3::new(-5.0, 0.0, 6.0), Point3::new(20.0, 0.0, 6.0));

    c.bench_function("ray_test_64_spheres", |b| {
        b.iter(|| black_box(narrow_phase.ray_test(&ray, &candidates).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_gjk_epa,
    bench_sphere_on_mesh,
    bench_stack_step,
    bench_ray_test,
);
criterion_main!(benches);
