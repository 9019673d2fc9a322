//! Concurrency fuzz for body locking.
//!
//! Ghost bodies are processed on rayon worker threads while the main pair
//! pass runs over the same bodies. Every pair lock is taken lower id first,
//! so this must finish without deadlock and with consistent results.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use sim_collision::{
    lock_pair, Body, BodyContainer, BodyList, BroadPhase, BruteForceBroadPhase, CollisionShape,
    GhostBody, NarrowPhase,
};
use sim_types::{BodyId, CollisionConfig, MassProperties, PhysicsTransform, ShapeConfig};

const BODY_COUNT: u64 = 12;
const ROUNDS: usize = 64;

fn row_of_spheres(list: &BodyList) {
    for id in 0..BODY_COUNT {
        list.add(Arc::new(Body::rigid(
            BodyId::new(id),
            Arc::new(CollisionShape::sphere(0.5)),
            PhysicsTransform::from_position(Point3::new(id as f64 * 0.9, 0.0, 0.0)),
            MassProperties::sphere(1.0, 0.5).unwrap(),
            &ShapeConfig::default(),
        )));
    }
}

/// Ghosts overlapping the whole row, each watching every body.
fn ghosts(list: &BodyList) -> Vec<GhostBody> {
    (0..4)
        .map(|i| {
            let ghost = GhostBody::new(Arc::new(Body::ghost(
                BodyId::new(100 + i),
                Arc::new(CollisionShape::cuboid(Vector3::new(6.0, 1.0, 1.0))),
                PhysicsTransform::from_position(Point3::new(5.0, 0.0, 0.0)),
            )));
            for body in list.bodies() {
                ghost.add_overlapping_pair(body);
            }
            ghost
        })
        .collect()
}

#[test]
fn ghost_and_pair_processing_run_concurrently() {
    let list = Arc::new(BodyList::new());
    row_of_spheres(&list);
    let ghosts = ghosts(&list);

    let broad_phase = Arc::new(BruteForceBroadPhase::new(Arc::clone(&list)));
    let narrow_phase = NarrowPhase::new(
        &CollisionConfig::default(),
        Arc::clone(&broad_phase) as Arc<dyn BroadPhase>,
        Arc::clone(&list) as Arc<dyn BodyContainer>,
    )
    .unwrap();
    let mut pairs = broad_phase.find_pairs();
    assert_eq!(pairs.len() as u64, BODY_COUNT - 1);

    for _ in 0..ROUNDS {
        let (main, ghost_results) = rayon::join(
            || narrow_phase.process(1.0 / 60.0, &mut pairs),
            || {
                ghosts
                    .par_iter()
                    .map(|ghost| {
                        let mut scratch = Vec::new();
                        narrow_phase.process_ghost_body(ghost, &mut scratch)
                    })
                    .collect::<Vec<_>>()
            },
        );

        assert_eq!(main.unwrap().len() as u64, BODY_COUNT - 1);
        for result in ghost_results {
            assert_eq!(result.unwrap().len() as u64, BODY_COUNT);
        }
    }

    for ghost in &ghosts {
        assert_eq!(ghost.pair_count() as u64, BODY_COUNT);
    }
}

#[test]
fn lock_pair_in_both_argument_orders() {
    let bodies: Vec<Arc<Body>> = (0..8)
        .map(|id| {
            Arc::new(Body::rigid(
                BodyId::new(id),
                Arc::new(CollisionShape::sphere(0.5)),
                PhysicsTransform::identity(),
                MassProperties::sphere(1.0, 0.5).unwrap(),
                &ShapeConfig::default(),
            ))
        })
        .collect();

    let combos: Vec<(usize, usize)> = (0..bodies.len())
        .flat_map(|a| (0..bodies.len()).filter(move |&b| b != a).map(move |b| (a, b)))
        .collect();

    (0..ROUNDS).into_par_iter().for_each(|round| {
        for &(a, b) in combos.iter().skip(round % combos.len()) {
            let (mut first, mut second) = lock_pair(&bodies[a], &bodies[b]);
            first.transform.position.x += 1.0;
            second.transform.position.x -= 1.0;
        }
    });

    let total: f64 = bodies.iter().map(|b| b.transform().position.x).sum();
    assert_eq!(total, 0.0);
}
