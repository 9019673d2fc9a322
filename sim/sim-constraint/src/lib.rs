//! Contact constraint solver for rigid bodies.
//!
//! This crate resolves the contacts found by `sim-collision` into velocity
//! impulses:
//!
//! - [`ConstraintSolver`]: warm-started sequential impulse solver
//!   (projected Gauss-Seidel, 10 iterations by default)
//!
//! # Constraint Formulation
//!
//! Every contact point contributes a non-penetration row along the contact
//! normal and one Coulomb friction row along the direction of tangential
//! slip:
//!
//! ```text
//! λn = (-vn + bias) / denom_n        acc_n = min(acc_n + λn, 0)
//! λt = -vt / denom_t                 |acc_t| <= -friction · acc_n
//! ```
//!
//! `bias` combines Baumgarte position correction with restitution. The
//! accumulated impulses are stored in the manifold points and reapplied
//! next step when warm starting is enabled.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sim_collision::{BodyContainer, BodyList, BroadPhase, BruteForceBroadPhase, NarrowPhase};
//! use sim_constraint::ConstraintSolver;
//! use sim_types::CollisionConfig;
//!
//! let config = CollisionConfig::default();
//! let bodies = Arc::new(BodyList::new());
//! let broad_phase = Arc::new(BruteForceBroadPhase::new(Arc::clone(&bodies)));
//! let narrow_phase = NarrowPhase::new(
//!     &config,
//!     Arc::clone(&broad_phase) as Arc<dyn BroadPhase>,
//!     bodies as Arc<dyn BodyContainer>,
//! )
//! .unwrap();
//! let solver = ConstraintSolver::new(config.solver.clone()).unwrap();
//!
//! let dt = 1.0 / 60.0;
//! let mut pairs = broad_phase.find_pairs();
//! let manifolds = narrow_phase.process(dt, &mut pairs).unwrap();
//! solver.solve(dt, &manifolds).unwrap();
//! ```

#![doc(html_root_url = "https://docs.rs/sim-constraint/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn, clippy::suboptimal_flops)]

mod solver;

pub use solver::{
    CommonSolvingData, ConstraintSolver, ConstraintSolvingData, ImpulseSolvingData, SolverResult,
};

// Re-export types needed to drive the solver
pub use sim_types::{BodyId, SolverConfig};
