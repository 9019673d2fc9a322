//! Configuration types for collision detection and contact solving.
//!
//! All tunables of the narrow phase, the continuous collision pass and the
//! constraint solver live here. Every struct has sensible defaults, a few
//! presets and a `validate()` method that rejects values the algorithms
//! cannot work with.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Top-level configuration shared by the narrow phase and the solver.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollisionConfig {
    /// Narrow phase, GJK, EPA and CCD settings.
    pub narrow_phase: NarrowPhaseConfig,
    /// Contact constraint solver settings.
    pub solver: SolverConfig,
    /// Shape-related settings.
    pub shape: ShapeConfig,
}

impl CollisionConfig {
    /// Configuration tuned for real-time games (fewer iterations).
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            narrow_phase: NarrowPhaseConfig::realtime(),
            solver: SolverConfig::realtime(),
            shape: ShapeConfig::default(),
        }
    }

    /// Configuration tuned for accuracy over speed.
    #[must_use]
    pub fn high_fidelity() -> Self {
        Self {
            narrow_phase: NarrowPhaseConfig::high_fidelity(),
            solver: SolverConfig::high_fidelity(),
            shape: ShapeConfig::default(),
        }
    }

    /// Set the narrow phase configuration.
    #[must_use]
    pub fn narrow_phase(mut self, narrow_phase: NarrowPhaseConfig) -> Self {
        self.narrow_phase = narrow_phase;
        self
    }

    /// Set the solver configuration.
    #[must_use]
    pub fn solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Set the shape configuration.
    #[must_use]
    pub fn shape(mut self, shape: ShapeConfig) -> Self {
        self.shape = shape;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        self.narrow_phase.validate()?;
        self.solver.validate()?;
        self.shape.validate()?;
        Ok(())
    }
}

/// What a fixed-size pool does when every slot is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OverflowPolicy {
    /// Box the value on the heap and log (rate-limited).
    #[default]
    HeapFallback,
    /// Return [`CollisionError::PoolExhausted`](crate::CollisionError::PoolExhausted).
    Fail,
}

/// Configuration for the narrow phase and its algorithms.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NarrowPhaseConfig {
    /// Number of slots in the algorithm result pool.
    pub algorithm_pool_size: usize,
    /// Behavior of the result pool once all slots are taken.
    pub pool_overflow: OverflowPolicy,
    /// Distance beyond which persistent contact points are dropped.
    pub contact_breaking_threshold: f64,
    /// Maximum GJK iterations before reporting an invalid result.
    pub gjk_max_iteration: usize,
    /// GJK termination tolerance relative to the squared distance.
    pub gjk_relative_termination_tolerance: f64,
    /// Absolute GJK termination tolerance.
    pub gjk_minimum_termination_tolerance: f64,
    /// Growth of the absolute tolerance per GJK iteration.
    pub gjk_percentage_increase_of_minimum_tolerance: f64,
    /// Maximum EPA polytope expansions.
    pub epa_max_iteration: usize,
    /// Relative EPA termination tolerance.
    pub epa_termination_tolerance: f64,
    /// Maximum conservative advancement iterations.
    pub ccd_max_iteration: usize,
    /// Squared distance under which a swept pair counts as touching.
    pub ccd_termination_tolerance: f64,
}

impl Default for NarrowPhaseConfig {
    fn default() -> Self {
        Self {
            algorithm_pool_size: 4096,
            pool_overflow: OverflowPolicy::HeapFallback,
            contact_breaking_threshold: 0.02,
            gjk_max_iteration: 20,
            gjk_relative_termination_tolerance: 1e-4,
            gjk_minimum_termination_tolerance: 1e-6,
            gjk_percentage_increase_of_minimum_tolerance: 0.05,
            epa_max_iteration: 30,
            epa_termination_tolerance: 0.01,
            ccd_max_iteration: 20,
            ccd_termination_tolerance: 1e-6,
        }
    }
}

impl NarrowPhaseConfig {
    /// Cheaper settings for real-time use.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            gjk_max_iteration: 16,
            epa_max_iteration: 20,
            epa_termination_tolerance: 0.02,
            ccd_max_iteration: 16,
            ..Default::default()
        }
    }

    /// Tighter tolerances and more iterations.
    #[must_use]
    pub fn high_fidelity() -> Self {
        Self {
            gjk_max_iteration: 64,
            gjk_relative_termination_tolerance: 1e-6,
            gjk_minimum_termination_tolerance: 1e-9,
            epa_max_iteration: 64,
            epa_termination_tolerance: 1e-4,
            ccd_max_iteration: 64,
            ccd_termination_tolerance: 1e-8,
            ..Default::default()
        }
    }

    /// Set the result pool size.
    #[must_use]
    pub fn algorithm_pool_size(mut self, size: usize) -> Self {
        self.algorithm_pool_size = size;
        self
    }

    /// Set the pool overflow policy.
    #[must_use]
    pub fn pool_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.pool_overflow = policy;
        self
    }

    /// Set the contact breaking threshold.
    #[must_use]
    pub fn contact_breaking_threshold(mut self, threshold: f64) -> Self {
        self.contact_breaking_threshold = threshold;
        self
    }

    /// Set the GJK iteration cap.
    #[must_use]
    pub fn gjk_max_iteration(mut self, iterations: usize) -> Self {
        self.gjk_max_iteration = iterations;
        self
    }

    /// Set the EPA iteration cap.
    #[must_use]
    pub fn epa_max_iteration(mut self, iterations: usize) -> Self {
        self.epa_max_iteration = iterations;
        self
    }

    /// Set the CCD iteration cap.
    #[must_use]
    pub fn ccd_max_iteration(mut self, iterations: usize) -> Self {
        self.ccd_max_iteration = iterations;
        self
    }

    /// Validate the narrow phase configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.algorithm_pool_size == 0 {
            return Err(crate::CollisionError::invalid_config(
                "algorithm_pool_size must be at least 1",
            ));
        }

        if !self.contact_breaking_threshold.is_finite() || self.contact_breaking_threshold < 0.0 {
            return Err(crate::CollisionError::invalid_config(
                "contact_breaking_threshold must be finite and non-negative",
            ));
        }

        if self.gjk_max_iteration == 0 || self.epa_max_iteration == 0 || self.ccd_max_iteration == 0
        {
            return Err(crate::CollisionError::invalid_config(
                "GJK, EPA and CCD iteration caps must be at least 1",
            ));
        }

        let tolerances = [
            self.gjk_relative_termination_tolerance,
            self.gjk_minimum_termination_tolerance,
            self.gjk_percentage_increase_of_minimum_tolerance,
            self.epa_termination_tolerance,
            self.ccd_termination_tolerance,
        ];
        if tolerances.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(crate::CollisionError::invalid_config(
                "termination tolerances must be finite and non-negative",
            ));
        }

        if self.ccd_termination_tolerance == 0.0 {
            return Err(crate::CollisionError::invalid_config(
                "ccd_termination_tolerance must be positive",
            ));
        }

        Ok(())
    }
}

/// Configuration for the sequential impulse contact solver.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Number of solver iterations per step.
    pub iterations: usize,
    /// Baumgarte factor turning penetration depth into a velocity bias.
    /// Typical value: 0.1-0.3
    pub bias_factor: f64,
    /// Whether to reapply last step's accumulated impulses before iterating.
    pub use_warm_starting: bool,
    /// Approach speed above which restitution is applied.
    pub restitution_velocity_threshold: f64,
    /// Number of slots in the per-step solving data pool.
    pub constraint_solving_pool_size: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            bias_factor: 0.3,
            use_warm_starting: true,
            restitution_velocity_threshold: 1.0,
            constraint_solving_pool_size: 1024,
        }
    }
}

impl SolverConfig {
    /// Fewer iterations for real-time use.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            iterations: 6,
            ..Default::default()
        }
    }

    /// More iterations and softer position correction.
    #[must_use]
    pub fn high_fidelity() -> Self {
        Self {
            iterations: 30,
            bias_factor: 0.2,
            ..Default::default()
        }
    }

    /// Set the number of solver iterations.
    #[must_use]
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the Baumgarte bias factor.
    #[must_use]
    pub fn bias_factor(mut self, bias_factor: f64) -> Self {
        self.bias_factor = bias_factor;
        self
    }

    /// Enable or disable warm starting.
    #[must_use]
    pub fn warm_starting(mut self, enabled: bool) -> Self {
        self.use_warm_starting = enabled;
        self
    }

    /// Set the restitution velocity threshold.
    #[must_use]
    pub fn restitution_velocity_threshold(mut self, threshold: f64) -> Self {
        self.restitution_velocity_threshold = threshold;
        self
    }

    /// Validate the solver configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.iterations == 0 {
            return Err(crate::CollisionError::invalid_config(
                "iterations must be at least 1",
            ));
        }

        if !self.bias_factor.is_finite() || self.bias_factor < 0.0 || self.bias_factor > 1.0 {
            return Err(crate::CollisionError::invalid_config(
                "bias_factor must be between 0 and 1",
            ));
        }

        if !self.restitution_velocity_threshold.is_finite()
            || self.restitution_velocity_threshold < 0.0
        {
            return Err(crate::CollisionError::invalid_config(
                "restitution_velocity_threshold cannot be negative",
            ));
        }

        if self.constraint_solving_pool_size == 0 {
            return Err(crate::CollisionError::invalid_config(
                "constraint_solving_pool_size must be at least 1",
            ));
        }

        Ok(())
    }
}

/// Shape-related configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShapeConfig {
    /// Fraction of a shape's inner size a body may travel per step before CCD kicks in.
    pub ccd_motion_threshold_factor: f64,
    /// Initial capacity of triangle query buffers for concave shapes.
    pub triangle_shape_pool_size: usize,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            ccd_motion_threshold_factor: 0.4,
            triangle_shape_pool_size: 256,
        }
    }
}

impl ShapeConfig {
    /// Set the CCD motion threshold factor.
    #[must_use]
    pub fn ccd_motion_threshold_factor(mut self, factor: f64) -> Self {
        self.ccd_motion_threshold_factor = factor;
        self
    }

    /// Validate the shape configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.ccd_motion_threshold_factor.is_finite() || self.ccd_motion_threshold_factor < 0.0 {
            return Err(crate::CollisionError::invalid_config(
                "ccd_motion_threshold_factor cannot be negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config() {
        let config = CollisionConfig::default();
        assert!(config.validate().is_ok());
        assert_relative_eq!(config.solver.bias_factor, 0.3, epsilon = 1e-10);
        assert!(config.solver.use_warm_starting);
        assert_eq!(config.narrow_phase.pool_overflow, OverflowPolicy::HeapFallback);
    }

    #[test]
    fn test_config_presets() {
        let realtime = CollisionConfig::realtime();
        assert!(realtime.validate().is_ok());
        assert!(realtime.solver.iterations < SolverConfig::default().iterations);

        let hifi = CollisionConfig::high_fidelity();
        assert!(hifi.validate().is_ok());
        assert!(hifi.narrow_phase.gjk_max_iteration > NarrowPhaseConfig::default().gjk_max_iteration);
    }

    #[test]
    fn test_config_builder() {
        let config = CollisionConfig::default()
            .solver(SolverConfig::default().iterations(4).warm_starting(false))
            .narrow_phase(
                NarrowPhaseConfig::default()
                    .algorithm_pool_size(8)
                    .pool_overflow(OverflowPolicy::Fail),
            );

        assert_eq!(config.solver.iterations, 4);
        assert!(!config.solver.use_warm_starting);
        assert_eq!(config.narrow_phase.algorithm_pool_size, 8);
        assert_eq!(config.narrow_phase.pool_overflow, OverflowPolicy::Fail);
    }

    #[test]
    fn test_narrow_phase_validation() {
        let mut config = NarrowPhaseConfig::default();
        assert!(config.validate().is_ok());

        config.algorithm_pool_size = 0;
        assert!(config.validate().is_err());

        config.algorithm_pool_size = 16;
        config.contact_breaking_threshold = f64::NAN;
        assert!(config.validate().is_err());

        config.contact_breaking_threshold = 0.02;
        config.epa_termination_tolerance = -1.0;
        assert!(config.validate().is_err());

        config.epa_termination_tolerance = 0.01;
        config.ccd_termination_tolerance = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_solver_validation() {
        let mut solver = SolverConfig::default();
        assert!(solver.validate().is_ok());

        solver.iterations = 0;
        assert!(solver.validate().is_err());

        solver.iterations = 10;
        solver.bias_factor = 1.5;
        assert!(solver.validate().is_err());

        solver.bias_factor = 0.2;
        solver.restitution_velocity_threshold = -1.0;
        assert!(solver.validate().is_err());
    }

    #[test]
    fn test_shape_validation() {
        let shape = ShapeConfig::default().ccd_motion_threshold_factor(-0.1);
        assert!(shape.validate().is_err());
        assert!(ShapeConfig::default().validate().is_ok());
    }
}
