//! Error types for collision detection and contact solving.

use thiserror::Error;

/// Errors that can occur while detecting or resolving collisions.
///
/// Only configuration problems surface as errors. Numerical degeneracies
/// (zero impulse denominators, GJK/EPA non-convergence) are logged and the
/// affected contact is skipped for the current step.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CollisionError {
    /// Invalid body ID referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(u64),

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// A shape category the requested operation cannot handle.
    #[error("unsupported shape type {shape_type} for {context}")]
    UnsupportedShape {
        /// Name of the offending shape type.
        shape_type: String,
        /// The operation that rejected it.
        context: String,
    },

    /// No collision algorithm exists for this shape pair.
    #[error("no collision algorithm for shape pair ({first}, {second})")]
    UnsupportedShapePair {
        /// Shape type of the first body.
        first: String,
        /// Shape type of the second body.
        second: String,
    },

    /// A fixed-size pool ran out of slots and its overflow policy forbids heap fallback.
    #[error("pool '{pool}' exhausted (capacity {capacity})")]
    PoolExhausted {
        /// Pool name.
        pool: String,
        /// Number of slots in the pool.
        capacity: usize,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },

    /// Damping outside of `[0, 1]`.
    #[error("invalid {kind} damping {value}: must be in [0, 1]")]
    InvalidDamping {
        /// `linear` or `angular`.
        kind: &'static str,
        /// The rejected value.
        value: f64,
    },
}

impl CollisionError {
    /// Create an unsupported shape error.
    #[must_use]
    pub fn unsupported_shape(shape_type: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UnsupportedShape {
            shape_type: shape_type.into(),
            context: context.into(),
        }
    }

    /// Create an unsupported shape pair error.
    #[must_use]
    pub fn unsupported_pair(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self::UnsupportedShapePair {
            first: first.into(),
            second: second.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }

    /// Check if this error must abort the current physics step.
    ///
    /// Shape dispatch failures indicate a setup bug; everything else is
    /// reported at construction or configuration time.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedShape { .. } | Self::UnsupportedShapePair { .. }
        )
    }
}
