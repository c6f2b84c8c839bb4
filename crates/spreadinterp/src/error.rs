//! Error types for grid and particle setup.
//!
//! Only construction and validation paths return these. The transfer loops
//! themselves run on indices built from validated extents and treat any
//! violation as an internal invariant.

use thiserror::Error;

/// Errors raised while building or validating the grid, the particle list
/// or the column index.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetupError {
    /// A per-particle or per-node buffer has the wrong length.
    #[error("buffer `{name}` has length {got}, expected {expected}")]
    LengthMismatch {
        /// Buffer name.
        name: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length.
        got: usize,
    },

    /// A grid spacing or support radius is zero, negative or not finite.
    #[error("`{name}` must be positive and finite, got {value}")]
    NonPositive {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A grid or particle list was configured with zero components per node.
    #[error("degrees of freedom must be at least 1")]
    ZeroDof,

    /// Particles and grid carry a different number of components.
    #[error("particles carry {particles} components per point but the grid carries {grid}")]
    DofMismatch {
        /// Components per particle.
        particles: usize,
        /// Components per grid node.
        grid: usize,
    },

    /// Axial node coordinates are empty or not strictly increasing.
    #[error("axial nodes must be non-empty and strictly increasing")]
    AxialNodes,

    /// A support radius rounds to a zero-width stencil on some axis.
    #[error("support radius {alphaf} gives a zero-width stencil along {axis} (h = {h})")]
    ZeroWidth {
        /// Support radius.
        alphaf: f64,
        /// Axis name.
        axis: char,
        /// Grid spacing on that axis.
        h: f64,
    },

    /// A support radius needs a wider ghost margin than the grid was padded for.
    #[error("support radius {alphaf} exceeds the padded margin (max_alphaf = {max_alphaf})")]
    SupportTooWide {
        /// Support radius.
        alphaf: f64,
        /// Largest radius the grid pads for.
        max_alphaf: f64,
    },

    /// A particle lies outside the bounded axial extent.
    #[error("particle {index} at z = {z} lies outside [{lo}, {hi}]")]
    OutOfDomain {
        /// Particle index.
        index: usize,
        /// Particle axial coordinate.
        z: f64,
        /// Lower axial bound.
        lo: f64,
        /// Upper axial bound.
        hi: f64,
    },

    /// The column linked lists do not describe a partition of the particles.
    #[error("column index is inconsistent: {0}")]
    ColumnIndex(String),

    /// A transfer was requested before the particles were located on the grid.
    #[error("particles have not been located on this grid")]
    NotLocated,

    /// A configuration document failed to parse.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SetupError {
    /// Shorthand for a length check.
    pub(crate) fn check_len(name: &'static str, expected: usize, got: usize) -> Result<(), Self> {
        if expected == got {
            Ok(())
        } else {
            Err(Self::LengthMismatch {
                name,
                expected,
                got,
            })
        }
    }

    /// Shorthand for a positivity check.
    pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<(), Self> {
        if value > 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(Self::NonPositive { name, value })
        }
    }
}
