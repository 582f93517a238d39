//! Error types for search preparation.

use std::fmt;

/// Errors that can occur while preparing a point set for traversal.
///
/// All variants describe precondition failures; once the pipeline has been
/// entered it runs to completion. Allocation failure on data-dependent
/// buffer sizes is not recovered here.
#[derive(Debug, Clone)]
pub enum PrepError {
    /// The point set is empty. Bounds and grid parameters are undefined
    /// for zero particles.
    EmptyPointSet,

    /// A distinct query set was supplied but contains no queries.
    EmptyQuerySet,

    /// The quantized scene bounds have no extent on at least one axis.
    /// Estimated bounds always span at least one cell; this guards grids
    /// planned over hand-constructed bounds.
    ZeroExtent { axis: usize },

    /// A configuration value is out of its valid range.
    InvalidConfig(String),

    /// Adaptive batching was requested together with an ordering mode
    /// that builds no grid (one-dimensional or none).
    UnsupportedOrdering { ordering: &'static str },
}

impl fmt::Display for PrepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepError::EmptyPointSet => {
                write!(f, "point set is empty: need at least 1 point")
            }
            PrepError::EmptyQuerySet => {
                write!(f, "query set is empty: need at least 1 query")
            }
            PrepError::ZeroExtent { axis } => {
                write!(f, "scene bounds have zero extent on axis {}", axis)
            }
            PrepError::InvalidConfig(msg) => {
                write!(f, "invalid configuration: {}", msg)
            }
            PrepError::UnsupportedOrdering { ordering } => {
                write!(
                    f,
                    "adaptive batching requires a grid ordering, got {}",
                    ordering
                )
            }
        }
    }
}

impl std::error::Error for PrepError {}
