//! Search preparation for ray-tracing-accelerated proximity queries.
//!
//! This crate reformulates radius and k-nearest-neighbor search over
//! unstructured 3D point sets as geometric intersection testing: points
//! are binned into a uniform grid, reordered along a space-filling curve
//! for locality, classified by how large a search radius each region
//! plausibly needs, and queries are split into radius-homogeneous batches
//! so a hardware-accelerated nearest-primitive traversal never
//! over-searches. The traversal itself is an external collaborator behind
//! the [`TraversalKernel`] trait.
//!
//! # Example
//!
//! ```
//! use raybin::{prepare, Point3, PrepConfig};
//!
//! // A small lattice of points; queries share the same storage.
//! let points: Vec<Point3> = (0..64)
//!     .map(|i| Point3::new((i % 4) as f32, ((i / 4) % 4) as f32, (i / 16) as f32))
//!     .collect();
//!
//! let config = PrepConfig {
//!     radius: 1.0,
//!     cell_ratio: 2.0,
//!     k: 4,
//!     ..PrepConfig::default()
//! };
//! let session = prepare(&points, &config).expect("preparation should succeed");
//!
//! assert_eq!(session.points().len(), 64);
//! assert!(!session.batches().is_empty());
//! let total: usize = session.batches().iter().map(|b| b.len()).sum();
//! assert_eq!(total, 64);
//! ```

mod backend;
mod error;
mod types;
pub mod validation;

// Internal modules
pub(crate) mod grid;
pub(crate) mod pipeline;

pub use backend::{ComputeBackend, CpuBackend};
pub use error::PrepError;
pub use grid::{CurveOrder, GridInfo, SceneBounds};
pub use pipeline::{
    BatchTraversal, CellClassification, CellOrdering, HitOrdering, PrepConfig, QueryBatch,
    QuerySet, SearchMode, SortSession, TraversalKernel, TraversalOutcome, UNCLASSIFIED,
};
pub use types::{Point3, Point3Like};

/// Informational counters from one preparation run.
///
/// Mirrors the progress text a run prints under the `timing` feature;
/// values are diagnostics only, not a stable machine interface.
#[derive(Debug, Clone, Default)]
pub struct PrepDiagnostics {
    /// Number of points sorted.
    pub num_points: usize,
    /// Number of queries batched.
    pub num_queries: usize,
    /// Grid dimension before meta-grid padding.
    pub raw_grid_dims: [u32; 3],
    /// Grid dimension after padding to whole meta-grids.
    pub grid_dims: [u32; 3],
    /// Meta-grids per axis.
    pub meta_grid_dims: [u32; 3],
    /// Side length of one meta-grid, in cells.
    pub meta_grid_dim: u32,
    /// Total cell count, including padding.
    pub num_cells: u32,
    /// Occupied cells sampled by the classifier.
    pub num_representatives: u32,
    /// Batches formed for this run.
    pub num_batches: usize,
}

/// Prepare a point set whose queries alias the same storage.
///
/// Runs every pre-traversal stage and returns the session holding the
/// sorted points, batches, and diagnostics. Errors are reserved for
/// invalid inputs and configuration.
pub fn prepare<P: Point3Like>(points: &[P], config: &PrepConfig) -> Result<SortSession, PrepError> {
    let points: Vec<Point3> = points.iter().map(|p| Point3::from_like(p)).collect();
    let mut session = SortSession::new(points, QuerySet::SamePoints, config.clone())?;
    session.prepare()?;
    Ok(session)
}

/// Prepare a point set against a distinct query set.
pub fn prepare_with_queries<P: Point3Like>(
    points: &[P],
    queries: &[P],
    config: &PrepConfig,
) -> Result<SortSession, PrepError> {
    let points: Vec<Point3> = points.iter().map(|p| Point3::from_like(p)).collect();
    let queries: Vec<Point3> = queries.iter().map(|p| Point3::from_like(p)).collect();
    let mut session = SortSession::new(points, QuerySet::Distinct(queries), config.clone())?;
    session.prepare()?;
    Ok(session)
}
