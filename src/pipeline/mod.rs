//! Pipeline orchestration: one [`SortSession`] per run.
//!
//! A session owns the particle arrays for its whole lifetime and carries
//! them through the fixed stage order: bounds, grid plan, binning,
//! counting sort, optional mask classification, batching, and the
//! post-traversal reorder. There is no persistent state between runs;
//! every session is a fresh pipeline over its arrays.

pub(crate) mod batch;
pub(crate) mod mask;
pub(crate) mod reorder;
pub(crate) mod timing;

pub use batch::QueryBatch;
pub use mask::{CellClassification, UNCLASSIFIED};
pub use reorder::HitOrdering;

use crate::backend::{ComputeBackend, CpuBackend};
use crate::error::PrepError;
use crate::grid::binning;
use crate::grid::{CurveOrder, GridInfo, SceneBounds};
use crate::types::Point3;
use crate::PrepDiagnostics;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Conditionally parallel iterator over a slice.
macro_rules! maybe_par_iter {
    ($slice:expr) => {{
        #[cfg(feature = "parallel")]
        {
            $slice.par_iter()
        }
        #[cfg(not(feature = "parallel"))]
        {
            $slice.iter()
        }
    }};
}

/// How particles and queries are ordered before traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellOrdering {
    /// Z-curve within each meta-grid, meta-grids in raster order.
    Morton,
    /// Row-major order over the full grid.
    Raster,
    /// Sort by the x coordinate only; no grid is built.
    OneDimensional,
    /// Leave the input order untouched.
    None,
}

impl CellOrdering {
    /// The in-grid curve for this ordering, if it builds a grid at all.
    pub(crate) fn curve(self) -> Option<CurveOrder> {
        match self {
            CellOrdering::Morton => Some(CurveOrder::Morton),
            CellOrdering::Raster => Some(CurveOrder::Raster),
            CellOrdering::OneDimensional | CellOrdering::None => None,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            CellOrdering::Morton => "morton",
            CellOrdering::Raster => "raster",
            CellOrdering::OneDimensional => "one-dimensional",
            CellOrdering::None => "none",
        }
    }
}

/// What kind of answer the traversal is expected to produce.
///
/// Batches vary the effective radius, never the semantics; the mode only
/// changes how a batch's launch radius is derived from its mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// All candidates within the configured radius.
    Radius,
    /// The k nearest neighbors, bounded by the configured radius.
    Knn,
}

/// Where the query set lives relative to the point set.
///
/// Points and queries may share one backing array; the variant records
/// ownership explicitly so mutation paths never have to guess.
#[derive(Debug, Clone)]
pub enum QuerySet {
    /// Queries alias the point array; sorting points sorts the queries.
    SamePoints,
    /// Queries are a separate array, owned by the session.
    Distinct(Vec<Point3>),
}

/// Configuration for one preparation run.
#[derive(Debug, Clone)]
pub struct PrepConfig {
    /// Full search radius; the last batch always launches at exactly this
    /// distance.
    pub radius: f32,
    /// Radius search or k-NN search.
    pub mode: SearchMode,
    /// Candidate threshold used by the cell classifier (k in k-NN mode,
    /// minimum guaranteed candidate count in radius mode).
    pub k: u32,
    /// Cell size = radius / cell_ratio.
    pub cell_ratio: f32,
    /// Cell ordering scheme.
    pub ordering: CellOrdering,
    /// Classify cells and split queries into radius-homogeneous batches.
    /// Requires a grid ordering.
    pub partition: bool,
    /// Post-traversal rank ordering; `None` skips the reorder stage.
    pub hit_ordering: Option<HitOrdering>,
    /// Gather each batch's queries into rank order after traversal.
    /// Costs an acceleration-structure rebuild; off by default.
    pub gather_queries: bool,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            radius: 1.0,
            mode: SearchMode::Radius,
            k: 32,
            cell_ratio: 8.0,
            ordering: CellOrdering::Morton,
            partition: true,
            hit_ordering: Some(HitOrdering::HitId),
            gather_queries: false,
        }
    }
}

/// The external nearest-primitive traversal, treated as a black box.
///
/// Given one batch of ray origins and a shared maximum distance, returns
/// the first-hit primitive id per query, or `None` for a miss. Primitive
/// ids index the sorted point array the acceleration structure was built
/// from. An empty batch is valid input and yields no work.
pub trait TraversalKernel: Sync {
    fn first_hits(&self, queries: &[Point3], max_distance: f32) -> Vec<Option<u32>>;
}

/// Traversal results for one batch.
#[derive(Debug, Clone)]
pub struct BatchTraversal {
    /// First-hit primitive id per active query, misses as `None`.
    pub first_hits: Vec<Option<u32>>,
    /// Rank-to-query map: `rank_to_query[r]` is the query holding rank `r`
    /// in hit-locality order.
    pub rank_to_query: Vec<u32>,
}

/// Results of running the traversal over every batch.
#[derive(Debug, Clone)]
pub struct TraversalOutcome {
    /// One entry per batch, in batch order.
    pub batches: Vec<BatchTraversal>,
    /// True when a gather replaced a query buffer; the caller must rebuild
    /// the external acceleration structure before searching again.
    pub needs_rebuild: bool,
}

/// One preparation run over a point set and a query set.
///
/// The session is the only holder of run state: grid parameters, counts,
/// offsets, permutations, masks, and batches all live here and die with
/// it.
pub struct SortSession<B: ComputeBackend = CpuBackend> {
    backend: B,
    config: PrepConfig,
    points: Vec<Point3>,
    /// `None` when queries alias the point array.
    queries: Option<Vec<Point3>>,
    pub(crate) grid: Option<GridInfo>,
    /// Grid the queries were sorted on, when distinct from the point grid.
    pub(crate) query_grid: Option<GridInfo>,
    pub(crate) cell_counts: Vec<u32>,
    pub(crate) cell_offsets: Vec<u32>,
    /// Scatter permutation applied to the points (original index to sorted
    /// position).
    pub(crate) point_perm: Vec<u32>,
    /// Scatter permutation applied to a distinct query set; empty when
    /// queries alias the points.
    pub(crate) query_perm: Vec<u32>,
    classification: Option<CellClassification>,
    batches: Vec<QueryBatch>,
    diagnostics: PrepDiagnostics,
    prepared: bool,
}

impl SortSession<CpuBackend> {
    /// Create a session on the CPU reference backend.
    pub fn new(
        points: Vec<Point3>,
        queries: QuerySet,
        config: PrepConfig,
    ) -> Result<Self, PrepError> {
        Self::with_backend(points, queries, config, CpuBackend)
    }
}

impl<B: ComputeBackend> SortSession<B> {
    /// Create a session on an explicit backend.
    ///
    /// All configuration errors are rejected here, before any pipeline
    /// stage runs.
    pub fn with_backend(
        points: Vec<Point3>,
        queries: QuerySet,
        config: PrepConfig,
        backend: B,
    ) -> Result<Self, PrepError> {
        validate_config(&config)?;
        if points.is_empty() {
            return Err(PrepError::EmptyPointSet);
        }
        let queries = match queries {
            QuerySet::SamePoints => None,
            QuerySet::Distinct(q) => {
                if q.is_empty() {
                    return Err(PrepError::EmptyQuerySet);
                }
                Some(q)
            }
        };
        if config.partition && config.ordering.curve().is_none() {
            return Err(PrepError::UnsupportedOrdering {
                ordering: config.ordering.name(),
            });
        }

        Ok(Self {
            backend,
            config,
            points,
            queries,
            grid: None,
            query_grid: None,
            cell_counts: Vec::new(),
            cell_offsets: Vec::new(),
            point_perm: Vec::new(),
            query_perm: Vec::new(),
            classification: None,
            batches: Vec::new(),
            diagnostics: PrepDiagnostics::default(),
            prepared: false,
        })
    }

    /// Run every pre-traversal stage: sort, classify, batch.
    ///
    /// Calling this twice is a no-op; the session represents exactly one
    /// run.
    pub fn prepare(&mut self) -> Result<(), PrepError> {
        if self.prepared {
            return Ok(());
        }
        match self.config.ordering {
            CellOrdering::Morton => self.prepare_grid(CurveOrder::Morton)?,
            CellOrdering::Raster => self.prepare_grid(CurveOrder::Raster)?,
            CellOrdering::OneDimensional => self.prepare_one_dimensional(),
            CellOrdering::None => {
                let queries = self.queries.clone().unwrap_or_else(|| self.points.clone());
                self.batches = vec![full_batch(queries, self.config.radius)];
            }
        }
        self.fill_diagnostics();
        self.prepared = true;
        Ok(())
    }

    fn prepare_grid(&mut self, curve: CurveOrder) -> Result<(), PrepError> {
        #[cfg(feature = "timing")]
        let mut timings = timing::PrepTimings::default();
        #[cfg(not(feature = "timing"))]
        let timings = timing::PrepTimings::default();

        #[cfg(feature = "timing")]
        let t = timing::Timer::start();
        let bounds = SceneBounds::estimate(&self.backend, &self.points)?;
        #[cfg(feature = "timing")]
        {
            timings.bounds = t.elapsed();
        }

        #[cfg(feature = "timing")]
        let t = timing::Timer::start();
        let cell_size = self.config.radius / self.config.cell_ratio;
        let grid = GridInfo::plan(bounds, cell_size)?;
        #[cfg(feature = "timing")]
        {
            timings.grid_plan = t.elapsed();
        }

        #[cfg(feature = "timing")]
        let t = timing::Timer::start();
        let pbin = binning::bin_particles(&self.points, &grid, curve);
        #[cfg(feature = "timing")]
        {
            timings.binning = t.elapsed();
        }

        #[cfg(feature = "timing")]
        let t = timing::Timer::start();
        let (offsets, pos) = binning::sort_positions(&self.backend, &pbin);
        #[cfg(feature = "timing")]
        {
            timings.counting_sort = t.elapsed();
        }

        // Classification reads representative positions, so it has to run
        // before the permutation rearranges the array under it.
        #[cfg(feature = "timing")]
        let t = timing::Timer::start();
        let classification = if self.config.partition {
            Some(mask::classify_cells(
                &self.backend,
                &self.points,
                &grid,
                &pbin,
                curve,
                self.config.k,
                self.config.radius,
            ))
        } else {
            None
        };
        #[cfg(feature = "timing")]
        {
            timings.classify = t.elapsed();
        }

        #[cfg(feature = "timing")]
        let t = timing::Timer::start();
        match self.queries.take() {
            None => {
                // Shared storage: the point permutation IS the query
                // permutation, and the masks ride along with it.
                let sorted_masks = classification.as_ref().map(|class| {
                    let mut masks = batch::gather_ray_masks(&pbin.cell_indices, class);
                    binning::apply_permutation_in_place(&mut masks, &pos);
                    masks
                });
                binning::apply_permutation_in_place(&mut self.points, &pos);
                #[cfg(feature = "timing")]
                {
                    timings.permute = t.elapsed();
                }

                #[cfg(feature = "timing")]
                let t = timing::Timer::start();
                self.batches = match (&classification, &sorted_masks) {
                    (Some(class), Some(masks)) => {
                        let hist = batch::mask_histogram(masks, class.sentinel());
                        batch::form_batches(
                            &self.backend,
                            &self.points,
                            masks,
                            &hist,
                            grid.cell_size,
                            self.config.mode,
                            self.config.radius,
                        )
                    }
                    _ => vec![full_batch(self.points.clone(), self.config.radius)],
                };
                #[cfg(feature = "timing")]
                {
                    timings.batching = t.elapsed();
                }
            }
            Some(mut queries) => {
                binning::apply_permutation_in_place(&mut self.points, &pos);

                if let Some(class) = &classification {
                    // Distinct queries bin onto the point grid: masks must
                    // come from the grid that holds the candidates. Strays
                    // outside the scene clamp to boundary cells.
                    let qbin = binning::bin_particles(&queries, &grid, curve);
                    let (_qoffsets, qpos) = binning::sort_positions(&self.backend, &qbin);
                    let mut masks = batch::gather_ray_masks(&qbin.cell_indices, class);
                    binning::apply_permutation_in_place(&mut masks, &qpos);
                    binning::apply_permutation_in_place(&mut queries, &qpos);
                    self.query_perm = qpos;
                    self.query_grid = Some(grid);
                    #[cfg(feature = "timing")]
                    {
                        timings.permute = t.elapsed();
                    }

                    #[cfg(feature = "timing")]
                    let t = timing::Timer::start();
                    let hist = batch::mask_histogram(&masks, class.sentinel());
                    self.batches = batch::form_batches(
                        &self.backend,
                        &queries,
                        &masks,
                        &hist,
                        grid.cell_size,
                        self.config.mode,
                        self.config.radius,
                    );
                    #[cfg(feature = "timing")]
                    {
                        timings.batching = t.elapsed();
                    }
                } else {
                    // Locality-only sort on the query set's own grid.
                    let qbounds = SceneBounds::estimate(&self.backend, &queries)?;
                    let qgrid = GridInfo::plan(qbounds, cell_size)?;
                    let qbin = binning::bin_particles(&queries, &qgrid, curve);
                    let (_qoffsets, qpos) = binning::sort_positions(&self.backend, &qbin);
                    binning::apply_permutation_in_place(&mut queries, &qpos);
                    self.query_perm = qpos;
                    self.query_grid = Some(qgrid);
                    self.batches = vec![full_batch(queries.clone(), self.config.radius)];
                    #[cfg(feature = "timing")]
                    {
                        timings.permute = t.elapsed();
                    }
                }
                self.queries = Some(queries);
            }
        }

        self.cell_counts = pbin.cell_counts;
        self.cell_offsets = offsets;
        self.point_perm = pos;
        self.grid = Some(grid);
        self.classification = classification;

        #[cfg(feature = "timing")]
        eprintln!(
            "[prep] grid {}x{}x{} (raw {}x{}x{}), meta dim {}, {} cells, {} representatives, {} batches",
            grid.dims.x,
            grid.dims.y,
            grid.dims.z,
            grid.raw_dims.x,
            grid.raw_dims.y,
            grid.raw_dims.z,
            grid.meta_grid_dim,
            grid.num_cells,
            self.classification
                .as_ref()
                .map_or(0, |c| c.num_representatives),
            self.batches.len(),
        );
        timings.report(self.points.len(), self.queries().len());
        Ok(())
    }

    fn prepare_one_dimensional(&mut self) {
        self.point_perm = one_d_sort(&self.backend, &mut self.points);
        match self.queries.take() {
            None => {
                self.batches = vec![full_batch(self.points.clone(), self.config.radius)];
            }
            Some(mut queries) => {
                self.query_perm = one_d_sort(&self.backend, &mut queries);
                self.batches = vec![full_batch(queries.clone(), self.config.radius)];
                self.queries = Some(queries);
            }
        }
    }

    /// Invoke the traversal once per batch and rank each batch's queries
    /// by first-hit locality.
    ///
    /// Batches are independent (no shared mutable buffers), so their
    /// traversal-and-reorder stages run concurrently. The query buffers
    /// are only replaced when `gather_queries` is set, and the outcome
    /// then reports that the acceleration structure must be rebuilt.
    pub fn run<T: TraversalKernel>(&mut self, kernel: &T) -> TraversalOutcome {
        debug_assert!(self.prepared, "run() before prepare()");
        let hit_ordering = self.config.hit_ordering;

        let results: Vec<(Vec<Option<u32>>, Vec<u32>)> = maybe_par_iter!(self.batches)
            .map(|b: &QueryBatch| {
                let hits = kernel.first_hits(&b.queries, b.launch_radius);
                debug_assert_eq!(hits.len(), b.len());
                let ranks = match hit_ordering {
                    Some(ordering) => {
                        reorder::rank_by_hits(&self.backend, &hits, &self.points, ordering)
                    }
                    None => self.backend.sequence(b.len()),
                };
                (hits, ranks)
            })
            .collect();

        let mut needs_rebuild = false;
        let mut out = Vec::with_capacity(results.len());
        for (b, (first_hits, rank_to_query)) in self.batches.iter_mut().zip(results) {
            if self.config.gather_queries && hit_ordering.is_some() && !b.is_empty() {
                b.queries = reorder::gather_by_rank(&self.backend, &b.queries, &rank_to_query);
                needs_rebuild = true;
            }
            out.push(BatchTraversal {
                first_hits,
                rank_to_query,
            });
        }

        TraversalOutcome {
            batches: out,
            needs_rebuild,
        }
    }

    fn fill_diagnostics(&mut self) {
        let d = &mut self.diagnostics;
        d.num_points = self.points.len();
        d.num_queries = self
            .queries
            .as_ref()
            .map_or(self.points.len(), |q| q.len());
        if let Some(grid) = &self.grid {
            d.raw_grid_dims = grid.raw_dims.to_array();
            d.grid_dims = grid.dims.to_array();
            d.meta_grid_dims = grid.meta_dims.to_array();
            d.meta_grid_dim = grid.meta_grid_dim;
            d.num_cells = grid.num_cells;
        }
        d.num_representatives = self
            .classification
            .as_ref()
            .map_or(0, |c| c.num_representatives);
        d.num_batches = self.batches.len();
    }

    /// The point array, sorted once [`prepare`](Self::prepare) has run.
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// The query array; resolves to the points when storage is shared.
    pub fn queries(&self) -> &[Point3] {
        self.queries.as_deref().unwrap_or(&self.points)
    }

    /// True when queries alias the point array.
    pub fn queries_alias_points(&self) -> bool {
        self.queries.is_none()
    }

    /// The batches formed for this run, ascending by mask.
    pub fn batches(&self) -> &[QueryBatch] {
        &self.batches
    }

    /// Grid parameters of the point grid, when one was built.
    pub fn grid(&self) -> Option<&GridInfo> {
        self.grid.as_ref()
    }

    /// Cell classification, when adaptive batching ran.
    pub fn classification(&self) -> Option<&CellClassification> {
        self.classification.as_ref()
    }

    /// Per-cell occupancy of the point grid; empty when no grid was built.
    pub fn cell_counts(&self) -> &[u32] {
        &self.cell_counts
    }

    /// Exclusive prefix sums over the occupancy counts.
    pub fn cell_offsets(&self) -> &[u32] {
        &self.cell_offsets
    }

    /// Scatter permutation applied to the points: original index to sorted
    /// position. Empty when the points were never reordered.
    pub fn point_permutation(&self) -> &[u32] {
        &self.point_perm
    }

    /// Scatter permutation applied to a distinct query set; empty when the
    /// queries alias the points (the point permutation covers them).
    pub fn query_permutation(&self) -> &[u32] {
        &self.query_perm
    }

    /// Informational counters for this run.
    pub fn diagnostics(&self) -> &PrepDiagnostics {
        &self.diagnostics
    }

    /// The configuration this session was created with.
    pub fn config(&self) -> &PrepConfig {
        &self.config
    }
}

/// A single batch covering every query at the full radius.
fn full_batch(queries: Vec<Point3>, radius: f32) -> QueryBatch {
    QueryBatch {
        mask_upper: 0,
        launch_radius: radius,
        queries,
    }
}

/// Coordinate key sort along x; returns the scatter permutation applied.
fn one_d_sort<B: ComputeBackend>(backend: &B, points: &mut [Point3]) -> Vec<u32> {
    let mut order = backend.sequence(points.len());
    order.sort_by(|&a, &b| points[a as usize].x.total_cmp(&points[b as usize].x));
    let sorted = backend.gather(&order, points);
    points.copy_from_slice(&sorted);
    binning::invert_permutation(&order)
}

fn validate_config(config: &PrepConfig) -> Result<(), PrepError> {
    if !(config.radius > 0.0 && config.radius.is_finite()) {
        return Err(PrepError::InvalidConfig(format!(
            "search radius must be positive and finite, got {}",
            config.radius
        )));
    }
    if !(config.cell_ratio > 0.0 && config.cell_ratio.is_finite()) {
        return Err(PrepError::InvalidConfig(format!(
            "cell ratio must be positive and finite, got {}",
            config.cell_ratio
        )));
    }
    if config.k == 0 {
        return Err(PrepError::InvalidConfig(
            "candidate threshold k must be at least 1".to_string(),
        ));
    }
    Ok(())
}
