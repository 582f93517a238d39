//! Invariant checks over a prepared session.
//!
//! Verifies the contractual postconditions of every pipeline stage:
//! occupancy counts, offset identities, permutation validity, cell-sorted
//! order, and batch partitioning. Useful for debugging, testing, and
//! catching regressions in substituted backends.

use rustc_hash::FxHashSet;

use crate::backend::ComputeBackend;
use crate::grid::{CurveOrder, GridInfo};
use crate::pipeline::{CellOrdering, SortSession};
use crate::types::Point3;

/// Detailed validation report for a prepared session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Number of points in the session.
    pub num_points: usize,
    /// Number of queries in the session.
    pub num_queries: usize,
    /// Number of batches formed.
    pub num_batches: usize,

    /// `sum(cell_counts) == num_points`.
    pub counts_sum_ok: bool,
    /// `offsets[i] == sum(counts[0..i))` and
    /// `offsets[i] + counts[i] == offsets[i+1]`.
    pub offsets_ok: bool,
    /// The point permutation is a bijection over `[0, num_points)`.
    pub point_permutation_ok: bool,
    /// A distinct query set's permutation is a bijection as well.
    pub query_permutation_ok: bool,
    /// Sorted points have non-decreasing cell ids (or non-decreasing x
    /// under one-dimensional ordering).
    pub points_order_ok: bool,
    /// Sorted queries have non-decreasing cell ids on their grid.
    pub queries_order_ok: bool,
    /// Batch active-query counts sum to the query count.
    pub batch_counts_ok: bool,
    /// Launch radii are non-decreasing across batches.
    pub radii_monotone_ok: bool,
    /// The final batch launches at exactly the configured radius.
    pub final_radius_ok: bool,
}

impl SessionReport {
    /// True if every invariant held.
    pub fn is_valid(&self) -> bool {
        self.counts_sum_ok
            && self.offsets_ok
            && self.point_permutation_ok
            && self.query_permutation_ok
            && self.points_order_ok
            && self.queries_order_ok
            && self.batch_counts_ok
            && self.radii_monotone_ok
            && self.final_radius_ok
    }
}

/// Check every stage postcondition of a prepared session.
pub fn check_session<B: ComputeBackend>(session: &SortSession<B>) -> SessionReport {
    let points = session.points();
    let queries = session.queries();
    let batches = session.batches();
    let config = session.config();

    let counts_sum_ok = session.cell_counts.is_empty()
        || session.cell_counts.iter().map(|&c| c as usize).sum::<usize>() == points.len();

    let mut offsets_ok = session.cell_offsets.len() == session.cell_counts.len();
    if offsets_ok {
        let mut running = 0u32;
        for (i, (&offset, &count)) in session
            .cell_offsets
            .iter()
            .zip(session.cell_counts.iter())
            .enumerate()
        {
            if offset != running {
                offsets_ok = false;
                break;
            }
            running += count;
            if i + 1 < session.cell_offsets.len() && session.cell_offsets[i + 1] != running {
                offsets_ok = false;
                break;
            }
        }
    }

    let point_permutation_ok = is_permutation(&session.point_perm, points.len());
    let query_permutation_ok = is_permutation(&session.query_perm, queries.len());

    let curve = config.ordering.curve();
    let points_order_ok = match (session.grid.as_ref(), curve) {
        (Some(grid), Some(curve)) => cell_sorted(points, grid, curve),
        _ => match config.ordering {
            CellOrdering::OneDimensional => points.windows(2).all(|w| w[0].x <= w[1].x),
            _ => true,
        },
    };
    let queries_order_ok = if session.queries_alias_points() {
        points_order_ok
    } else {
        match (session.query_grid.as_ref(), curve) {
            (Some(grid), Some(curve)) => cell_sorted(queries, grid, curve),
            _ => match config.ordering {
                CellOrdering::OneDimensional => queries.windows(2).all(|w| w[0].x <= w[1].x),
                _ => true,
            },
        }
    };

    let batch_counts_ok =
        batches.is_empty() || batches.iter().map(|b| b.len()).sum::<usize>() == queries.len();
    let radii_monotone_ok = batches
        .windows(2)
        .all(|w| w[0].launch_radius <= w[1].launch_radius);
    let final_radius_ok = batches
        .last()
        .is_none_or(|b| b.launch_radius == config.radius);

    SessionReport {
        num_points: points.len(),
        num_queries: queries.len(),
        num_batches: batches.len(),
        counts_sum_ok,
        offsets_ok,
        point_permutation_ok,
        query_permutation_ok,
        points_order_ok,
        queries_order_ok,
        batch_counts_ok,
        radii_monotone_ok,
        final_radius_ok,
    }
}

/// Empty permutations are valid (the stage never ran); otherwise every
/// index in `[0, n)` must appear exactly once.
fn is_permutation(perm: &[u32], n: usize) -> bool {
    if perm.is_empty() {
        return true;
    }
    if perm.len() != n {
        return false;
    }
    let mut seen = FxHashSet::default();
    perm.iter().all(|&p| (p as usize) < n && seen.insert(p))
}

fn cell_sorted(points: &[Point3], grid: &GridInfo, curve: CurveOrder) -> bool {
    points.windows(2).all(|w| {
        grid.cell_index(grid.cell_coord(w[0]), curve)
            <= grid.cell_index(grid.cell_coord(w[1]), curve)
    })
}
