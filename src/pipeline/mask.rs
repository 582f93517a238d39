//! Adaptive per-cell search-radius classification.
//!
//! One representative particle per occupied cell probes the local density:
//! concentric cell shells around its cell are accumulated until enough
//! candidates are guaranteed, and the shell index reached becomes the
//! cell's mask. Cells whose density never meets the threshold within the
//! bounded shell count get the full-search sentinel, so a correct answer
//! is always reachable at the configured radius.

use glam::IVec3;

use crate::backend::ComputeBackend;
use crate::grid::binning::CellBinning;
use crate::grid::{CurveOrder, GridInfo};
use crate::types::Point3;

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

/// Mask value of a cell that never received a representative.
///
/// Consumers map this to the full-search sentinel when gathering per-query
/// masks; it is never used as a shell index.
pub const UNCLASSIFIED: i32 = -1;

/// Per-cell masks plus the shell geometry they were classified against.
#[derive(Debug, Clone)]
pub struct CellClassification {
    /// One mask per cell: a shell index, the sentinel, or [`UNCLASSIFIED`].
    pub cell_masks: Vec<i32>,
    /// Number of occupied cells (= representatives sampled).
    pub num_representatives: u32,
    /// Largest usable shell index; may be negative when even one shell
    /// would overrun the safe cube width.
    pub max_shell: i32,
}

impl CellClassification {
    /// Mask value meaning "no safe partial radius -- search the full
    /// configured radius".
    #[inline]
    pub fn sentinel(&self) -> i32 {
        self.max_shell + 1
    }
}

/// Widest cube whose circumscribing sphere stays within `radius`.
///
/// In radius mode, a cube of this width is guaranteed to only contain
/// in-range candidates; in k-NN mode the k nearest are guaranteed to lie
/// in the sphere that tightly encloses it, and that sphere never exceeds
/// `radius`.
#[inline]
pub(crate) fn max_safe_width(radius: f32) -> f32 {
    radius / std::f32::consts::SQRT_2 * 2.0
}

/// Cube width guaranteed to be covered after expanding `shell` rings:
/// wherever the query sits inside its cell, the cells within Chebyshev
/// distance `shell` contain the whole cube.
#[inline]
pub(crate) fn shell_width(shell: i32, cell_size: f32) -> f32 {
    2.0 * (shell + 1) as f32 * cell_size
}

/// Classify every occupied cell of the grid.
///
/// Representative selection sorts a copy of the cell ids together with an
/// identity sequence and keeps the first occurrence of each distinct id.
/// The sort is stable, so ties inside a cell always resolve to the
/// earliest particle -- classification is deterministic.
pub fn classify_cells<B: ComputeBackend>(
    backend: &B,
    points: &[Point3],
    grid: &GridInfo,
    binning: &CellBinning,
    curve: CurveOrder,
    threshold: u32,
    radius: f32,
) -> CellClassification {
    let max_width = max_safe_width(radius);
    let max_shell = (max_width / (2.0 * grid.cell_size) - 1.0).floor() as i32;

    // Scratch copies: the keys are useless after this sort.
    let mut keys = binning.cell_indices.clone();
    let mut seq = backend.sequence(points.len());
    backend.stable_sort_by_key(&mut keys, &mut seq);

    let mut representatives: Vec<u32> = Vec::new();
    let mut prev_cell = None;
    for (&cell, &pid) in keys.iter().zip(seq.iter()) {
        if prev_cell != Some(cell) {
            representatives.push(pid);
            prev_cell = Some(cell);
        }
    }

    let classified: Vec<(u32, i32)> = maybe_par_iter!(representatives)
        .map(|&pid| {
            let coord = grid.cell_coord(points[pid as usize]);
            let mask = classify_one(
                grid,
                &binning.cell_counts,
                coord.as_ivec3(),
                curve,
                threshold,
                max_shell,
            );
            (binning.cell_indices[pid as usize], mask)
        })
        .collect();

    let mut cell_masks = vec![UNCLASSIFIED; grid.num_cells as usize];
    for (cell, mask) in classified {
        cell_masks[cell as usize] = mask;
    }

    CellClassification {
        cell_masks,
        num_representatives: representatives.len() as u32,
        max_shell,
    }
}

/// Shell walk for a single representative's cell.
fn classify_one(
    grid: &GridInfo,
    cell_counts: &[u32],
    center: IVec3,
    curve: CurveOrder,
    threshold: u32,
    max_shell: i32,
) -> i32 {
    let mut accumulated = 0u32;
    let mut shell = 0i32;
    while shell <= max_shell {
        accumulated += shell_occupancy(grid, cell_counts, center, shell, curve);
        if accumulated >= threshold {
            return shell;
        }
        shell += 1;
    }
    max_shell + 1
}

/// Total occupancy of the cells at Chebyshev distance exactly `shell`.
fn shell_occupancy(
    grid: &GridInfo,
    cell_counts: &[u32],
    center: IVec3,
    shell: i32,
    curve: CurveOrder,
) -> u32 {
    let mut total = 0u32;
    for dz in -shell..=shell {
        for dy in -shell..=shell {
            for dx in -shell..=shell {
                if dx.abs().max(dy.abs()).max(dz.abs()) != shell {
                    continue;
                }
                let coord = center + IVec3::new(dx, dy, dz);
                if !grid.contains_coord(coord) {
                    continue;
                }
                let id = grid.cell_index(coord.as_uvec3(), curve);
                total += cell_counts[id as usize];
            }
        }
    }
    total
}
