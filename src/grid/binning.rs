//! Particle-to-cell binning and the counting sort built on top of it.

use crate::backend::ComputeBackend;
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

use super::{CurveOrder, GridInfo};

/// Per-particle cell assignment plus per-cell occupancy.
#[derive(Debug, Clone)]
pub struct CellBinning {
    /// Linear cell id per particle, under the active ordering.
    pub cell_indices: Vec<u32>,
    /// Zero-based rank of each particle within its cell, in input order.
    /// This is what keeps the counting sort stable without a second pass.
    pub local_ranks: Vec<u32>,
    /// Occupancy per cell; `sum == particle count`.
    pub cell_counts: Vec<u32>,
}

/// Assign every particle its cell id, occupancy count, and local rank.
pub fn bin_particles(points: &[Point3], grid: &GridInfo, curve: CurveOrder) -> CellBinning {
    let cell_indices: Vec<u32> = maybe_par_iter!(points)
        .map(|p| grid.cell_index(grid.cell_coord(*p), curve))
        .collect();

    // Single ordered pass: the rank a particle receives is the occupancy of
    // its cell among earlier particles, which fixes the tie-break order.
    let mut cell_counts = vec![0u32; grid.num_cells as usize];
    let mut local_ranks = vec![0u32; points.len()];
    for (rank, &ci) in local_ranks.iter_mut().zip(cell_indices.iter()) {
        *rank = cell_counts[ci as usize];
        cell_counts[ci as usize] += 1;
    }

    CellBinning {
        cell_indices,
        local_ranks,
        cell_counts,
    }
}

/// Counting-sort placement: per-cell offsets and the scatter permutation.
///
/// `pos[i]` is the sorted position of particle `i`; applying it groups
/// particles into contiguous runs of ascending cell id, ties in input
/// order.
pub fn sort_positions<B: ComputeBackend>(backend: &B, binning: &CellBinning) -> (Vec<u32>, Vec<u32>) {
    let offsets = backend.exclusive_scan(&binning.cell_counts);

    let pairs: Vec<(u32, u32)> = binning
        .cell_indices
        .iter()
        .copied()
        .zip(binning.local_ranks.iter().copied())
        .collect();
    let pos: Vec<u32> = maybe_par_iter!(pairs)
        .map(|&(ci, rank)| offsets[ci as usize] + rank)
        .collect();

    (offsets, pos)
}

/// Scatter `data` in place so element `i` lands at `pos[i]`.
///
/// Cycle-walking keeps the move in place instead of doubling memory with a
/// second full-size buffer; only a visited bitmap is allocated.
pub fn apply_permutation_in_place<T: Copy>(data: &mut [T], pos: &[u32]) {
    debug_assert_eq!(data.len(), pos.len());
    let mut placed = vec![false; data.len()];

    for start in 0..data.len() {
        if placed[start] {
            continue;
        }
        let mut value = data[start];
        let mut dst = pos[start] as usize;
        while dst != start {
            let evicted = data[dst];
            data[dst] = value;
            placed[dst] = true;
            value = evicted;
            dst = pos[dst] as usize;
        }
        data[start] = value;
        placed[start] = true;
    }
}

/// Inverse of a scatter permutation: `inv[pos[i]] == i`.
pub fn invert_permutation(pos: &[u32]) -> Vec<u32> {
    let mut inv = vec![0u32; pos.len()];
    for (i, &p) in pos.iter().enumerate() {
        inv[p as usize] = i as u32;
    }
    inv
}
