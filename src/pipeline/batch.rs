//! Histogram-driven query batching.
//!
//! Each query inherits the mask of its containing cell; a histogram over
//! the masks then drives batch formation: one batch per observed mask
//! value, ascending, each searched with the smallest launch radius its
//! mask permits. The final batch always runs at the full configured
//! radius, so classification accuracy can never cost correctness.

use crate::backend::ComputeBackend;
use crate::types::Point3;

use super::mask::{shell_width, CellClassification, UNCLASSIFIED};
use super::SearchMode;

/// One group of queries sharing a contiguous mask range and launch radius.
#[derive(Debug, Clone)]
pub struct QueryBatch {
    /// Upper bound of the mask range covered by this batch (inclusive).
    pub mask_upper: i32,
    /// Traversal distance for every query in this batch.
    pub launch_radius: f32,
    /// Active queries, in sorted-query order.
    pub queries: Vec<Point3>,
}

impl QueryBatch {
    /// Number of active queries.
    #[inline]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// True if the batch carries no work. Empty batches are valid inputs
    /// to the traversal stage and simply yield nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Copy each query's cell mask out of the classification.
///
/// Cells without a representative never got a mask of their own; queries
/// landing there fall back to the full-search sentinel.
pub fn gather_ray_masks(cell_indices: &[u32], classification: &CellClassification) -> Vec<i32> {
    let sentinel = classification.sentinel();
    cell_indices
        .iter()
        .map(|&ci| {
            let mask = classification.cell_masks[ci as usize];
            if mask == UNCLASSIFIED {
                sentinel
            } else {
                mask
            }
        })
        .collect()
}

/// Dense histogram over mask values `0..=sentinel`.
///
/// Built once per run and consumed read-only; it is invariant under the
/// query permutation, so it can be taken before or after sorting.
pub fn mask_histogram(ray_masks: &[i32], sentinel: i32) -> Vec<u32> {
    let mut hist = vec![0u32; (sentinel + 1).max(1) as usize];
    for &mask in ray_masks {
        hist[mask as usize] += 1;
    }
    hist
}

/// Launch radius implied by a mask: half the guaranteed cube width,
/// inflated by sqrt(2) in k-NN mode so the circumscribed sphere covers
/// the cube.
pub(crate) fn launch_radius_for(mask: i32, cell_size: f32, mode: SearchMode) -> f32 {
    let half_width = shell_width(mask, cell_size) / 2.0;
    match mode {
        SearchMode::Radius => half_width,
        SearchMode::Knn => half_width * std::f32::consts::SQRT_2,
    }
}

/// Form one batch per observed mask value, in ascending mask order.
///
/// Batch `i` with upper mask `m` holds the queries whose mask lies in
/// `(previous upper, m]`, extracted by an ordered compaction over the
/// sorted query array. Launch radii are non-decreasing across batches and
/// the last batch is clamped to `full_radius` exactly.
pub fn form_batches<B: ComputeBackend>(
    backend: &B,
    sorted_queries: &[Point3],
    sorted_masks: &[i32],
    histogram: &[u32],
    cell_size: f32,
    mode: SearchMode,
    full_radius: f32,
) -> Vec<QueryBatch> {
    let observed: Vec<i32> = histogram
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count > 0)
        .map(|(mask, _)| mask as i32)
        .collect();

    let mut batches = Vec::with_capacity(observed.len());
    let mut prev_upper = -1i32;
    for (i, &mask_upper) in observed.iter().enumerate() {
        let queries =
            backend.compact_in_range(sorted_queries, sorted_masks, prev_upper + 1, mask_upper);
        debug_assert_eq!(queries.len() as u32, histogram[mask_upper as usize]);

        let launch_radius = if i + 1 == observed.len() {
            full_radius
        } else {
            launch_radius_for(mask_upper, cell_size, mode)
        };

        batches.push(QueryBatch {
            mask_upper,
            launch_radius,
            queries,
        });
        prev_upper = mask_upper;
    }
    batches
}
