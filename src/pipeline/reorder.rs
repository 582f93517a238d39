//! Post-traversal query reordering by first-hit locality.
//!
//! After a batch returns from the traversal, queries that hit nearby
//! primitives are ranked next to each other so downstream consumers walk
//! memory in hit order. Only a rank map is produced by default; gathering
//! the query buffer into that order is a separate step with a real cost
//! attached (the acceleration structure must be rebuilt afterwards).

use crate::backend::ComputeBackend;
use crate::types::Point3;

/// Sort key used when ranking queries after traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOrdering {
    /// Rank by the first-hit primitive id.
    HitId,
    /// Rank by one coordinate (z) of the first-hit primitive's position.
    HitCoord,
}

/// Build the rank-to-query map for one batch.
///
/// `first_hits[q]` is the primitive id the traversal returned for query
/// `q`, or `None` on a miss; misses rank last. `points` is the sorted
/// particle array the primitive ids refer to. The returned vector maps
/// each rank to the query index holding that rank.
pub fn rank_by_hits<B: ComputeBackend>(
    backend: &B,
    first_hits: &[Option<u32>],
    points: &[Point3],
    ordering: HitOrdering,
) -> Vec<u32> {
    let mut ranks = backend.sequence(first_hits.len());
    match ordering {
        HitOrdering::HitId => {
            let mut keys: Vec<u32> = first_hits
                .iter()
                .map(|hit| hit.unwrap_or(u32::MAX))
                .collect();
            backend.stable_sort_by_key(&mut keys, &mut ranks);
        }
        HitOrdering::HitCoord => {
            // Gather the hit coordinate as the key; misses get +inf.
            let hit_indices: Vec<u32> = first_hits.iter().map(|hit| hit.unwrap_or(0)).collect();
            let gathered = backend.gather(&hit_indices, points);
            let keys: Vec<f32> = gathered
                .iter()
                .zip(first_hits.iter())
                .map(|(p, hit)| if hit.is_some() { p.z } else { f32::INFINITY })
                .collect();
            ranks.sort_by(|&a, &b| keys[a as usize].total_cmp(&keys[b as usize]));
        }
    }
    ranks
}

/// Gather a batch's queries into rank order.
///
/// Replaces the batch buffer wholesale; callers must rebuild the external
/// acceleration structure before searching against the gathered buffer.
pub fn gather_by_rank<B: ComputeBackend>(
    backend: &B,
    queries: &[Point3],
    rank_to_query: &[u32],
) -> Vec<Point3> {
    backend.gather(rank_to_query, queries)
}
