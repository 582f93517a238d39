//! Abstract compute primitives and the CPU reference backend.
//!
//! Every per-element pass in the pipeline (bounds reduction, prefix sums,
//! key sorts, gathers, stream compaction) goes through [`ComputeBackend`]
//! so that the orchestration logic never depends on where the passes run.
//! [`CpuBackend`] is the reference implementation; a device-resident
//! backend can be substituted without touching the pipeline.

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

/// Compute primitives the preparation pipeline is built from.
///
/// Contracts only: no intra-pass ordering is guaranteed, but every method
/// is a synchronous barrier from the caller's point of view -- results are
/// fully materialized when it returns, since downstream allocation sizes
/// depend on them.
pub trait ComputeBackend: Sync {
    /// Min/max reduction over integer-floored coordinates.
    ///
    /// Returns `None` for an empty slice. The max corner is NOT widened
    /// here; callers add the +1 cell margin.
    fn reduce_bounds(&self, points: &[Point3]) -> Option<([i32; 3], [i32; 3])>;

    /// Exclusive prefix sum. `out[i] == sum(counts[0..i))`, summed in
    /// ascending index order for determinism.
    fn exclusive_scan(&self, counts: &[u32]) -> Vec<u32>;

    /// Stable sort of `values` by `keys`, both rearranged in place.
    /// Equal keys preserve the original relative order of their values.
    fn stable_sort_by_key(&self, keys: &mut [u32], values: &mut [u32]);

    /// Gather `src[indices[i]]` into a new buffer.
    fn gather(&self, indices: &[u32], src: &[Point3]) -> Vec<Point3>;

    /// Ordered stream compaction: keep `points[i]` where
    /// `lo <= keys[i] <= hi`, preserving relative order.
    fn compact_in_range(&self, points: &[Point3], keys: &[i32], lo: i32, hi: i32) -> Vec<Point3>;

    /// The identity sequence `0..n`.
    fn sequence(&self, n: usize) -> Vec<u32>;
}

/// Reference backend running every pass on the host.
///
/// Per-element passes parallelize over rayon when the `parallel` feature
/// is enabled; scans stay sequential so summation order is fixed.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl ComputeBackend for CpuBackend {
    fn reduce_bounds(&self, points: &[Point3]) -> Option<([i32; 3], [i32; 3])> {
        if points.is_empty() {
            return None;
        }

        let identity = || ([i32::MAX; 3], [i32::MIN; 3]);
        let fold = |(mut mn, mut mx): ([i32; 3], [i32; 3]), p: &Point3| {
            let c = [p.x.floor() as i32, p.y.floor() as i32, p.z.floor() as i32];
            for axis in 0..3 {
                mn[axis] = mn[axis].min(c[axis]);
                mx[axis] = mx[axis].max(c[axis]);
            }
            (mn, mx)
        };
        let merge = |(mut mn, mut mx): ([i32; 3], [i32; 3]), (bn, bx): ([i32; 3], [i32; 3])| {
            for axis in 0..3 {
                mn[axis] = mn[axis].min(bn[axis]);
                mx[axis] = mx[axis].max(bx[axis]);
            }
            (mn, mx)
        };

        #[cfg(feature = "parallel")]
        {
            Some(
                points
                    .par_iter()
                    .fold(identity, fold)
                    .reduce(identity, merge),
            )
        }
        #[cfg(not(feature = "parallel"))]
        {
            let _ = merge;
            Some(points.iter().fold(identity(), fold))
        }
    }

    fn exclusive_scan(&self, counts: &[u32]) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(counts.len());
        let mut running = 0u32;
        for &count in counts {
            offsets.push(running);
            running += count;
        }
        offsets
    }

    fn stable_sort_by_key(&self, keys: &mut [u32], values: &mut [u32]) {
        debug_assert_eq!(keys.len(), values.len());

        let mut order: Vec<u32> = (0..keys.len() as u32).collect();
        #[cfg(feature = "parallel")]
        order.par_sort_by_key(|&i| keys[i as usize]);
        #[cfg(not(feature = "parallel"))]
        order.sort_by_key(|&i| keys[i as usize]);

        // One scratch buffer, reused for both gathers.
        let mut scratch: Vec<u32> = order.iter().map(|&i| values[i as usize]).collect();
        values.copy_from_slice(&scratch);
        for (dst, &i) in scratch.iter_mut().zip(order.iter()) {
            *dst = keys[i as usize];
        }
        keys.copy_from_slice(&scratch);
    }

    fn gather(&self, indices: &[u32], src: &[Point3]) -> Vec<Point3> {
        maybe_par_iter!(indices).map(|&i| src[i as usize]).collect()
    }

    fn compact_in_range(&self, points: &[Point3], keys: &[i32], lo: i32, hi: i32) -> Vec<Point3> {
        debug_assert_eq!(points.len(), keys.len());
        points
            .iter()
            .zip(keys.iter())
            .filter(|(_, &k)| lo <= k && k <= hi)
            .map(|(&p, _)| p)
            .collect()
    }

    fn sequence(&self, n: usize) -> Vec<u32> {
        (0..n as u32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_bounds_empty() {
        assert!(CpuBackend.reduce_bounds(&[]).is_none());
    }

    #[test]
    fn test_reduce_bounds_floors() {
        let points = [
            Point3::new(-1.5, 0.25, 3.9),
            Point3::new(2.1, -0.75, 3.0),
        ];
        let (mn, mx) = CpuBackend.reduce_bounds(&points).unwrap();
        assert_eq!(mn, [-2, -1, 3]);
        assert_eq!(mx, [2, 0, 3]);
    }

    #[test]
    fn test_exclusive_scan() {
        let offsets = CpuBackend.exclusive_scan(&[3, 0, 2, 5]);
        assert_eq!(offsets, vec![0, 3, 3, 5]);
        assert!(CpuBackend.exclusive_scan(&[]).is_empty());
    }

    #[test]
    fn test_stable_sort_by_key_preserves_ties() {
        let mut keys = vec![2, 1, 2, 0, 1];
        let mut values = vec![10, 11, 12, 13, 14];
        CpuBackend.stable_sort_by_key(&mut keys, &mut values);
        assert_eq!(keys, vec![0, 1, 1, 2, 2]);
        // Ties keep input order: 11 before 14, 10 before 12.
        assert_eq!(values, vec![13, 11, 14, 10, 12]);
    }

    #[test]
    fn test_gather() {
        let src = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        let out = CpuBackend.gather(&[2, 0, 2], &src);
        assert_eq!(out, vec![src[2], src[0], src[2]]);
    }

    #[test]
    fn test_compact_in_range_preserves_order() {
        let points: Vec<Point3> = (0..6).map(|i| Point3::new(i as f32, 0.0, 0.0)).collect();
        let keys = [3, 1, 2, 1, 5, 2];
        let out = CpuBackend.compact_in_range(&points, &keys, 1, 2);
        let xs: Vec<f32> = out.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0, 5.0]);
    }

    #[test]
    fn test_sequence() {
        assert_eq!(CpuBackend.sequence(4), vec![0, 1, 2, 3]);
        assert!(CpuBackend.sequence(0).is_empty());
    }
}
