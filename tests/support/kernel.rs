#![allow(dead_code)]

use raybin::{Point3, TraversalKernel};

/// Brute-force stand-in for the hardware traversal: the first hit of a
/// query is its nearest primitive within the launch distance.
pub struct LinearTraversal {
    pub primitives: Vec<Point3>,
}

impl LinearTraversal {
    pub fn new(primitives: &[Point3]) -> Self {
        Self {
            primitives: primitives.to_vec(),
        }
    }

    pub fn nearest_within(&self, query: Point3, max_distance: f32) -> Option<u32> {
        let max_sq = max_distance * max_distance;
        let mut best: Option<(f32, u32)> = None;
        for (i, &p) in self.primitives.iter().enumerate() {
            let d = query.dist_sq(p);
            if d <= max_sq && best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, i as u32));
            }
        }
        best.map(|(_, i)| i)
    }
}

impl TraversalKernel for LinearTraversal {
    fn first_hits(&self, queries: &[Point3], max_distance: f32) -> Vec<Option<u32>> {
        queries
            .iter()
            .map(|&q| self.nearest_within(q, max_distance))
            .collect()
    }
}
