#![allow(dead_code)]

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use raybin::Point3;

/// Generate points uniformly distributed in a cube of the given side.
pub fn uniform_cube_points(n: usize, side: f32, seed: u64) -> Vec<Point3> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    uniform_cube_points_with_rng(n, side, &mut rng)
}

pub fn uniform_cube_points_with_rng<R: Rng + ?Sized>(
    n: usize,
    side: f32,
    rng: &mut R,
) -> Vec<Point3> {
    (0..n)
        .map(|_| {
            Point3::new(
                rng.gen_range(0.0..side),
                rng.gen_range(0.0..side),
                rng.gen_range(0.0..side),
            )
        })
        .collect()
}

/// One point per octant of the unit cube.
///
/// With a cell size of 0.5 this yields exactly 8 grid cells holding one
/// point each.
pub fn octant_points() -> Vec<Point3> {
    let mut points = Vec::with_capacity(8);
    for z in [0.25f32, 0.75] {
        for y in [0.25f32, 0.75] {
            for x in [0.25f32, 0.75] {
                points.push(Point3::new(x, y, z));
            }
        }
    }
    points
}

/// Bimodal density: a dense cluster plus a sparse uniform background.
///
/// Stresses the classifier: cluster cells meet any reasonable threshold
/// within few shells while background cells need wide expansions or the
/// full-search fallback.
pub fn bimodal_points(n: usize, side: f32, cluster_side: f32, seed: u64) -> Vec<Point3> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n_clustered = n / 2;
    let n_sparse = n - n_clustered;

    let mut points = Vec::with_capacity(n);
    for _ in 0..n_sparse {
        points.push(Point3::new(
            rng.gen_range(0.0..side),
            rng.gen_range(0.0..side),
            rng.gen_range(0.0..side),
        ));
    }
    let origin = side * 0.5;
    for _ in 0..n_clustered {
        points.push(Point3::new(
            origin + rng.gen_range(0.0..cluster_side),
            origin + rng.gen_range(0.0..cluster_side),
            origin + rng.gen_range(0.0..cluster_side),
        ));
    }
    points
}

/// Jittered copies of existing points, for distinct query sets.
pub fn jittered_queries(points: &[Point3], jitter: f32, seed: u64) -> Vec<Point3> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    points
        .iter()
        .map(|p| {
            Point3::new(
                p.x + rng.gen_range(-jitter..jitter),
                p.y + rng.gen_range(-jitter..jitter),
                p.z + rng.gen_range(-jitter..jitter),
            )
        })
        .collect()
}
