//! Benchmark preparation throughput over synthetic point clouds.

use raybin::{prepare, Point3, PrepConfig};
use std::time::Instant;

fn next_unit(state: &mut u64) -> f32 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    ((*state >> 40) as f32) / ((1u64 << 24) as f32)
}

fn generate_cloud(n: usize, side: f32, seed: u64) -> Vec<Point3> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            Point3::new(
                next_unit(&mut state) * side,
                next_unit(&mut state) * side,
                next_unit(&mut state) * side,
            )
        })
        .collect()
}

struct Stats {
    mean: f64,
    std_dev: f64,
    min: f64,
    max: f64,
}

fn compute_stats(samples: &[f64]) -> Stats {
    let n = samples.len();
    let mean = samples.iter().sum::<f64>() / n as f64;
    let variance = samples.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    Stats {
        mean,
        std_dev: variance.sqrt(),
        min: samples.iter().fold(f64::INFINITY, |a, &b| a.min(b)),
        max: samples.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)),
    }
}

fn run_bench(n_points: usize, config: &PrepConfig, samples: usize) -> Stats {
    let points = generate_cloud(n_points, 20.0, 0x5eed);

    let mut times = Vec::with_capacity(samples);
    for _ in 0..samples {
        // Warmup
        drop(prepare(&points, config));

        let start = Instant::now();
        let session = prepare(&points, config).unwrap();
        let elapsed = start.elapsed();
        std::hint::black_box(session.batches().len());
        times.push(elapsed.as_secs_f64() * 1000.0);
    }

    compute_stats(&times)
}

fn main() {
    let num_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8);
    let samples = 5;

    #[cfg(feature = "parallel")]
    {
        let _ = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global();
    }

    println!("Preparation benchmark, {num_threads} threads, {samples} samples per size");
    println!();

    let config = PrepConfig {
        radius: 1.0,
        cell_ratio: 4.0,
        k: 32,
        ..PrepConfig::default()
    };

    // Print grid/batch counters once so throughput numbers have context.
    let session = prepare(&generate_cloud(100_000, 20.0, 0x5eed), &config).unwrap();
    let d = session.diagnostics();
    println!(
        "n=100000: grid {}x{}x{} ({} cells), {} representatives, {} batches",
        d.grid_dims[0],
        d.grid_dims[1],
        d.grid_dims[2],
        d.num_cells,
        d.num_representatives,
        d.num_batches
    );
    println!();

    for n_points in [10_000usize, 100_000, 1_000_000] {
        let stats = run_bench(n_points, &config, samples);
        println!(
            "n={:>9}: mean {:8.2}ms  std {:6.2}ms  min {:8.2}ms  max {:8.2}ms",
            n_points, stats.mean, stats.std_dev, stats.min, stats.max
        );
    }
}
