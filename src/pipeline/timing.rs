//! Zero-cost timing instrumentation for the preparation pipeline.
//!
//! When the `timing` feature is enabled, phase durations are measured and
//! reported on stderr. When disabled, everything here compiles away.

#[cfg(feature = "timing")]
use std::time::Duration;

/// Phase timings for one preparation run.
#[cfg(feature = "timing")]
#[derive(Debug, Clone, Default)]
pub struct PrepTimings {
    pub bounds: Duration,
    pub grid_plan: Duration,
    pub binning: Duration,
    pub classify: Duration,
    pub counting_sort: Duration,
    pub permute: Duration,
    pub batching: Duration,
}

#[cfg(feature = "timing")]
impl PrepTimings {
    pub fn total(&self) -> Duration {
        self.bounds
            + self.grid_plan
            + self.binning
            + self.classify
            + self.counting_sort
            + self.permute
            + self.batching
    }

    pub fn report(&self, n_points: usize, n_queries: usize) {
        let total = self.total();
        let pct = |d: Duration| {
            if total.as_nanos() == 0 {
                0.0
            } else {
                d.as_secs_f64() / total.as_secs_f64() * 100.0
            }
        };
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;

        eprintln!("[timing] prepare points={} queries={}", n_points, n_queries);
        eprintln!("  bounds:        {:7.1}ms ({:4.1}%)", ms(self.bounds), pct(self.bounds));
        eprintln!(
            "  grid_plan:     {:7.1}ms ({:4.1}%)",
            ms(self.grid_plan),
            pct(self.grid_plan)
        );
        eprintln!("  binning:       {:7.1}ms ({:4.1}%)", ms(self.binning), pct(self.binning));
        if self.classify.as_nanos() > 0 {
            eprintln!(
                "  classify:      {:7.1}ms ({:4.1}%)",
                ms(self.classify),
                pct(self.classify)
            );
        }
        eprintln!(
            "  counting_sort: {:7.1}ms ({:4.1}%)",
            ms(self.counting_sort),
            pct(self.counting_sort)
        );
        eprintln!("  permute:       {:7.1}ms ({:4.1}%)", ms(self.permute), pct(self.permute));
        if self.batching.as_nanos() > 0 {
            eprintln!(
                "  batching:      {:7.1}ms ({:4.1}%)",
                ms(self.batching),
                pct(self.batching)
            );
        }
        eprintln!("  total:         {:7.1}ms", ms(total));
    }
}

/// Dummy timings when the feature is disabled (zero-sized).
#[cfg(not(feature = "timing"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct PrepTimings;

#[cfg(not(feature = "timing"))]
impl PrepTimings {
    #[inline(always)]
    pub fn report(&self, _n_points: usize, _n_queries: usize) {}
}

/// Timer that tracks elapsed time when timing is enabled.
#[cfg(feature = "timing")]
pub struct Timer(std::time::Instant);

#[cfg(feature = "timing")]
impl Timer {
    #[inline]
    pub fn start() -> Self {
        Self(std::time::Instant::now())
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}
