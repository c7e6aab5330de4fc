use hdrhistogram::Histogram;

use crate::error::BenchError;

/// Percentiles published on every reporting tick and in the final
/// summary. The fine-grained tail entries are the point of using a
/// histogram at all: they stay accurate under millions of samples
/// with bounded memory.
pub const TRACKED_PERCENTILES: [f64; 10] =
    [10.0, 50.0, 75.0, 90.0, 99.0, 99.99, 99.999, 99.9999, 99.99999, 100.0];

/// Significant decimal digits of value resolution.
const SIGNIFICANT_FIGURES: u8 = 5;

// ─── Histogram engine ────────────────────────────────────────────

/// Logarithmically bucketed quantile estimator over nanosecond
/// latencies, sized to the observed value range.
pub struct LatencyHistogram {
    hist: Histogram<u64>,
}

impl LatencyHistogram {
    /// Builds a histogram spanning [1, max(samples)].
    ///
    /// Panics on an empty sample set — no histogram can be built over
    /// an empty range, and every call site guards for emptiness first
    /// (the rolling reporter skips empty ticks, terminal reporting
    /// rejects an empty ledger before getting here).
    pub fn from_samples(samples: &[u64]) -> Self {
        assert!(
            !samples.is_empty(),
            "histogram requires at least one sample"
        );
        let max = samples.iter().copied().max().unwrap_or(1);
        let mut hist = Histogram::<u64>::new_with_bounds(1, max.max(2), SIGNIFICANT_FIGURES)
            .expect("histogram creation");
        for &s in samples {
            // Zero-latency samples clamp to the histogram floor.
            let _ = hist.record(s.max(1));
        }
        Self { hist }
    }

    /// Estimated value at percentile `p` (in (0, 100]), within the
    /// bucketing relative-error bound.
    pub fn quantile(&self, p: f64) -> u64 {
        self.hist.value_at_percentile(p)
    }

    pub fn count(&self) -> u64 {
        self.hist.len()
    }
}

// ─── Exact full-run statistics ───────────────────────────────────

/// Exact min/median/max, affordable once at run end when the full
/// ledger has already been sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactStats {
    pub min_ns: u64,
    pub median_ns: u64,
    pub max_ns: u64,
}

/// `sorted` must be ascending. Errors on an empty slice rather than
/// inventing statistics.
pub fn exact_stats(sorted: &[u64]) -> Result<ExactStats, BenchError> {
    if sorted.is_empty() {
        return Err(BenchError::EmptySampleSet);
    }
    Ok(ExactStats {
        min_ns: sorted[0],
        median_ns: median(sorted),
        max_ns: sorted[sorted.len() - 1],
    })
}

fn median(sorted: &[u64]) -> u64 {
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2
    } else {
        sorted[n / 2]
    }
}

/// Arithmetic mean in milliseconds, computed from the raw samples
/// rather than histogram buckets.
pub fn mean_millis(samples: &[u64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&ns| ns as f64 / 1_000_000.0).sum();
    sum / samples.len() as f64
}

// ─── Tests ───────────────────────────────────────────────────────
