use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::BenchError;
use crate::metrics::collector::RollingWindow;
use crate::metrics::exposition::{nanos_to_millis, percentile_key, MetricValues, MetricsMap};
use crate::metrics::histogram::{exact_stats, mean_millis, LatencyHistogram, TRACKED_PERCENTILES};

/// How often the rolling reporter publishes a snapshot.
pub const REPORT_PERIOD: Duration = Duration::from_secs(3);

/// Extended percentile set written to the distribution file.
const DISTRIBUTION_PERCENTILES: [f64; 12] = [
    10.0, 25.0, 50.0, 75.0, 90.0, 99.0, 99.9, 99.99, 99.999, 99.9999, 99.99999, 100.0,
];

// ─── Rolling reporter ────────────────────────────────────────────

/// Periodic reporter: drains the rolling window on each tick and
/// republishes the MetricsMap snapshot.
pub struct RollingReporter {
    rolling: Arc<RollingWindow>,
    metrics: Arc<MetricsMap>,
}

impl RollingReporter {
    pub fn new(rolling: Arc<RollingWindow>, metrics: Arc<MetricsMap>) -> Self {
        Self { rolling, metrics }
    }

    /// One reporting tick. Returns false (and touches nothing) when
    /// the window is empty — a quiet epoch is skipped, not an error,
    /// and building a histogram over an empty range is undefined.
    pub fn tick(&self) -> bool {
        let window = self.rolling.drain_sorted();
        if window.is_empty() {
            return false;
        }

        let hist = LatencyHistogram::from_samples(&window);
        let mean_ms = mean_millis(&window);

        let mut next = MetricValues::new();
        next.insert("AverageLatency".into(), mean_ms);

        info!("rolling percentiles ({} samples):", window.len());
        for &p in &TRACKED_PERCENTILES {
            let value = hist.quantile(p);
            next.insert(percentile_key(p), nanos_to_millis(value));
            info!("{:>9.5}: {}", p, fmt_nanos(value));
        }
        info!("average latency: {mean_ms:.3} ms");

        self.metrics.replace(next);
        true
    }

    /// Task body: ticks on a fixed period until `stop` flips. The
    /// caller sleeps a short grace period after signalling stop so an
    /// in-flight tick cannot race the terminal drain.
    pub async fn run(self, period: Duration, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // interval fires immediately; skip the zeroth tick.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                changed = stop.changed() => {
                    // A dropped sender also means the run is over.
                    if changed.is_err() || *stop.borrow() {
                        debug!("rolling reporter stopped");
                        return;
                    }
                }
            }
        }
    }
}

// ─── Terminal report ─────────────────────────────────────────────

/// Wall-clock milestones logged in the final summary.
#[derive(Debug, Clone, Copy)]
pub struct RunTimings {
    /// From process start to the first publish.
    pub time_to_first_publish: Duration,
    /// First publish to last publish.
    pub publish_duration: Duration,
    /// First publish to last delivery.
    pub end_to_end_duration: Duration,
}

/// End-of-run analysis over the complete ledger: optional raw export,
/// exact statistics from the one affordable full sort, histogram
/// percentiles, optional distribution export, and throughput.
///
/// An empty ledger means the completion gate logic is broken and is
/// reported as a fatal error; failed file exports only cost the
/// export, never the run.
pub fn finalize(
    mut ledger: Vec<u64>,
    payload_size: usize,
    export_base: Option<&Path>,
    timings: RunTimings,
) -> Result<(), BenchError> {
    if ledger.is_empty() {
        return Err(BenchError::EmptySampleSet);
    }

    // Raw samples keep arrival order, so write them before sorting.
    if let Some(base) = export_base {
        let path = with_suffix(base, "raw");
        if let Err(err) = write_raw_file(&path, &ledger) {
            warn!("unable to write raw sample file {}: {err}", path.display());
        }
    }

    ledger.sort_unstable();
    let hist = LatencyHistogram::from_samples(&ledger);
    let stats = exact_stats(&ledger)?;

    info!("final percentiles ({} samples):", ledger.len());
    for &p in &TRACKED_PERCENTILES {
        info!("{:>9.5}: {}", p, fmt_nanos(hist.quantile(p)));
    }

    if let Some(base) = export_base {
        let path = with_suffix(base, "histogram");
        if let Err(err) = write_distribution_file(&path, &hist) {
            warn!(
                "unable to write distribution file {}: {err}",
                path.display()
            );
        }
    }

    let count = ledger.len() as u64;
    let rate = rate_per_sec(count, timings.publish_duration);
    // Every message crosses the fabric twice: publish and delivery.
    let bandwidth = rate * payload_size as f64 * 2.0;
    info!("actual msgs/sec: {rate:.0}");
    info!("actual band/sec: {}", byte_size(bandwidth));
    info!("minimum latency: {}", fmt_nanos(stats.min_ns));
    info!("median latency : {}", fmt_nanos(stats.median_ns));
    info!("maximum latency: {}", fmt_nanos(stats.max_ns));
    info!(
        "first publish wall time: {}",
        fmt_duration(timings.time_to_first_publish)
    );
    info!(
        "publish duration       : {}",
        fmt_duration(timings.publish_duration)
    );
    info!(
        "end-to-end duration    : {}",
        fmt_duration(timings.end_to_end_duration)
    );
    Ok(())
}

// ─── File export ─────────────────────────────────────────────────

/// One latency value in milliseconds per line, ledger order.
fn write_raw_file(path: &Path, ledger: &[u64]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for &ns in ledger {
        writeln!(out, "{:.6}", nanos_to_millis(ns))?;
    }
    out.flush()
}

/// Percentile→value table over the full-run histogram.
fn write_distribution_file(path: &Path, hist: &LatencyHistogram) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{:>12}  {:>14}", "Percentile", "Latency(ms)")?;
    for &p in &DISTRIBUTION_PERCENTILES {
        writeln!(
            out,
            "{:>12.5}  {:>14.6}",
            p,
            nanos_to_millis(hist.quantile(p))
        )?;
    }
    writeln!(out, "{:>12}  {:>14}", "TotalCount", hist.count())?;
    out.flush()
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

// ─── Formatting helpers ──────────────────────────────────────────

pub fn rate_per_sec(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Renders a nanosecond latency truncated to microsecond precision,
/// e.g. `234µs`, `4.567ms`.
pub fn fmt_nanos(ns: u64) -> String {
    fmt_duration(Duration::from_nanos(ns))
}

pub fn fmt_duration(d: Duration) -> String {
    format!("{:?}", Duration::from_micros(d.as_micros() as u64))
}

/// Pretty-prints a byte count with 1024-based units.
pub fn byte_size(n: f64) -> String {
    const UNITS: [&str; 5] = ["B", "K", "M", "G", "T"];
    if n < 10.0 {
        return format!("{n:.0}{}", UNITS[0]);
    }
    let exp = ((n.ln() / 1024f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let val = n / 1024f64.powi(exp as i32);
    if val < 10.0 {
        format!("{val:.1}{}", UNITS[exp])
    } else {
        format!("{val:.0}{}", UNITS[exp])
    }
}

// ─── Tests ───────────────────────────────────────────────────────
