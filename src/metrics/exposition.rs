use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Latest published metric values, in milliseconds, keyed by metric
/// name (`AverageLatency`, `Percentile99.00000`, ...).
pub type MetricValues = BTreeMap<String, f64>;

/// Snapshot holder shared between the rolling reporter (writer) and
/// the HTTP exposition endpoint (readers).
///
/// The reporter builds a complete map off to the side and swaps it in
/// as one `Arc` replacement, so a concurrent reader always sees
/// either the previous snapshot or the new one, never a partially
/// updated map. Created once at startup and injected into both
/// sides; it lives for the process lifetime.
pub struct MetricsMap {
    current: RwLock<Arc<MetricValues>>,
}

impl MetricsMap {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(MetricValues::new())),
        }
    }

    /// Replaces the snapshot wholesale.
    pub fn replace(&self, next: MetricValues) {
        *self.current.write() = Arc::new(next);
    }

    /// The last completed snapshot; never blocks on recomputation.
    pub fn snapshot(&self) -> Arc<MetricValues> {
        self.current.read().clone()
    }
}

impl Default for MetricsMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Metric key for a percentile, e.g. `Percentile99.00000`.
pub fn percentile_key(p: f64) -> String {
    format!("Percentile{p:.5}")
}

pub fn nanos_to_millis(ns: u64) -> f64 {
    ns as f64 / 1_000_000.0
}

// ─── Tests ───────────────────────────────────────────────────────
