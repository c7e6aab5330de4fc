use std::path::PathBuf;

use clap::Parser;

use crate::error::BenchError;
use crate::metrics::TIMESTAMP_LEN;

// ─── Run configuration ───────────────────────────────────────────

/// End-to-end pub/sub latency benchmark with live percentile
/// exposition over HTTP.
#[derive(Debug, Clone, Parser)]
#[command(name = "pubsub-latency-bench", version, about)]
pub struct BenchConfig {
    /// Target publish rate in msgs/sec.
    #[arg(long = "rate", short = 'r', default_value_t = 1000)]
    pub target_rate: u64,

    /// Message payload size in bytes (min 8, to carry the timestamp).
    #[arg(long = "size", short = 's', default_value_t = 8)]
    pub msg_size: usize,

    /// Test duration in seconds.
    #[arg(long = "duration", short = 'd', default_value_t = 5)]
    pub duration_secs: u64,

    /// Base path for the raw (<path>.raw) and distribution
    /// (<path>.histogram) export files.
    #[arg(long = "hist")]
    pub hist_file: Option<PathBuf>,

    /// Port for the /latency_stats endpoint.
    #[arg(long, default_value_t = 9080)]
    pub port: u16,

    /// Number of background noise subjects (0 disables noise load).
    #[arg(long, default_value_t = 0)]
    pub subjects: u32,

    /// Attach publisher and subscriber to different broker nodes,
    /// exercising route propagation.
    #[arg(long, default_value_t = false)]
    pub cluster: bool,
}

impl BenchConfig {
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.msg_size < TIMESTAMP_LEN {
            return Err(BenchError::PayloadTooSmall {
                min: TIMESTAMP_LEN,
                got: self.msg_size,
            });
        }
        if self.target_rate == 0 {
            return Err(BenchError::ZeroTargetRate);
        }
        Ok(())
    }

    /// Total messages published over the run.
    pub fn expected_total(&self) -> u64 {
        self.duration_secs * self.target_rate
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BenchConfig {
        BenchConfig::parse_from(["pubsub-latency-bench"])
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = base();
        cfg.validate().unwrap();
        assert_eq!(cfg.target_rate, 1000);
        assert_eq!(cfg.msg_size, 8);
        assert_eq!(cfg.expected_total(), 5000);
    }

    #[test]
    fn rejects_payload_too_small_for_timestamp() {
        let mut cfg = base();
        cfg.msg_size = 7;
        assert!(matches!(
            cfg.validate(),
            Err(BenchError::PayloadTooSmall { min: 8, got: 7 })
        ));
    }

    #[test]
    fn rejects_zero_target_rate() {
        let mut cfg = base();
        cfg.target_rate = 0;
        assert!(matches!(cfg.validate(), Err(BenchError::ZeroTargetRate)));
    }
}
