use std::time::Duration;

use thiserror::Error;

use crate::bus::BusError;

/// Everything that can abort a benchmark run.
///
/// Recoverable conditions (empty rolling window, optional file exports)
/// are handled where they occur and never become a `BenchError`; anything
/// that reaches main through this type terminates the process.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("payload must be at least {min} bytes to carry the send timestamp, got {got}")]
    PayloadTooSmall { min: usize, got: usize },

    #[error("target publish rate must be at least 1 msg/sec")]
    ZeroTargetRate,

    #[error("no probe message received within {0:?} — route never propagated between nodes")]
    RouteUnavailable(Duration),

    #[error("cannot compute statistics over an empty sample set")]
    EmptySampleSet,

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("collector task failed: {0}")]
    CollectorFailed(String),
}
