use std::time::{Duration, Instant};

use rand::RngCore;
use tracing::debug;

use crate::bus::Connection;
use crate::error::BenchError;
use crate::metrics::{stamp_payload, RunClock};
use crate::rate::RatePolicy;

// ─── Publish loop ────────────────────────────────────────────────

/// Publishes `total` timestamped messages on `subject`, pacing each
/// send with the rate policy's delay. The blocking sleep between
/// sends is the sole backpressure mechanism — there is no queue.
///
/// Returns the wall time from the first to the last publish.
pub async fn publish_all<C: Connection>(
    conn: &C,
    subject: &str,
    total: u64,
    payload_size: usize,
    throttle: &mut dyn RatePolicy,
    clock: RunClock,
) -> Result<Duration, BenchError> {
    let mut payload = random_payload(payload_size);

    let pub_start = Instant::now();
    for sent in 1..=total {
        stamp_payload(&mut payload, clock.now_nanos());
        conn.publish(subject, &payload)?;
        let delay = throttle.next_delay(sent, pub_start.elapsed());
        tokio::time::sleep(delay).await;
    }
    let elapsed = pub_start.elapsed();
    debug!(total, ?elapsed, "publish loop finished");
    Ok(elapsed)
}

/// Random payload body; the first 8 bytes are restamped per send.
fn random_payload(size: usize) -> Vec<u8> {
    let mut payload = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut payload);
    payload
}

// ─── Tests ───────────────────────────────────────────────────────
