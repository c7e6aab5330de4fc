use std::time::Duration;

// ─── Publish throttle ────────────────────────────────────────────

/// Decides how long the publish loop sleeps after each send.
/// Seam for swapping in a stricter pacer (token bucket etc.)
/// without touching the publish loop.
pub trait RatePolicy: Send {
    /// `sent` is the number of messages published so far, `elapsed`
    /// the wall time since the first publish.
    fn next_delay(&mut self, sent: u64, elapsed: Duration) -> Duration;
}

/// Crude proportional controller: nudge the inter-send delay by 5%
/// toward the target rate on every send. Trades precision for
/// simplicity and bounded overshoot — the benchmark measures latency
/// distribution, not exact throughput.
pub struct ProportionalThrottle {
    target_rate: u64,
    delay: Duration,
}

impl ProportionalThrottle {
    /// Starts at the ideal delay of `1s / rate`.
    pub fn new(target_rate: u64) -> Self {
        Self {
            target_rate,
            delay: Duration::from_secs(1) / target_rate.max(1) as u32,
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.delay
    }
}

impl RatePolicy for ProportionalThrottle {
    fn next_delay(&mut self, sent: u64, elapsed: Duration) -> Duration {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            let observed = sent as f64 / secs;
            // 1 ns floor keeps adjusting once the delay is near zero.
            let adj = (self.delay / 20).max(Duration::from_nanos(1));
            let target = self.target_rate as f64;
            if observed < target {
                // Saturates at zero — the delay can never go negative.
                self.delay = self.delay.saturating_sub(adj);
            } else if observed > target {
                self.delay += adj;
            }
        }
        self.delay
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_delay_is_one_over_rate() {
        assert_eq!(
            ProportionalThrottle::new(1000).current_delay(),
            Duration::from_millis(1)
        );
        assert_eq!(
            ProportionalThrottle::new(200).current_delay(),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn slow_observed_rate_shrinks_delay() {
        let mut t = ProportionalThrottle::new(1000);
        // 500 msgs over 1s → observed 500 < 1000 target.
        let d = t.next_delay(500, Duration::from_secs(1));
        assert_eq!(d, Duration::from_micros(950));
    }

    #[test]
    fn fast_observed_rate_grows_delay() {
        let mut t = ProportionalThrottle::new(1000);
        let d = t.next_delay(2000, Duration::from_secs(1));
        assert_eq!(d, Duration::from_micros(1050));
    }

    #[test]
    fn adjustment_step_floors_at_one_nanosecond() {
        let mut t = ProportionalThrottle::new(1000);
        t.delay = Duration::from_nanos(10);
        // delay/20 would be 0ns; the floor keeps forward progress.
        let d = t.next_delay(1, Duration::from_secs(1));
        assert_eq!(d, Duration::from_nanos(9));
    }

    #[test]
    fn delay_never_goes_below_zero() {
        let mut t = ProportionalThrottle::new(1000);
        t.delay = Duration::ZERO;
        let d = t.next_delay(1, Duration::from_secs(100));
        assert_eq!(d, Duration::ZERO);
    }

    #[test]
    fn zero_elapsed_leaves_delay_untouched() {
        let mut t = ProportionalThrottle::new(1000);
        let before = t.current_delay();
        assert_eq!(t.next_delay(1, Duration::ZERO), before);
    }

    #[test]
    fn converges_toward_target_under_fixed_overhead() {
        // Simulated clock: each send costs the throttle delay plus a
        // fixed 200µs of scheduling overhead. The controller has to
        // discover an equilibrium delay below the ideal 1ms.
        let mut t = ProportionalThrottle::new(1000);
        let overhead = Duration::from_micros(200);
        let mut elapsed = Duration::ZERO;
        let total = 20_000u64;
        for sent in 1..=total {
            elapsed += t.current_delay() + overhead;
            t.next_delay(sent, elapsed);
        }
        let observed = total as f64 / elapsed.as_secs_f64();
        assert!(
            (observed - 1000.0).abs() / 1000.0 < 0.2,
            "observed rate {observed} not within 20% of target"
        );
    }
}
