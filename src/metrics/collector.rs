use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::{embedded_send_nanos, RunClock};
use crate::bus::Subscription;

// ─── Rolling window ──────────────────────────────────────────────

/// Latency samples gathered since the last reporting tick.
///
/// The delivery consumer appends while the rolling reporter drains;
/// one mutex makes the two fully mutually exclusive, so a drain never
/// observes a half-appended window.
pub struct RollingWindow {
    samples: Mutex<Vec<u64>>,
}

impl RollingWindow {
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, latency_ns: u64) {
        self.samples.lock().push(latency_ns);
    }

    /// Takes the current epoch's samples, sorted ascending, and
    /// resets the window for the next epoch. Returns an empty vec
    /// when nothing arrived since the last drain.
    pub fn drain_sorted(&self) -> Vec<u64> {
        let mut drained = std::mem::take(&mut *self.samples.lock());
        drained.sort_unstable();
        drained
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Sample collector ────────────────────────────────────────────

/// Owns the full-run ledger and feeds the shared rolling window.
///
/// Lives inside the single delivery-consumer task, which serializes
/// every `record` call — the ledger and the received counter need no
/// further synchronization. The ledger changes hands exactly once,
/// when the consumer task completes and terminal reporting takes
/// over (`consume`'s return value is the happens-before edge).
pub struct SampleCollector {
    ledger: Vec<u64>,
    rolling: Arc<RollingWindow>,
    received: u64,
    expected: u64,
}

impl SampleCollector {
    pub fn new(expected: u64, rolling: Arc<RollingWindow>) -> Self {
        Self {
            ledger: Vec::with_capacity(expected as usize),
            rolling,
            received: 0,
            expected,
        }
    }

    /// Appends one arrival-ordered sample. Returns true exactly once:
    /// on the call that brings the received count up to the expected
    /// total. Out-of-order delivery is preserved as observed.
    pub fn record(&mut self, latency_ns: u64) -> bool {
        self.ledger.push(latency_ns);
        self.rolling.record(latency_ns);
        self.received += 1;
        self.received == self.expected
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn into_ledger(self) -> Vec<u64> {
        self.ledger
    }
}

/// Consumer task body: drains the run subscription until the
/// expected message count is reached, then hands the full-run ledger
/// back to the caller. Awaiting the task is the completion gate that
/// unblocks terminal reporting.
pub async fn consume(
    mut sub: Subscription,
    mut collector: SampleCollector,
    clock: RunClock,
) -> Vec<u64> {
    while let Some(msg) = sub.recv().await {
        let Some(sent) = embedded_send_nanos(&msg.payload) else {
            warn!(subject = %msg.subject, len = msg.payload.len(), "runt payload, no timestamp");
            continue;
        };
        let latency = clock.now_nanos().saturating_sub(sent);
        if collector.record(latency) {
            break;
        }
    }
    sub.unsubscribe();
    collector.into_ledger()
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Connection, InProcessBroker};
    use crate::metrics::stamp_payload;

    fn collector(expected: u64) -> SampleCollector {
        SampleCollector::new(expected, Arc::new(RollingWindow::new()))
    }

    #[test]
    fn completion_gate_fires_exactly_at_expected_count() {
        let mut c = collector(100);
        for i in 0..99 {
            assert!(!c.record(i), "gate fired early at sample {i}");
        }
        assert!(c.record(99));
        assert_eq!(c.received(), 100);
    }

    #[test]
    fn ledger_preserves_arrival_order() {
        let mut c = collector(3);
        c.record(30);
        c.record(10);
        c.record(20);
        assert_eq!(c.into_ledger(), vec![30, 10, 20]);
    }

    #[test]
    fn rolling_drain_sorts_and_resets() {
        let rolling = Arc::new(RollingWindow::new());
        let mut c = SampleCollector::new(10, rolling.clone());
        c.record(5);
        c.record(1);
        c.record(3);

        assert_eq!(rolling.drain_sorted(), vec![1, 3, 5]);
        assert!(rolling.is_empty());
        assert_eq!(rolling.drain_sorted(), Vec::<u64>::new());

        // The ledger keeps everything across drains.
        c.record(7);
        assert_eq!(c.into_ledger(), vec![5, 1, 3, 7]);
    }

    #[tokio::test]
    async fn consume_returns_ledger_once_expected_count_arrives() {
        let broker = InProcessBroker::new("solo");
        let conn = broker.connect();
        let sub = conn.subscribe("run").unwrap();
        let clock = RunClock::new();
        let c = collector(3);

        let handle = tokio::spawn(consume(sub, c, clock));

        let mut payload = vec![0u8; 16];
        for _ in 0..3 {
            stamp_payload(&mut payload, clock.now_nanos());
            conn.publish("run", &payload).unwrap();
        }

        let ledger = handle.await.unwrap();
        assert_eq!(ledger.len(), 3);
    }

    #[tokio::test]
    async fn consume_skips_runt_payloads() {
        let broker = InProcessBroker::new("solo");
        let conn = broker.connect();
        let sub = conn.subscribe("run").unwrap();
        let clock = RunClock::new();

        let handle = tokio::spawn(consume(sub, collector(1), clock));

        conn.publish("run", b"shrt").unwrap();
        let mut payload = vec![0u8; 16];
        stamp_payload(&mut payload, clock.now_nanos());
        conn.publish("run", &payload).unwrap();

        let ledger = handle.await.unwrap();
        assert_eq!(ledger.len(), 1);
    }
}
