pub mod collector;
pub mod exposition;
pub mod histogram;

use std::time::Instant;

/// Bytes at the front of every payload reserved for the send
/// timestamp — the only channel between the independently scheduled
/// send and receive paths.
pub const TIMESTAMP_LEN: usize = 8;

/// Monotonic nanosecond clock anchored at run start. Copies share the
/// anchor, so the publisher stamps and the collector diffs against
/// the same epoch regardless of which task they run on.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    epoch: Instant,
}

impl RunClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

impl Default for RunClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Overwrites the first 8 payload bytes with the send timestamp.
///
/// Panics if the payload is shorter than [`TIMESTAMP_LEN`]; config
/// validation rejects such payload sizes before a run starts.
pub fn stamp_payload(payload: &mut [u8], send_nanos: u64) {
    payload[..TIMESTAMP_LEN].copy_from_slice(&send_nanos.to_le_bytes());
}

/// Reads the embedded send timestamp back out of a delivered payload.
/// `None` for runt payloads, which cannot have come from our publisher.
pub fn embedded_send_nanos(payload: &[u8]) -> Option<u64> {
    let bytes = payload.get(..TIMESTAMP_LEN)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_and_read_back_round_trips() {
        let mut payload = vec![0xAB; 32];
        stamp_payload(&mut payload, 123_456_789);
        assert_eq!(embedded_send_nanos(&payload), Some(123_456_789));
        // The rest of the payload is untouched.
        assert!(payload[TIMESTAMP_LEN..].iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn runt_payload_yields_none() {
        assert_eq!(embedded_send_nanos(&[1, 2, 3]), None);
        assert_eq!(embedded_send_nanos(&[]), None);
    }

    #[test]
    fn clock_is_monotonic() {
        let clock = RunClock::new();
        let a = clock.now_nanos();
        let b = clock.now_nanos();
        assert!(b >= a);
    }
}
