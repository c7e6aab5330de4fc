use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::bus::Connection;

/// Pause between noise publishes; keeps the contention realistic
/// without starving the measured publisher.
const NOISE_PACE: Duration = Duration::from_millis(1);

// ─── Background noise traffic ────────────────────────────────────

/// Spawns `subjects` publisher/subscriber pairs that push unrelated
/// traffic through the fabric while the measurement runs, so latency
/// is sampled under contention rather than on an idle bus. Workers
/// check the `running` flag on each iteration and wind down when the
/// measured run completes.
pub fn spawn_noise<C: Connection + Clone>(
    conn: &C,
    subjects: u32,
    running: Arc<AtomicBool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(subjects as usize * 2);

    for i in 0..subjects {
        let subject = format!("noise.{i}");

        // Drain side: keeps broker-side delivery active per subject.
        if let Ok(mut sub) = conn.subscribe(&subject) {
            let running = running.clone();
            handles.push(tokio::spawn(async move {
                while running.load(Ordering::Relaxed) {
                    tokio::select! {
                        msg = sub.recv() => {
                            if msg.is_none() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(NOISE_PACE) => {}
                    }
                }
            }));
        }

        // Publish side, seeded per worker for reproducible payloads.
        let conn = conn.clone();
        let running = running.clone();
        handles.push(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(7000 + u64::from(i));
            let mut payload = vec![0u8; rng.gen_range(16..=256)];
            rng.fill_bytes(&mut payload);
            while running.load(Ordering::Relaxed) {
                if conn.publish(&subject, &payload).is_err() {
                    break;
                }
                tokio::time::sleep(NOISE_PACE).await;
            }
            debug!(subject = subject.as_str(), "noise publisher stopped");
        }));
    }

    handles
}

// ─── Tests ───────────────────────────────────────────────────────
