use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod bus;
mod config;
mod error;
mod load;
mod metrics;
mod probe;
mod rate;
mod report;
mod runner;
mod server;

use bus::{Connection, InProcessBroker};
use config::BenchConfig;
use error::BenchError;
use metrics::collector::{self, RollingWindow, SampleCollector};
use metrics::exposition::MetricsMap;
use metrics::RunClock;
use rate::ProportionalThrottle;
use report::{byte_size, fmt_duration, RollingReporter, RunTimings, REPORT_PERIOD};

/// Grace period after stopping the rolling reporter, so an in-flight
/// tick can finish before the terminal drain and sort.
const REPORTER_GRACE: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() {
    let cfg = BenchConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Single decision point for fatal errors: everything below
    // bubbles a BenchError here, and only here do we exit.
    if let Err(err) = cfg.validate() {
        error!("invalid configuration: {err}");
        std::process::exit(1);
    }

    let metrics = Arc::new(MetricsMap::new());

    {
        let cfg = cfg.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(err) = run_benchmark(cfg, metrics).await {
                error!("benchmark failed: {err}");
                std::process::exit(1);
            }
        });
    }

    // The exposition endpoint outlives the run, serving the final
    // snapshot until the operator stops the process.
    let app = server::create_router(metrics);
    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", cfg.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("could not bind port {}: {err}", cfg.port);
            std::process::exit(1);
        }
    };
    info!(
        "latency stats at http://localhost:{}/latency_stats",
        cfg.port
    );
    if let Err(err) = axum::serve(listener, app).await {
        error!("server exited: {err}");
        std::process::exit(1);
    }
}

// ─── Benchmark orchestration ─────────────────────────────────────

async fn run_benchmark(cfg: BenchConfig, metrics: Arc<MetricsMap>) -> Result<(), BenchError> {
    let process_start = Instant::now();

    let (pub_conn, sub_conn) = if cfg.cluster {
        let (a, b) = InProcessBroker::cluster_pair();
        (a.connect(), b.connect())
    } else {
        let broker = InProcessBroker::new("standalone");
        (broker.connect(), broker.connect())
    };

    // Quick RTT sanity check per node.
    let t = Instant::now();
    pub_conn.flush()?;
    info!("pub node rtt: {}", fmt_duration(t.elapsed()));
    let t = Instant::now();
    sub_conn.flush()?;
    info!("sub node rtt: {}", fmt_duration(t.elapsed()));

    // Unique run subject keeps parallel runs from crosstalk.
    let subject = bus::new_inbox();
    let sub = sub_conn.subscribe(&subject)?;
    // Interest goes through the subscribe-side connection; flush it
    // before publishing on the other one.
    sub_conn.flush()?;
    probe::wait_for_route(&pub_conn, &sub_conn).await?;

    let expected = cfg.expected_total();
    info!("message payload: {}", byte_size(cfg.msg_size as f64));
    info!("target duration: {}s", cfg.duration_secs);
    info!("target msgs/sec: {}", cfg.target_rate);
    info!(
        "target band/sec: {}",
        byte_size((cfg.target_rate * cfg.msg_size as u64 * 2) as f64)
    );

    let rolling = Arc::new(RollingWindow::new());
    let clock = RunClock::new();
    let collector = SampleCollector::new(expected, rolling.clone());
    let collect_handle = tokio::spawn(collector::consume(sub, collector, clock));

    let (stop_tx, stop_rx) = watch::channel(false);
    let reporter = RollingReporter::new(rolling, metrics);
    let reporter_handle = tokio::spawn(reporter.run(REPORT_PERIOD, stop_rx));

    let noise_running = Arc::new(AtomicBool::new(true));
    load::spawn_noise(&pub_conn, cfg.subjects, noise_running.clone());

    let pub_start = Instant::now();
    let mut throttle = ProportionalThrottle::new(cfg.target_rate);
    let publish_duration = runner::publish_all(
        &pub_conn,
        &subject,
        expected,
        cfg.msg_size,
        &mut throttle,
        clock,
    )
    .await?;

    // Completion gate: the consumer task returns the ledger once the
    // last expected message has been delivered.
    let ledger = collect_handle
        .await
        .map_err(|err| BenchError::CollectorFailed(err.to_string()))?;
    let end_to_end_duration = pub_start.elapsed();

    let _ = stop_tx.send(true);
    noise_running.store(false, Ordering::Relaxed);
    tokio::time::sleep(REPORTER_GRACE).await;
    let _ = reporter_handle.await;

    report::finalize(
        ledger,
        cfg.msg_size,
        cfg.hist_file.as_deref(),
        RunTimings {
            time_to_first_publish: pub_start.duration_since(process_start),
            publish_duration,
            end_to_end_duration,
        },
    )
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_run_completes_and_exports_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("out");
        let cfg = BenchConfig::parse_from([
            "pubsub-latency-bench",
            "--rate",
            "500",
            "--duration",
            "1",
            "--size",
            "16",
            "--subjects",
            "2",
            "--hist",
            base.to_str().unwrap(),
        ]);
        cfg.validate().unwrap();

        let metrics = Arc::new(MetricsMap::new());
        run_benchmark(cfg, metrics).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("out.raw")).unwrap();
        assert_eq!(raw.lines().count(), 500);
        assert!(dir.path().join("out.histogram").exists());
    }

    #[tokio::test]
    async fn clustered_run_passes_the_readiness_probe() {
        let cfg = BenchConfig::parse_from([
            "pubsub-latency-bench",
            "--rate",
            "200",
            "--duration",
            "1",
            "--cluster",
        ]);
        let metrics = Arc::new(MetricsMap::new());
        run_benchmark(cfg, metrics).await.unwrap();
    }
}
