use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::bus::{new_inbox, Connection};
use crate::error::BenchError;

/// How long we keep probing before declaring the cluster unreachable.
const ROUTE_TIMEOUT: Duration = Duration::from_secs(2);
/// Pause between probe publishes.
const PROBE_INTERVAL: Duration = Duration::from_millis(10);

/// Blocks until subject interest registered through `sub_conn` is
/// deliverable from `pub_conn`.
///
/// With a clustered broker the two connections may land on different
/// nodes, and a subscription set up on one node takes a moment to
/// propagate to the other; publishing before that happens silently
/// loses the first messages and the run would hang waiting for them.
/// A throwaway inbox subject is probed until a message makes it
/// across (so the real measurement subject is not skewed).
///
/// Identical server identities mean both connections share a routing
/// table and propagation is instantaneous; returns immediately
/// without publishing anything.
pub async fn wait_for_route<C: Connection>(
    pub_conn: &C,
    sub_conn: &C,
) -> Result<(), BenchError> {
    if pub_conn.server_id() == sub_conn.server_id() {
        return Ok(());
    }

    let subject = new_inbox();
    let mut sub = sub_conn.subscribe(&subject)?;
    sub_conn.flush()?;

    let started = Instant::now();
    loop {
        if sub.try_recv().is_some() {
            break;
        }
        if started.elapsed() > ROUTE_TIMEOUT {
            // Environment failure, not a transient: the route never
            // appeared, so the cluster is unreachable or misconfigured.
            sub.unsubscribe();
            return Err(BenchError::RouteUnavailable(ROUTE_TIMEOUT));
        }
        pub_conn.publish(&subject, &[])?;
        tokio::time::sleep(PROBE_INTERVAL).await;
    }

    debug!(elapsed = ?started.elapsed(), "route propagated");
    sub.unsubscribe();
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBroker;

    #[tokio::test]
    async fn same_server_returns_without_probing() {
        let broker = InProcessBroker::new("solo");
        let pub_conn = broker.connect();
        let sub_conn = broker.connect();

        wait_for_route(&pub_conn, &sub_conn).await.unwrap();
        assert_eq!(pub_conn.published_count(), 0);
    }

    #[tokio::test]
    async fn cluster_returns_after_first_delivery() {
        let (a, b) = InProcessBroker::cluster_pair();
        let pub_conn = a.connect();
        let sub_conn = b.connect();

        wait_for_route(&pub_conn, &sub_conn).await.unwrap();
        // Loopback routing delivers the very first probe.
        let published = pub_conn.published_count();
        assert!(published >= 1 && published <= 5, "published {published}");
    }

    #[tokio::test(start_paused = true)]
    async fn partitioned_cluster_fails_within_bound() {
        // Two unlinked brokers: probe publishes never reach the
        // subscriber, so the 2s bound has to trip.
        let a = InProcessBroker::new("node-a");
        let b = InProcessBroker::new("node-b");
        let pub_conn = a.connect();
        let sub_conn = b.connect();

        let err = wait_for_route(&pub_conn, &sub_conn).await.unwrap_err();
        assert!(matches!(err, BenchError::RouteUnavailable(_)));
        // One publish per 10ms tick over 2s, plus at most a straggler.
        let published = pub_conn.published_count();
        assert!(published >= 195 && published <= 205, "published {published}");
    }
}
