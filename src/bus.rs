use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

// ─── Collaborator boundary ───────────────────────────────────────
//
// The benchmark engine never talks to a concrete messaging client;
// it only sees this trait. Deliveries arrive as values on a channel
// owned by the `Subscription`, so the collector is an ordinary
// consumer task rather than a callback buried in client internals.

#[derive(Debug, Error)]
pub enum BusError {
    #[error("broker is no longer reachable")]
    ConnectionClosed,
}

/// One message as delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub payload: Vec<u8>,
}

/// A client connection to one logical broker node.
pub trait Connection: Send + Sync + 'static {
    /// Logical identity of the node this connection landed on.
    /// Two connections with the same id share a routing table
    /// instantaneously; different ids may need route propagation.
    fn server_id(&self) -> &str;

    fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), BusError>;

    fn subscribe(&self, subject: &str) -> Result<Subscription, BusError>;

    /// Blocking round-trip confirmation that all prior operations
    /// have reached the node.
    fn flush(&self) -> Result<(), BusError>;
}

/// Returns a unique inbox-style subject for one run or probe.
pub fn new_inbox() -> String {
    format!("_inbox.{}", Uuid::new_v4().simple())
}

// ─── Subscription ────────────────────────────────────────────────

/// Handle to an active subject subscription. Dropping it (or calling
/// `unsubscribe`) removes broker-side interest so no subscription
/// state leaks past the component that created it.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Message>,
    core: Arc<RoutingCore>,
    subject: String,
    id: u64,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Non-blocking poll, used by the readiness probe.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut table = self.core.subscriptions.lock();
        if let Some(entries) = table.get_mut(&self.subject) {
            entries.retain(|(id, _)| *id != self.id);
            if entries.is_empty() {
                table.remove(&self.subject);
            }
        }
    }
}

// ─── In-process loopback broker ──────────────────────────────────

/// Shared routing table. A single core backs either one standalone
/// node or every node of a simulated cluster.
struct RoutingCore {
    subscriptions: Mutex<HashMap<String, Vec<(u64, mpsc::UnboundedSender<Message>)>>>,
    next_sub_id: AtomicU64,
}

impl RoutingCore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            subscriptions: Mutex::new(HashMap::new()),
            next_sub_id: AtomicU64::new(1),
        })
    }
}

/// Loopback messaging fabric living entirely inside the process.
/// Stands in for a real broker deployment when exercising the
/// measurement engine end to end.
pub struct InProcessBroker {
    core: Arc<RoutingCore>,
    server_id: String,
}

impl InProcessBroker {
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            core: RoutingCore::new(),
            server_id: server_id.into(),
        }
    }

    /// Two nodes with distinct identities sharing one routing core —
    /// the clustered topology the readiness probe exists for.
    pub fn cluster_pair() -> (Self, Self) {
        let core = RoutingCore::new();
        let a = Self {
            core: core.clone(),
            server_id: format!("node-a-{}", Uuid::new_v4().simple()),
        };
        let b = Self {
            core,
            server_id: format!("node-b-{}", Uuid::new_v4().simple()),
        };
        (a, b)
    }

    pub fn connect(&self) -> InProcessConnection {
        InProcessConnection {
            inner: Arc::new(ConnInner {
                core: self.core.clone(),
                server_id: self.server_id.clone(),
                published: AtomicU64::new(0),
            }),
        }
    }
}

struct ConnInner {
    core: Arc<RoutingCore>,
    server_id: String,
    published: AtomicU64,
}

/// Cheaply cloneable — every clone shares the same underlying node
/// attachment, mirroring how real client handles behave.
#[derive(Clone)]
pub struct InProcessConnection {
    inner: Arc<ConnInner>,
}

impl InProcessConnection {
    /// Total messages published through this connection (all clones).
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }
}

impl Connection for InProcessConnection {
    fn server_id(&self) -> &str {
        &self.inner.server_id
    }

    fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), BusError> {
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        let table = self.inner.core.subscriptions.lock();
        if let Some(entries) = table.get(subject) {
            for (_, tx) in entries {
                // A closed receiver means the subscriber went away
                // mid-delivery; interest is pruned on Subscription drop.
                let _ = tx.send(Message {
                    subject: subject.to_owned(),
                    payload: payload.to_vec(),
                });
            }
        }
        Ok(())
    }

    fn subscribe(&self, subject: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.core.next_sub_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .core
            .subscriptions
            .lock()
            .entry(subject.to_owned())
            .or_default()
            .push((id, tx));
        Ok(Subscription {
            rx,
            core: self.inner.core.clone(),
            subject: subject.to_owned(),
            id,
        })
    }

    fn flush(&self) -> Result<(), BusError> {
        // Loopback delivery is synchronous; nothing is in flight.
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_matching_subscriber() {
        let broker = InProcessBroker::new("solo");
        let conn = broker.connect();
        let mut sub = conn.subscribe("orders").unwrap();

        conn.publish("orders", b"hello").unwrap();
        conn.publish("other", b"nope").unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.subject, "orders");
        assert_eq!(msg.payload, b"hello");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn unsubscribe_removes_interest() {
        let broker = InProcessBroker::new("solo");
        let conn = broker.connect();
        let sub = conn.subscribe("orders").unwrap();
        sub.unsubscribe();

        conn.publish("orders", b"dropped").unwrap();
        assert!(conn
            .inner
            .core
            .subscriptions
            .lock()
            .get("orders")
            .is_none());
    }

    #[tokio::test]
    async fn cluster_pair_shares_routes_with_distinct_ids() {
        let (a, b) = InProcessBroker::cluster_pair();
        let pub_conn = a.connect();
        let sub_conn = b.connect();
        assert_ne!(pub_conn.server_id(), sub_conn.server_id());

        let mut sub = sub_conn.subscribe("cross").unwrap();
        pub_conn.publish("cross", b"x").unwrap();
        assert!(sub.recv().await.is_some());
    }

    #[tokio::test]
    async fn publish_counter_tracks_sends() {
        let broker = InProcessBroker::new("solo");
        let conn = broker.connect();
        assert_eq!(conn.published_count(), 0);
        conn.publish("a", b"").unwrap();
        conn.publish("b", b"").unwrap();
        assert_eq!(conn.published_count(), 2);
    }
}
