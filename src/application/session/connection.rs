//! WebSocket connection abstraction
//!
//! A [`ConnectionHandle`] is the only way the rest of the engine reaches a
//! station. It carries no socket: frames go through an outbox channel drained
//! by the transport's writer task, and a closed handle can never transmit
//! again, so handles kept by callers after an eviction are harmless.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{mpsc, watch};

use crate::domain::OcppVersion;

/// Tenant-scoped station identity, unique per live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChargeBoxIdentity {
    pub tenant_id: String,
    pub charge_box_id: String,
}

impl ChargeBoxIdentity {
    pub fn new(tenant_id: impl Into<String>, charge_box_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            charge_box_id: charge_box_id.into(),
        }
    }
}

impl fmt::Display for ChargeBoxIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.charge_box_id)
    }
}

/// Registry-allocated connection number. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why the engine closed a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The transport ended (peer closed, I/O error)
    TransportClosed,
    /// A newer connection registered the same identity
    Superseded,
    /// No traffic for longer than the stale threshold
    Stale,
    /// Server shutdown
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransportClosed => "transport closed",
            Self::Superseded => "superseded by a new connection",
            Self::Stale => "connection idle",
            Self::Shutdown => "server shutting down",
        }
    }
}

/// Item queued for the transport's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(String),
    Close(CloseReason),
}

/// Sending half of a connection's outbox, handed over by the transport.
pub type Transport = mpsc::UnboundedSender<Outbound>;

/// Error returned when writing to a connection that is already closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionClosed;

struct ConnectionInner {
    id: ConnectionId,
    identity: ChargeBoxIdentity,
    version: OcppVersion,
    remote_addr: Option<SocketAddr>,
    connected_at: DateTime<Utc>,
    /// Milliseconds since epoch
    last_seen: AtomicI64,
    outbox: Transport,
    closed: watch::Sender<bool>,
}

/// Opaque, cloneable reference to a live (or formerly live) connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<ConnectionInner>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        id: ConnectionId,
        identity: ChargeBoxIdentity,
        version: OcppVersion,
        remote_addr: Option<SocketAddr>,
        outbox: Transport,
    ) -> Self {
        let now = Utc::now();
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                identity,
                version,
                remote_addr,
                connected_at: now,
                last_seen: AtomicI64::new(now.timestamp_millis()),
                outbox,
                closed,
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn identity(&self) -> &ChargeBoxIdentity {
        &self.inner.identity
    }

    pub fn version(&self) -> OcppVersion {
        self.inner.version
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.inner.connected_at
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        let millis = self.inner.last_seen.load(Ordering::Relaxed);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(self.inner.connected_at)
    }

    /// Update last activity timestamp
    pub fn touch(&self) {
        self.inner
            .last_seen
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Check if the connection has been idle longer than `max_idle`
    pub fn is_stale(&self, max_idle: chrono::Duration) -> bool {
        Utc::now().signed_duration_since(self.last_seen()) > max_idle
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Queue a text frame for the station.
    pub fn transmit(&self, frame: String) -> Result<(), ConnectionClosed> {
        if self.is_closed() {
            return Err(ConnectionClosed);
        }
        self.inner
            .outbox
            .send(Outbound::Frame(frame))
            .map_err(|_| ConnectionClosed)
    }

    /// Mark the connection closed and ask the transport to close the socket.
    ///
    /// Returns `true` for the call that actually closed it.
    pub(crate) fn close(&self, reason: CloseReason) -> bool {
        let first = self.inner.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });
        if first {
            // The writer may already be gone; nothing left to tell it then.
            let _ = self.inner.outbox.send(Outbound::Close(reason));
        }
        first
    }

    /// Resolves once the connection has been closed by the engine.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("identity", &self.inner.identity)
            .field("version", &self.inner.version)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(
            ConnectionId(1),
            ChargeBoxIdentity::new("tenant", "CP001"),
            OcppVersion::V16,
            None,
            tx,
        );
        (handle, rx)
    }

    #[test]
    fn new_connection_fields() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.identity().charge_box_id, "CP001");
        assert_eq!(conn.identity().to_string(), "tenant/CP001");
        assert_eq!(conn.version(), OcppVersion::V16);
        assert!(conn.connected_at() <= Utc::now());
        assert!(!conn.is_closed());
    }

    #[test]
    fn transmit_delivers_frame() {
        let (conn, mut rx) = make_connection();
        conn.transmit("hello".into()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Outbound::Frame("hello".into()));
    }

    #[test]
    fn transmit_to_dropped_transport_fails() {
        let (conn, rx) = make_connection();
        drop(rx);
        assert_eq!(conn.transmit("msg".into()), Err(ConnectionClosed));
    }

    #[test]
    fn close_is_single_fire_and_blocks_transmit() {
        let (conn, mut rx) = make_connection();
        assert!(conn.close(CloseReason::Superseded));
        assert!(!conn.close(CloseReason::Shutdown));
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Close(CloseReason::Superseded)
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(conn.transmit("late".into()), Err(ConnectionClosed));
    }

    #[tokio::test]
    async fn closed_future_resolves() {
        let (conn, _rx) = make_connection();
        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.closed().await })
        };
        conn.close(CloseReason::TransportClosed);
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn staleness_follows_last_seen() {
        let (conn, _rx) = make_connection();
        conn.inner.last_seen.store(
            (Utc::now() - chrono::Duration::seconds(10)).timestamp_millis(),
            Ordering::Relaxed,
        );
        assert!(conn.is_stale(chrono::Duration::seconds(5)));
        conn.touch();
        assert!(!conn.is_stale(chrono::Duration::seconds(5)));
    }
}
