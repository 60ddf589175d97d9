//! Connection registry — the single source of truth for live stations

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::application::commands::RequestCorrelator;
use crate::domain::OcppVersion;

use super::connection::{
    ChargeBoxIdentity, CloseReason, ConnectionHandle, ConnectionId, Transport,
};

/// Thread-safe registry of live OCPP connections, at most one per identity.
pub struct ConnectionRegistry {
    connections: DashMap<ChargeBoxIdentity, ConnectionHandle>,
    correlator: Arc<RequestCorrelator>,
    next_id: AtomicU64,
}

/// Shared, reference-counted connection registry
pub type SharedConnectionRegistry = Arc<ConnectionRegistry>;

impl ConnectionRegistry {
    pub fn new(correlator: Arc<RequestCorrelator>) -> Self {
        Self {
            connections: DashMap::new(),
            correlator,
            next_id: AtomicU64::new(1),
        }
    }

    /// Wrap in `Arc` for shared ownership
    pub fn shared(correlator: Arc<RequestCorrelator>) -> SharedConnectionRegistry {
        Arc::new(Self::new(correlator))
    }

    pub fn correlator(&self) -> &Arc<RequestCorrelator> {
        &self.correlator
    }

    /// Register a new connection. A live connection with the same identity is
    /// closed and its pending requests rejected before the new one is stored.
    pub fn register(
        &self,
        identity: ChargeBoxIdentity,
        version: OcppVersion,
        remote_addr: Option<SocketAddr>,
        transport: Transport,
    ) -> ConnectionHandle {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle =
            ConnectionHandle::new(id, identity.clone(), version, remote_addr, transport);

        match self.connections.entry(identity) {
            Entry::Occupied(mut entry) => {
                let previous = entry.get().clone();
                warn!(
                    tenant_id = previous.identity().tenant_id.as_str(),
                    charge_point_id = previous.identity().charge_box_id.as_str(),
                    old_connection = %previous.id(),
                    new_connection = %id,
                    "Charge point reconnected, closing previous connection"
                );
                self.retire(&previous, CloseReason::Superseded);
                entry.insert(handle.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(handle.clone());
                metrics::gauge!("ocpp_connections_active").increment(1.0);
            }
        }

        metrics::counter!("ocpp_connections_total").increment(1);
        info!(
            tenant_id = handle.identity().tenant_id.as_str(),
            charge_point_id = handle.identity().charge_box_id.as_str(),
            connection = %id,
            %version,
            "Registered charge point connection"
        );
        handle
    }

    /// Unregister a connection. Only removes the entry if it still belongs to
    /// `handle`; closing and rejecting are idempotent.
    pub fn unregister(&self, handle: &ConnectionHandle, reason: CloseReason) {
        let removed = self
            .connections
            .remove_if(handle.identity(), |_, current| current.id() == handle.id())
            .is_some();
        if removed {
            metrics::gauge!("ocpp_connections_active").decrement(1.0);
            info!(
                tenant_id = handle.identity().tenant_id.as_str(),
                charge_point_id = handle.identity().charge_box_id.as_str(),
                connection = %handle.id(),
                reason = reason.as_str(),
                "Unregistered charge point connection"
            );
        } else {
            debug!(
                charge_point_id = handle.identity().charge_box_id.as_str(),
                connection = %handle.id(),
                "Connection already superseded or removed"
            );
        }
        self.retire(handle, reason);
    }

    fn retire(&self, handle: &ConnectionHandle, reason: CloseReason) {
        handle.close(reason);
        let rejected = self.correlator.reject_connection(handle.id());
        if rejected > 0 {
            warn!(
                charge_point_id = handle.identity().charge_box_id.as_str(),
                connection = %handle.id(),
                rejected,
                "Rejected pending requests of closed connection"
            );
        }
    }

    /// Current live connection for an identity
    pub fn lookup(&self, identity: &ChargeBoxIdentity) -> Option<ConnectionHandle> {
        self.connections
            .get(identity)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed())
    }

    /// Update last activity for a connection
    pub fn touch(&self, handle: &ConnectionHandle) {
        handle.touch();
    }

    /// Check if a station is currently connected
    pub fn is_connected(&self, identity: &ChargeBoxIdentity) -> bool {
        self.lookup(identity).is_some()
    }

    /// Identities of all live connections
    pub fn connected(&self) -> Vec<ChargeBoxIdentity> {
        self.connections.iter().map(|r| r.key().clone()).collect()
    }

    /// Number of live connections
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Close and remove every connection (server shutdown).
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let handles: Vec<ConnectionHandle> =
            self.connections.iter().map(|r| r.value().clone()).collect();
        for handle in &handles {
            self.unregister(handle, reason);
        }
        handles.len()
    }

    /// Close connections idle for longer than `max_idle`. Returns the
    /// identities that were closed.
    pub fn sweep_stale(&self, max_idle: chrono::Duration) -> Vec<ChargeBoxIdentity> {
        let stale: Vec<ConnectionHandle> = self
            .connections
            .iter()
            .filter(|r| r.value().is_stale(max_idle))
            .map(|r| r.value().clone())
            .collect();

        stale
            .into_iter()
            .map(|handle| {
                warn!(
                    charge_point_id = handle.identity().charge_box_id.as_str(),
                    last_seen = %handle.last_seen(),
                    "Closing stale connection"
                );
                self.unregister(&handle, CloseReason::Stale);
                handle.identity().clone()
            })
            .collect()
    }
}

// ── Tests ──────────────────────────────────────────────────────
