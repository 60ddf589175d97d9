//! Request correlator — matches outbound Calls with their responses
//!
//! Every pending request lives in one `DashMap` keyed by
//! `(ConnectionId, unique id)`. Whoever removes the entry first (response,
//! timeout, connection closure or the caller dropping its future) decides the
//! outcome, so each request completes exactly once.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::session::{ConnectionHandle, ConnectionId};
use crate::shared::ocpp_frame::OcppFrame;

use super::CommandError;

type PendingKey = (ConnectionId, String);

struct PendingRequest {
    action: String,
    created_at: Instant,
    response_sender: oneshot::Sender<Result<Value, CommandError>>,
}

impl PendingRequest {
    fn complete(self, result: Result<Value, CommandError>) {
        // The receiver is gone only if the caller stopped waiting.
        let _ = self.response_sender.send(result);
    }
}

/// Correlates outbound Calls with CallResult/CallError frames.
pub struct RequestCorrelator {
    pending: DashMap<PendingKey, PendingRequest>,
}

/// Removes the pending entry when the awaiting future is dropped early.
struct PendingGuard<'a> {
    pending: &'a DashMap<PendingKey, PendingRequest>,
    key: PendingKey,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.key);
    }
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Store a pending request under a fresh id unique for the connection.
    fn insert_pending(
        &self,
        connection: ConnectionId,
        action: &str,
        sender: oneshot::Sender<Result<Value, CommandError>>,
    ) -> String {
        let mut sender = Some(sender);
        loop {
            let message_id = Uuid::new_v4().to_string();
            if let Entry::Vacant(entry) = self.pending.entry((connection, message_id.clone())) {
                if let Some(response_sender) = sender.take() {
                    entry.insert(PendingRequest {
                        action: action.to_string(),
                        created_at: Instant::now(),
                        response_sender,
                    });
                }
                return message_id;
            }
        }
    }

    /// Send a Call to the connection and wait for the first of response,
    /// timeout or connection closure.
    pub async fn send(
        &self,
        handle: &ConnectionHandle,
        action: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, CommandError> {
        let charge_point_id = handle.identity().charge_box_id.as_str();
        let (tx, mut rx) = oneshot::channel();
        let message_id = self.insert_pending(handle.id(), action, tx);
        let guard = PendingGuard {
            pending: &self.pending,
            key: (handle.id(), message_id.clone()),
        };

        // A closure that raced the insertion has already rejected, or will
        // never see, this entry.
        if handle.is_closed() {
            return self.fail_or_collect(&guard.key, rx, CommandError::ConnectionClosed).await;
        }

        let frame = OcppFrame::Call {
            unique_id: message_id.clone(),
            action: action.to_string(),
            payload,
        };
        info!(
            charge_point_id,
            action,
            message_id = message_id.as_str(),
            "Sending command to charge point"
        );
        if handle.transmit(frame.encode()).is_err() {
            return self.fail_or_collect(&guard.key, rx, CommandError::ConnectionClosed).await;
        }

        let waited = tokio::time::timeout(timeout, &mut rx).await;
        let result = match waited {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CommandError::ConnectionClosed),
            Err(_) => {
                let timeout_error = CommandError::Timeout {
                    action: action.to_string(),
                    timeout,
                };
                self.fail_or_collect(&guard.key, rx, timeout_error).await
            }
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(CommandError::Timeout { .. }) => "timeout",
            Err(CommandError::ConnectionClosed) => "closed",
            Err(_) => "error",
        };
        metrics::counter!(
            "ocpp_outbound_calls_total",
            "action" => action.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        result
    }

    /// Take the entry and fail with `error`; if it is already gone, another
    /// party resolved it and its value is on the way.
    async fn fail_or_collect(
        &self,
        key: &PendingKey,
        rx: oneshot::Receiver<Result<Value, CommandError>>,
        error: CommandError,
    ) -> Result<Value, CommandError> {
        match self.pending.remove(key) {
            Some(_) => {
                if let CommandError::Timeout { action, timeout } = &error {
                    warn!(
                        message_id = key.1.as_str(),
                        action = action.as_str(),
                        timeout_ms = timeout.as_millis() as u64,
                        "Command timed out"
                    );
                }
                Err(error)
            }
            None => rx.await.unwrap_or(Err(CommandError::ConnectionClosed)),
        }
    }

    /// Route a CallResult or CallError received on `handle`.
    ///
    /// Returns `false` when no request was waiting for it.
    pub fn resolve(&self, handle: &ConnectionHandle, frame: OcppFrame) -> bool {
        let (unique_id, result) = match frame {
            OcppFrame::CallResult { unique_id, payload } => (unique_id, Ok(payload)),
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => (
                unique_id,
                Err(CommandError::CallError {
                    code: error_code,
                    description: error_description,
                    details: error_details,
                }),
            ),
            OcppFrame::Call { .. } => return false,
        };

        let key = (handle.id(), unique_id);
        match self.pending.remove(&key) {
            Some((_, request)) => {
                debug!(
                    charge_point_id = handle.identity().charge_box_id.as_str(),
                    message_id = key.1.as_str(),
                    action = request.action.as_str(),
                    elapsed_ms = request.created_at.elapsed().as_millis() as u64,
                    "Response matched pending request"
                );
                request.complete(result);
                true
            }
            None => {
                warn!(
                    charge_point_id = handle.identity().charge_box_id.as_str(),
                    message_id = key.1.as_str(),
                    "Received response for unknown or expired request"
                );
                false
            }
        }
    }

    /// Reject every pending request of a closed connection.
    pub fn reject_connection(&self, connection: ConnectionId) -> usize {
        let keys: Vec<PendingKey> = self
            .pending
            .iter()
            .filter(|entry| entry.key().0 == connection)
            .map(|entry| entry.key().clone())
            .collect();

        keys.into_iter()
            .filter_map(|key| self.pending.remove(&key))
            .map(|(_, request)| request.complete(Err(CommandError::ConnectionClosed)))
            .count()
    }

    /// Number of outstanding requests across all connections
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────
