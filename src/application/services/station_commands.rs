//! Connector-exclusive commands
//!
//! Remote start and reservations change what a connector is doing, so two
//! of them must not race on the same connector. This facade takes a named
//! lock from the [`LockManager`] for the duration of the outbound call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_ocpp::v1_6::messages::remote_start_transaction::RemoteStartTransactionResponse;
use rust_ocpp::v1_6::messages::reserve_now::ReserveNowResponse;
use thiserror::Error;
use tracing::warn;

use crate::application::commands::{CommandError, OutboundCommandClient};
use crate::application::session::ChargeBoxIdentity;
use crate::domain::{DomainError, LockManager};

/// Extra lock lifetime on top of the call timeout
const LOCK_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StationCommandError {
    #[error("Connector {connector_id} of {target} is busy")]
    Busy {
        target: ChargeBoxIdentity,
        connector_id: u32,
    },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Lock error: {0}")]
    Lock(DomainError),
}

pub struct StationCommandService {
    client: OutboundCommandClient,
    locks: Arc<dyn LockManager>,
}

impl StationCommandService {
    pub fn new(client: OutboundCommandClient, locks: Arc<dyn LockManager>) -> Self {
        Self { client, locks }
    }

    pub fn client(&self) -> &OutboundCommandClient {
        &self.client
    }

    fn lock_name(target: &ChargeBoxIdentity, connector_id: u32) -> String {
        format!(
            "connector:{}:{}:{}",
            target.tenant_id, target.charge_box_id, connector_id
        )
    }

    async fn exclusive<T, F, Fut>(
        &self,
        target: &ChargeBoxIdentity,
        connector_id: u32,
        operation: F,
    ) -> Result<T, StationCommandError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, CommandError>>,
    {
        let name = Self::lock_name(target, connector_id);
        let token = match self.locks.acquire(&name, self.client.timeout() + LOCK_MARGIN).await {
            Ok(token) => token,
            Err(DomainError::LockUnavailable(_)) => {
                return Err(StationCommandError::Busy {
                    target: target.clone(),
                    connector_id,
                })
            }
            Err(e) => return Err(StationCommandError::Lock(e)),
        };

        let result = operation().await;

        if let Err(e) = self.locks.release(&token).await {
            warn!(lock = name.as_str(), error = %e, "Failed to release connector lock");
        }
        result.map_err(StationCommandError::from)
    }

    pub async fn remote_start(
        &self,
        target: &ChargeBoxIdentity,
        connector_id: u32,
        id_tag: &str,
    ) -> Result<RemoteStartTransactionResponse, StationCommandError> {
        self.exclusive(target, connector_id, || {
            self.client
                .remote_start_transaction(target, id_tag, Some(connector_id))
        })
        .await
    }

    pub async fn reserve(
        &self,
        target: &ChargeBoxIdentity,
        reservation_id: i32,
        connector_id: u32,
        id_tag: &str,
        expiry_date: DateTime<Utc>,
    ) -> Result<ReserveNowResponse, StationCommandError> {
        self.exclusive(target, connector_id, || {
            self.client
                .reserve_now(target, reservation_id, connector_id, id_tag, None, expiry_date)
        })
        .await
    }
}
