//! Charging station lifecycle service
//!
//! Holds the business rules behind the inbound OCPP actions. Handlers
//! translate wire types into the inputs below and back; everything that
//! touches Storage, Authorization or Pricing happens here.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::application::session::ChargeBoxIdentity;
use crate::domain::{
    Authorization, ChargingStation, DataTransferRecord, DomainError, DomainResult, IdTagStatus,
    MeterReading, MeterValuesRecord, OcppVersion, PricingProvider, StationInfo, StatusReport,
    Storage, Transaction, TransactionStop,
};

/// Tunables of the lifecycle rules
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Heartbeat interval sent in BootNotification responses (seconds)
    pub heartbeat_interval: i32,
    /// Reassign MeterValues sent on connector 0 to the connector of the
    /// referenced (or single) active transaction. Some firmwares report
    /// everything on connector 0.
    pub reassign_connector_zero_meter_values: bool,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: 300,
            reassign_connector_zero_meter_values: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BootOutcome {
    pub accepted: bool,
    pub current_time: DateTime<Utc>,
    pub interval: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartTransactionInput {
    pub connector_id: u32,
    pub id_tag: String,
    pub meter_start: i32,
    pub timestamp: DateTime<Utc>,
    pub reservation_id: Option<i32>,
}

/// `transaction_id` is 0 when the start was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOutcome {
    pub transaction_id: i32,
    pub status: IdTagStatus,
}

impl StartOutcome {
    fn refused(status: IdTagStatus) -> Self {
        Self {
            transaction_id: 0,
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopTransactionInput {
    pub transaction_id: i32,
    pub meter_stop: i32,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
    pub id_tag: Option<String>,
    /// Readings from `transactionData`
    pub readings: Vec<MeterReading>,
}

/// Station lifecycle rules over the collaborator ports
pub struct ChargePointService {
    storage: Arc<dyn Storage>,
    authorization: Arc<dyn Authorization>,
    pricing: Arc<dyn PricingProvider>,
    settings: LifecycleSettings,
}

impl ChargePointService {
    pub fn new(
        storage: Arc<dyn Storage>,
        authorization: Arc<dyn Authorization>,
        pricing: Arc<dyn PricingProvider>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            storage,
            authorization,
            pricing,
            settings,
        }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    async fn load_station(
        &self,
        identity: &ChargeBoxIdentity,
    ) -> DomainResult<Option<ChargingStation>> {
        self.storage
            .get_charging_station(&identity.tenant_id, &identity.charge_box_id)
            .await
    }

    // ── Boot / heartbeat / status ──────────────────────────────

    /// Register the station on first boot, refresh its identification on
    /// every later one.
    pub async fn boot(
        &self,
        identity: &ChargeBoxIdentity,
        version: OcppVersion,
        remote_addr: Option<SocketAddr>,
        info: StationInfo,
    ) -> DomainResult<BootOutcome> {
        let now = Utc::now();
        let mut station = match self.load_station(identity).await? {
            Some(station) => station,
            None => {
                info!(
                    tenant_id = identity.tenant_id.as_str(),
                    charge_point_id = identity.charge_box_id.as_str(),
                    "Registering new charging station"
                );
                ChargingStation::new(&identity.tenant_id, &identity.charge_box_id)
            }
        };

        station.info = info;
        station.ocpp_version = Some(version);
        station.endpoint = remote_addr.map(|addr| addr.to_string());
        station.record_heartbeat(now);
        let accepted = !station.deleted;
        if !accepted {
            warn!(
                charge_point_id = identity.charge_box_id.as_str(),
                "Rejecting boot of deleted charging station"
            );
        }
        self.storage.save_charging_station(station).await?;

        Ok(BootOutcome {
            accepted,
            current_time: now,
            interval: self.settings.heartbeat_interval,
        })
    }

    /// Record a heartbeat and return the server time.
    pub async fn heartbeat(&self, identity: &ChargeBoxIdentity) -> DomainResult<DateTime<Utc>> {
        let now = Utc::now();
        match self.load_station(identity).await? {
            Some(mut station) => {
                station.record_heartbeat(now);
                self.storage.save_charging_station(station).await?;
            }
            None => warn!(
                charge_point_id = identity.charge_box_id.as_str(),
                "Heartbeat from unknown charging station"
            ),
        }
        Ok(now)
    }

    /// Apply a StatusNotification. Connector 0 is the station itself.
    pub async fn update_status(
        &self,
        identity: &ChargeBoxIdentity,
        connector_id: u32,
        report: StatusReport,
    ) -> DomainResult<()> {
        let Some(mut station) = self.load_station(identity).await? else {
            warn!(
                charge_point_id = identity.charge_box_id.as_str(),
                connector_id,
                "StatusNotification from unknown charging station"
            );
            return Ok(());
        };
        station.apply_status(connector_id, &report);
        self.storage.save_charging_station(station).await
    }

    // ── Authorization ──────────────────────────────────────────

    /// Ask the Authorization collaborator. Failures count as `Invalid`.
    pub async fn authorize(&self, identity: &ChargeBoxIdentity, id_tag: &str) -> IdTagStatus {
        match self
            .authorization
            .authorize(&identity.tenant_id, &identity.charge_box_id, id_tag)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                error!(
                    charge_point_id = identity.charge_box_id.as_str(),
                    id_tag,
                    error = %e,
                    "Authorization lookup failed"
                );
                IdTagStatus::Invalid
            }
        }
    }

    // ── Transactions ───────────────────────────────────────────

    pub async fn start_transaction(
        &self,
        identity: &ChargeBoxIdentity,
        input: StartTransactionInput,
    ) -> DomainResult<StartOutcome> {
        let Some(mut station) = self.load_station(identity).await? else {
            warn!(
                charge_point_id = identity.charge_box_id.as_str(),
                "StartTransaction from unknown charging station"
            );
            return Ok(StartOutcome::refused(IdTagStatus::Invalid));
        };
        let connector_id = input.connector_id;
        let Some(connector) = station.connector(connector_id) else {
            warn!(
                charge_point_id = identity.charge_box_id.as_str(),
                connector_id,
                "StartTransaction on unknown connector"
            );
            return Ok(StartOutcome::refused(IdTagStatus::Invalid));
        };
        let stale_transaction = connector.current_transaction_id;

        let status = self.authorize(identity, &input.id_tag).await;
        if !status.is_accepted() {
            return Ok(StartOutcome::refused(status));
        }

        if let Some(stale_id) = stale_transaction {
            self.close_stale_transaction(identity, stale_id, input.timestamp)
                .await?;
        }

        let transaction_id = self.storage.next_transaction_id(&identity.tenant_id).await?;
        let mut transaction = Transaction::new(
            transaction_id,
            &identity.tenant_id,
            &identity.charge_box_id,
            connector_id,
            &input.id_tag,
            input.meter_start,
            input.timestamp,
        );
        transaction.reservation_id = input.reservation_id;
        self.storage.save_transaction(transaction).await?;

        station
            .connector_entry(connector_id)
            .bind_transaction(transaction_id, &input.id_tag);
        self.storage.save_charging_station(station).await?;

        info!(
            charge_point_id = identity.charge_box_id.as_str(),
            connector_id,
            transaction_id,
            "Transaction started"
        );
        Ok(StartOutcome {
            transaction_id,
            status,
        })
    }

    /// A connector still bound to an open transaction missed its
    /// StopTransaction; close it at the last known meter value.
    async fn close_stale_transaction(
        &self,
        identity: &ChargeBoxIdentity,
        transaction_id: i32,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let Some(mut stale) = self
            .storage
            .get_transaction(&identity.tenant_id, transaction_id)
            .await?
        else {
            return Ok(());
        };
        if !stale.is_active() {
            return Ok(());
        }

        warn!(
            charge_point_id = identity.charge_box_id.as_str(),
            transaction_id,
            "Closing stale transaction still bound to connector"
        );
        let meter_stop = stale.last_meter_value.unwrap_or(stale.meter_start);
        stale.stop(TransactionStop {
            meter_stop,
            timestamp: at.max(stale.start_timestamp),
            reason: Some("Other".to_string()),
            id_tag: None,
        })?;
        self.storage.save_transaction(stale).await
    }

    /// Close a transaction. Unknown, foreign or already stopped transactions
    /// yield `Invalid` without error; inconsistent meter or time values are a
    /// `Validation` error.
    pub async fn stop_transaction(
        &self,
        identity: &ChargeBoxIdentity,
        input: StopTransactionInput,
    ) -> DomainResult<IdTagStatus> {
        let transaction_id = input.transaction_id;
        let found = self
            .storage
            .get_transaction(&identity.tenant_id, transaction_id)
            .await?
            .filter(|tx| tx.charge_box_id == identity.charge_box_id);

        let Some(mut transaction) = found else {
            warn!(
                charge_point_id = identity.charge_box_id.as_str(),
                transaction_id,
                "StopTransaction for unknown transaction"
            );
            return Ok(IdTagStatus::Invalid);
        };
        if !transaction.is_active() {
            warn!(
                charge_point_id = identity.charge_box_id.as_str(),
                transaction_id,
                "StopTransaction for already stopped transaction"
            );
            return Ok(IdTagStatus::Invalid);
        }
        if input.meter_stop < transaction.meter_start {
            return Err(DomainError::Validation(format!(
                "meterStop {} is below meterStart {}",
                input.meter_stop, transaction.meter_start
            )));
        }
        if input.timestamp < transaction.start_timestamp {
            return Err(DomainError::Validation(format!(
                "stop timestamp {} precedes start {}",
                input.timestamp, transaction.start_timestamp
            )));
        }

        if !input.readings.is_empty() {
            self.storage
                .append_meter_values(MeterValuesRecord {
                    tenant_id: identity.tenant_id.clone(),
                    charge_box_id: identity.charge_box_id.clone(),
                    connector_id: transaction.connector_id,
                    transaction_id: Some(transaction_id),
                    readings: input.readings,
                })
                .await?;
        }

        let status = match input.id_tag.as_deref() {
            Some(tag) => self.authorize(identity, tag).await,
            None => IdTagStatus::Accepted,
        };

        transaction.stop(TransactionStop {
            meter_stop: input.meter_stop,
            timestamp: input.timestamp,
            reason: input.reason,
            id_tag: input.id_tag,
        })?;

        match self.pricing.price(&transaction).await {
            Ok(cost) => transaction.cost = cost,
            Err(e) => error!(
                charge_point_id = identity.charge_box_id.as_str(),
                transaction_id,
                error = %e,
                "Failed to price transaction"
            ),
        }

        let connector_id = transaction.connector_id;
        let consumed_wh = transaction.consumption_wh();
        self.storage.save_transaction(transaction).await?;

        if let Some(mut station) = self.load_station(identity).await? {
            let released = station
                .connector_mut(connector_id)
                .map(|c| c.release_transaction(transaction_id))
                .unwrap_or(false);
            if released {
                self.storage.save_charging_station(station).await?;
            }
        }

        info!(
            charge_point_id = identity.charge_box_id.as_str(),
            transaction_id,
            connector_id,
            consumed_wh,
            "Transaction stopped"
        );
        Ok(status)
    }

    // ── Meter values ───────────────────────────────────────────

    pub async fn record_meter_values(
        &self,
        identity: &ChargeBoxIdentity,
        connector_id: u32,
        transaction_id: Option<i32>,
        readings: Vec<MeterReading>,
    ) -> DomainResult<()> {
        let (connector_id, transaction_id) = if connector_id == 0
            && self.settings.reassign_connector_zero_meter_values
        {
            match self.active_connector_for(identity, transaction_id).await? {
                Some((resolved, active_transaction)) => {
                    info!(
                        charge_point_id = identity.charge_box_id.as_str(),
                        connector_id = resolved,
                        transaction_id = ?active_transaction,
                        "Reassigned connector 0 meter values"
                    );
                    (resolved, transaction_id.or(active_transaction))
                }
                None => (0, transaction_id),
            }
        } else {
            (connector_id, transaction_id)
        };

        if let Some(id) = transaction_id {
            self.update_last_meter_value(identity, id, &readings).await?;
        }

        self.storage
            .append_meter_values(MeterValuesRecord {
                tenant_id: identity.tenant_id.clone(),
                charge_box_id: identity.charge_box_id.clone(),
                connector_id,
                transaction_id,
                readings,
            })
            .await
    }

    /// Connector and open transaction of the referenced transaction, else of
    /// the station's only active connector.
    async fn active_connector_for(
        &self,
        identity: &ChargeBoxIdentity,
        transaction_id: Option<i32>,
    ) -> DomainResult<Option<(u32, Option<i32>)>> {
        if let Some(id) = transaction_id {
            let transaction = self
                .storage
                .get_transaction(&identity.tenant_id, id)
                .await?
                .filter(|tx| tx.charge_box_id == identity.charge_box_id);
            if let Some(tx) = transaction {
                return Ok(Some((tx.connector_id, Some(id))));
            }
        }

        let Some(station) = self.load_station(identity).await? else {
            return Ok(None);
        };
        let mut active = station.active_connectors();
        match (active.next(), active.next()) {
            (Some(only), None) => Ok(Some((only.id, only.current_transaction_id))),
            _ => Ok(None),
        }
    }

    async fn update_last_meter_value(
        &self,
        identity: &ChargeBoxIdentity,
        transaction_id: i32,
        readings: &[MeterReading],
    ) -> DomainResult<()> {
        let Some(latest_wh) = readings.iter().filter_map(MeterReading::energy_wh).last() else {
            return Ok(());
        };
        let transaction = self
            .storage
            .get_transaction(&identity.tenant_id, transaction_id)
            .await?
            .filter(|tx| tx.charge_box_id == identity.charge_box_id && tx.is_active());
        let Some(mut tx) = transaction else {
            return Ok(());
        };
        match Decimal::from_f64(latest_wh.round()).and_then(|wh| wh.to_i32()) {
            Some(wh) => {
                tx.last_meter_value = Some(wh);
                self.storage.save_transaction(tx).await?;
            }
            None => warn!(
                charge_point_id = identity.charge_box_id.as_str(),
                transaction_id,
                value = latest_wh,
                "Energy reading out of range, skipped"
            ),
        }
        Ok(())
    }

    // ── Best-effort notifications ──────────────────────────────

    pub async fn record_data_transfer(
        &self,
        identity: &ChargeBoxIdentity,
        record: DataTransferRecord,
    ) {
        if let Err(e) = self
            .storage
            .save_data_transfer(&identity.tenant_id, &identity.charge_box_id, record)
            .await
        {
            error!(
                charge_point_id = identity.charge_box_id.as_str(),
                error = %e,
                "Failed to store DataTransfer"
            );
        }
    }

    pub async fn record_diagnostics_status(&self, identity: &ChargeBoxIdentity, status: &str) {
        if let Err(e) = self
            .storage
            .save_diagnostics_status(&identity.tenant_id, &identity.charge_box_id, status)
            .await
        {
            error!(
                charge_point_id = identity.charge_box_id.as_str(),
                status,
                error = %e,
                "Failed to store diagnostics status"
            );
        }
    }

    pub async fn record_firmware_status(&self, identity: &ChargeBoxIdentity, status: &str) {
        if let Err(e) = self
            .storage
            .save_firmware_status(&identity.tenant_id, &identity.charge_box_id, status)
            .await
        {
            error!(
                charge_point_id = identity.charge_box_id.as_str(),
                status,
                error = %e,
                "Failed to store firmware status"
            );
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
