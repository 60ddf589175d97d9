//! Storage port
//!
//! Persistence is delegated to an implementation of [`Storage`]; the engine
//! never assumes a particular schema. Every key is scoped by tenant.

use async_trait::async_trait;

use crate::domain::charge_point::ChargingStation;
use crate::domain::error::DomainResult;
use crate::domain::transaction::{MeterValuesRecord, Transaction};

/// Vendor-specific payload received via DataTransfer
#[derive(Debug, Clone, PartialEq)]
pub struct DataTransferRecord {
    pub vendor_id: String,
    pub message_id: Option<String>,
    pub data: Option<String>,
}

#[async_trait]
pub trait Storage: Send + Sync {
    // Charging stations (connectors are stored inside the station)
    async fn get_charging_station(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
    ) -> DomainResult<Option<ChargingStation>>;
    async fn save_charging_station(&self, station: ChargingStation) -> DomainResult<()>;

    // Transactions
    async fn next_transaction_id(&self, tenant_id: &str) -> DomainResult<i32>;
    async fn get_transaction(&self, tenant_id: &str, id: i32) -> DomainResult<Option<Transaction>>;
    async fn save_transaction(&self, transaction: Transaction) -> DomainResult<()>;

    // Meter values timeline
    async fn append_meter_values(&self, record: MeterValuesRecord) -> DomainResult<()>;

    // Best-effort notifications
    async fn save_data_transfer(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
        record: DataTransferRecord,
    ) -> DomainResult<()>;
    async fn save_diagnostics_status(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
        status: &str,
    ) -> DomainResult<()>;
    async fn save_firmware_status(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
        status: &str,
    ) -> DomainResult<()>;
}
