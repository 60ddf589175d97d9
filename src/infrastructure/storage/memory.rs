//! In-memory storage implementation

use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::{
    ChargingStation, DataTransferRecord, DomainError, DomainResult, MeterValuesRecord, Storage,
    Transaction,
};

type StationKey = (String, String);

/// In-memory storage for development and testing
///
/// Everything is keyed by tenant, so two tenants may reuse the same charge
/// box ids and transaction ids.
pub struct InMemoryStorage {
    stations: DashMap<StationKey, ChargingStation>,
    transactions: DashMap<(String, i32), Transaction>,
    transaction_counters: DashMap<String, i32>,
    meter_values: Mutex<Vec<MeterValuesRecord>>,
    data_transfers: DashMap<StationKey, Vec<DataTransferRecord>>,
    diagnostics_status: DashMap<StationKey, String>,
    firmware_status: DashMap<StationKey, String>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            stations: DashMap::new(),
            transactions: DashMap::new(),
            transaction_counters: DashMap::new(),
            meter_values: Mutex::new(Vec::new()),
            data_transfers: DashMap::new(),
            diagnostics_status: DashMap::new(),
            firmware_status: DashMap::new(),
        }
    }

    fn key(tenant_id: &str, charge_box_id: &str) -> StationKey {
        (tenant_id.to_string(), charge_box_id.to_string())
    }

    fn meter_values_where(
        &self,
        keep: impl Fn(&MeterValuesRecord) -> bool,
    ) -> Vec<MeterValuesRecord> {
        match self.meter_values.lock() {
            Ok(records) => records.iter().filter(|r| keep(r)).cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Meter value records attached to a transaction, oldest first.
    pub fn meter_values_for_transaction(
        &self,
        tenant_id: &str,
        transaction_id: i32,
    ) -> Vec<MeterValuesRecord> {
        self.meter_values_where(|r| {
            r.tenant_id == tenant_id && r.transaction_id == Some(transaction_id)
        })
    }

    /// Meter value records reported for a connector, oldest first.
    pub fn meter_values_for_connector(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
        connector_id: u32,
    ) -> Vec<MeterValuesRecord> {
        self.meter_values_where(|r| {
            r.tenant_id == tenant_id
                && r.charge_box_id == charge_box_id
                && r.connector_id == connector_id
        })
    }

    pub fn data_transfers(&self, tenant_id: &str, charge_box_id: &str) -> Vec<DataTransferRecord> {
        self.data_transfers
            .get(&Self::key(tenant_id, charge_box_id))
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn diagnostics_status(&self, tenant_id: &str, charge_box_id: &str) -> Option<String> {
        self.diagnostics_status
            .get(&Self::key(tenant_id, charge_box_id))
            .map(|s| s.clone())
    }

    pub fn firmware_status(&self, tenant_id: &str, charge_box_id: &str) -> Option<String> {
        self.firmware_status
            .get(&Self::key(tenant_id, charge_box_id))
            .map(|s| s.clone())
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get_charging_station(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
    ) -> DomainResult<Option<ChargingStation>> {
        Ok(self
            .stations
            .get(&Self::key(tenant_id, charge_box_id))
            .map(|s| s.clone()))
    }

    async fn save_charging_station(&self, station: ChargingStation) -> DomainResult<()> {
        self.stations
            .insert(Self::key(&station.tenant_id, &station.id), station);
        Ok(())
    }

    async fn next_transaction_id(&self, tenant_id: &str) -> DomainResult<i32> {
        let mut counter = self
            .transaction_counters
            .entry(tenant_id.to_string())
            .or_insert(0);
        *counter = counter
            .checked_add(1)
            .ok_or_else(|| DomainError::Storage("transaction id space exhausted".into()))?;
        Ok(*counter)
    }

    async fn get_transaction(&self, tenant_id: &str, id: i32) -> DomainResult<Option<Transaction>> {
        Ok(self
            .transactions
            .get(&(tenant_id.to_string(), id))
            .map(|t| t.clone()))
    }

    async fn save_transaction(&self, transaction: Transaction) -> DomainResult<()> {
        self.transactions
            .insert((transaction.tenant_id.clone(), transaction.id), transaction);
        Ok(())
    }

    async fn append_meter_values(&self, record: MeterValuesRecord) -> DomainResult<()> {
        self.meter_values
            .lock()
            .map_err(|_| DomainError::Storage("meter value store poisoned".into()))?
            .push(record);
        Ok(())
    }

    async fn save_data_transfer(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
        record: DataTransferRecord,
    ) -> DomainResult<()> {
        self.data_transfers
            .entry(Self::key(tenant_id, charge_box_id))
            .or_default()
            .push(record);
        Ok(())
    }

    async fn save_diagnostics_status(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
        status: &str,
    ) -> DomainResult<()> {
        self.diagnostics_status
            .insert(Self::key(tenant_id, charge_box_id), status.to_string());
        Ok(())
    }

    async fn save_firmware_status(
        &self,
        tenant_id: &str,
        charge_box_id: &str,
        status: &str,
    ) -> DomainResult<()> {
        self.firmware_status
            .insert(Self::key(tenant_id, charge_box_id), status.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn transaction_ids_are_per_tenant() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.next_transaction_id("t1").await.unwrap(), 1);
        assert_eq!(storage.next_transaction_id("t1").await.unwrap(), 2);
        assert_eq!(storage.next_transaction_id("t2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stations_are_scoped_by_tenant() {
        let storage = InMemoryStorage::new();
        storage
            .save_charging_station(ChargingStation::new("t1", "CB1"))
            .await
            .unwrap();

        assert!(storage.get_charging_station("t1", "CB1").await.unwrap().is_some());
        assert!(storage.get_charging_station("t2", "CB1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transaction_save_overwrites() {
        let storage = InMemoryStorage::new();
        let mut tx = Transaction::new(5, "t1", "CB1", 1, "TAG", 0, Utc::now());
        storage.save_transaction(tx.clone()).await.unwrap();
        tx.last_meter_value = Some(300);
        storage.save_transaction(tx).await.unwrap();

        let stored = storage.get_transaction("t1", 5).await.unwrap().unwrap();
        assert_eq!(stored.last_meter_value, Some(300));
        assert!(storage.get_transaction("t2", 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn meter_values_filter_by_connector_and_transaction() {
        let storage = InMemoryStorage::new();
        for (connector_id, transaction_id) in [(1, Some(10)), (1, None), (2, Some(11))] {
            storage
                .append_meter_values(MeterValuesRecord {
                    tenant_id: "t1".into(),
                    charge_box_id: "CB1".into(),
                    connector_id,
                    transaction_id,
                    readings: Vec::new(),
                })
                .await
                .unwrap();
        }

        assert_eq!(storage.meter_values_for_connector("t1", "CB1", 1).len(), 2);
        assert_eq!(storage.meter_values_for_transaction("t1", 11).len(), 1);
        assert!(storage.meter_values_for_transaction("t2", 10).is_empty());
    }

    #[tokio::test]
    async fn best_effort_records_are_kept() {
        let storage = InMemoryStorage::new();
        storage
            .save_data_transfer(
                "t1",
                "CB1",
                DataTransferRecord {
                    vendor_id: "acme".into(),
                    message_id: Some("ping".into()),
                    data: None,
                },
            )
            .await
            .unwrap();
        storage.save_firmware_status("t1", "CB1", "Installed").await.unwrap();
        storage.save_diagnostics_status("t1", "CB1", "Uploaded").await.unwrap();

        assert_eq!(storage.data_transfers("t1", "CB1").len(), 1);
        assert_eq!(storage.firmware_status("t1", "CB1").as_deref(), Some("Installed"));
        assert_eq!(storage.diagnostics_status("t1", "CB1").as_deref(), Some("Uploaded"));
    }
}
