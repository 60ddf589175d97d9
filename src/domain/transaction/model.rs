//! Transaction domain entity

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::error::{DomainError, DomainResult};

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Completed,
}

/// Stop sub-record written once when the transaction is closed
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionStop {
    pub meter_stop: i32,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
    /// Tag presented at stop, if any
    pub id_tag: Option<String>,
}

/// Cost computed by the pricing collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionCost {
    pub amount: Decimal,
    pub currency: String,
}

/// A single sampled value from MeterValues / transactionData
#[derive(Debug, Clone, PartialEq)]
pub struct MeterReading {
    pub timestamp: DateTime<Utc>,
    pub value: String,
    pub measurand: Option<String>,
    pub unit: Option<String>,
    pub context: Option<String>,
    pub phase: Option<String>,
    pub location: Option<String>,
}

impl MeterReading {
    /// Energy register reading normalized to Wh, if this sample is one.
    pub fn energy_wh(&self) -> Option<f64> {
        let measurand = self
            .measurand
            .as_deref()
            .unwrap_or("Energy.Active.Import.Register");
        if measurand != "Energy.Active.Import.Register" {
            return None;
        }
        let value: f64 = self.value.parse().ok()?;
        Some(match self.unit.as_deref() {
            Some("kWh") => value * 1000.0,
            _ => value,
        })
    }
}

/// Readings reported by one MeterValues message (or a StopTransaction's
/// transactionData), keyed by connector and transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterValuesRecord {
    pub tenant_id: String,
    pub charge_box_id: String,
    pub connector_id: u32,
    pub transaction_id: Option<i32>,
    pub readings: Vec<MeterReading>,
}

/// Charging transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: i32,
    pub tenant_id: String,
    pub charge_box_id: String,
    pub connector_id: u32,
    pub id_tag: String,
    /// Meter value at start (Wh)
    pub meter_start: i32,
    pub start_timestamp: DateTime<Utc>,
    pub reservation_id: Option<i32>,
    /// Last energy register value seen (Wh)
    pub last_meter_value: Option<i32>,
    pub stop: Option<TransactionStop>,
    pub cost: Option<TransactionCost>,
}

impl Transaction {
    pub fn new(
        id: i32,
        tenant_id: impl Into<String>,
        charge_box_id: impl Into<String>,
        connector_id: u32,
        id_tag: impl Into<String>,
        meter_start: i32,
        start_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id: tenant_id.into(),
            charge_box_id: charge_box_id.into(),
            connector_id,
            id_tag: id_tag.into(),
            meter_start,
            start_timestamp,
            reservation_id: None,
            last_meter_value: None,
            stop: None,
            cost: None,
        }
    }

    pub fn status(&self) -> TransactionStatus {
        if self.stop.is_some() {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.stop.is_none()
    }

    /// Close the transaction. A transaction can be stopped only once.
    pub fn stop(&mut self, stop: TransactionStop) -> DomainResult<()> {
        if self.stop.is_some() {
            return Err(DomainError::TransactionAlreadyStopped(self.id));
        }
        self.last_meter_value = Some(stop.meter_stop);
        self.stop = Some(stop);
        Ok(())
    }

    /// Energy delivered in Wh (stop meter, else latest reading, minus start).
    pub fn consumption_wh(&self) -> i32 {
        let end = self
            .stop
            .as_ref()
            .map(|s| s.meter_stop)
            .or(self.last_meter_value)
            .unwrap_or(self.meter_start);
        (end - self.meter_start).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx() -> Transaction {
        Transaction::new(1, "t1", "CB1", 1, "TAG", 1000, Utc::now())
    }

    fn stop(meter_stop: i32) -> TransactionStop {
        TransactionStop {
            meter_stop,
            timestamp: Utc::now(),
            reason: Some("Local".into()),
            id_tag: None,
        }
    }

    #[test]
    fn stops_only_once() {
        let mut tx = tx();
        assert_eq!(tx.status(), TransactionStatus::Active);
        tx.stop(stop(1500)).unwrap();
        assert_eq!(tx.status(), TransactionStatus::Completed);
        assert_eq!(
            tx.stop(stop(1600)),
            Err(DomainError::TransactionAlreadyStopped(1))
        );
        assert_eq!(tx.consumption_wh(), 500);
    }

    #[test]
    fn consumption_uses_last_reading_while_active() {
        let mut tx = tx();
        assert_eq!(tx.consumption_wh(), 0);
        tx.last_meter_value = Some(1250);
        assert_eq!(tx.consumption_wh(), 250);
    }

    #[test]
    fn energy_reading_normalizes_kwh() {
        let reading = MeterReading {
            timestamp: Utc::now(),
            value: "1.5".into(),
            measurand: None,
            unit: Some("kWh".into()),
            context: None,
            phase: None,
            location: None,
        };
        assert_eq!(reading.energy_wh(), Some(1500.0));

        let power = MeterReading {
            measurand: Some("Power.Active.Import".into()),
            ..reading
        };
        assert_eq!(power.energy_wh(), None);
    }
}
