//! Charging station domain entity

use chrono::{DateTime, Duration, Utc};

use crate::domain::ocpp::OcppVersion;

/// Connector status as reported by the station.
///
/// The station is authoritative: any reported value is recorded, no transition
/// graph is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectorStatus {
    #[default]
    Available,
    Preparing,
    Charging,
    SuspendedEV,
    SuspendedEVSE,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
}

impl ConnectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Preparing => "Preparing",
            Self::Charging => "Charging",
            Self::SuspendedEV => "SuspendedEV",
            Self::SuspendedEVSE => "SuspendedEVSE",
            Self::Finishing => "Finishing",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
            Self::Faulted => "Faulted",
        }
    }
}

impl std::fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status report applied to a connector (or to the station for connector 0).
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: ConnectorStatus,
    pub error_code: String,
    pub info: Option<String>,
    pub vendor_id: Option<String>,
    pub vendor_error_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Connector on a charging station
#[derive(Debug, Clone, PartialEq)]
pub struct Connector {
    /// 1-based connector id
    pub id: u32,
    pub status: ConnectorStatus,
    pub error_code: Option<String>,
    pub info: Option<String>,
    pub vendor_id: Option<String>,
    pub vendor_error_code: Option<String>,
    /// Open transaction bound to this connector
    pub current_transaction_id: Option<i32>,
    pub current_tag_id: Option<String>,
    pub status_last_changed_on: Option<DateTime<Utc>>,
}

impl Connector {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            status: ConnectorStatus::default(),
            error_code: None,
            info: None,
            vendor_id: None,
            vendor_error_code: None,
            current_transaction_id: None,
            current_tag_id: None,
            status_last_changed_on: None,
        }
    }

    fn apply(&mut self, report: &StatusReport) {
        self.status = report.status;
        self.error_code = Some(report.error_code.clone());
        self.info = report.info.clone();
        self.vendor_id = report.vendor_id.clone();
        self.vendor_error_code = report.vendor_error_code.clone();
        self.status_last_changed_on = Some(report.timestamp);
    }

    pub fn bind_transaction(&mut self, transaction_id: i32, id_tag: &str) {
        self.current_transaction_id = Some(transaction_id);
        self.current_tag_id = Some(id_tag.to_string());
    }

    /// Clear the binding if it still points at `transaction_id`.
    pub fn release_transaction(&mut self, transaction_id: i32) -> bool {
        if self.current_transaction_id == Some(transaction_id) {
            self.current_transaction_id = None;
            self.current_tag_id = None;
            true
        } else {
            false
        }
    }
}

/// Identification reported by BootNotification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationInfo {
    pub vendor: String,
    pub model: String,
    pub charge_point_serial_number: Option<String>,
    pub charge_box_serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub iccid: Option<String>,
    pub imsi: Option<String>,
    pub meter_type: Option<String>,
    pub meter_serial_number: Option<String>,
}

/// Charging station entity
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingStation {
    /// Charge box identity (from the connection URL)
    pub id: String,
    pub tenant_id: String,
    /// Protocol version of the latest connection
    pub ocpp_version: Option<OcppVersion>,
    pub info: StationInfo,
    /// Remote address of the latest connection
    pub endpoint: Option<String>,
    pub connectors: Vec<Connector>,
    /// Station-wide status (StatusNotification on connector 0)
    pub status: Option<ConnectorStatus>,
    pub error_code: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Soft-deleted by an administrator; the station is rejected at boot
    pub deleted: bool,
}

impl ChargingStation {
    pub fn new(tenant_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            ocpp_version: None,
            info: StationInfo::default(),
            endpoint: None,
            connectors: Vec::new(),
            status: None,
            error_code: None,
            registered_at: Utc::now(),
            last_heartbeat: None,
            deleted: false,
        }
    }

    /// Record a heartbeat. `last_heartbeat` never moves backwards and two
    /// consecutive heartbeats always produce distinct timestamps.
    pub fn record_heartbeat(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let next = match self.last_heartbeat {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        self.last_heartbeat = Some(next);
        next
    }

    pub fn connector(&self, connector_id: u32) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.id == connector_id)
    }

    pub fn connector_mut(&mut self, connector_id: u32) -> Option<&mut Connector> {
        self.connectors.iter_mut().find(|c| c.id == connector_id)
    }

    /// Get the connector, creating it on first sight. Connectors stay sorted by id.
    pub fn connector_entry(&mut self, connector_id: u32) -> &mut Connector {
        let pos = match self.connectors.binary_search_by_key(&connector_id, |c| c.id) {
            Ok(pos) => pos,
            Err(pos) => {
                self.connectors.insert(pos, Connector::new(connector_id));
                pos
            }
        };
        &mut self.connectors[pos]
    }

    /// Apply a StatusNotification. Connector 0 addresses the whole station.
    pub fn apply_status(&mut self, connector_id: u32, report: &StatusReport) {
        if connector_id == 0 {
            self.status = Some(report.status);
            self.error_code = Some(report.error_code.clone());
        } else {
            self.connector_entry(connector_id).apply(report);
        }
    }

    /// Connectors that currently have an open transaction.
    pub fn active_connectors(&self) -> impl Iterator<Item = &Connector> {
        self.connectors
            .iter()
            .filter(|c| c.current_transaction_id.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: ConnectorStatus) -> StatusReport {
        StatusReport {
            status,
            error_code: "NoError".into(),
            info: None,
            vendor_id: None,
            vendor_error_code: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn heartbeat_is_strictly_increasing() {
        let mut station = ChargingStation::new("t1", "CB1");
        let now = Utc::now();
        let first = station.record_heartbeat(now);
        let second = station.record_heartbeat(now);
        let third = station.record_heartbeat(now - Duration::seconds(10));
        assert!(second > first);
        assert!(third > second);
    }

    #[test]
    fn connectors_are_created_in_order() {
        let mut station = ChargingStation::new("t1", "CB1");
        station.apply_status(2, &report(ConnectorStatus::Charging));
        station.apply_status(1, &report(ConnectorStatus::Available));
        let ids: Vec<u32> = station.connectors.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(station.connector(2).unwrap().status, ConnectorStatus::Charging);
    }

    #[test]
    fn connector_zero_updates_station_status() {
        let mut station = ChargingStation::new("t1", "CB1");
        station.apply_status(0, &report(ConnectorStatus::Unavailable));
        assert!(station.connectors.is_empty());
        assert_eq!(station.status, Some(ConnectorStatus::Unavailable));
    }

    #[test]
    fn release_only_matching_transaction() {
        let mut connector = Connector::new(1);
        connector.bind_transaction(7, "TAG");
        assert!(!connector.release_transaction(8));
        assert_eq!(connector.current_transaction_id, Some(7));
        assert!(connector.release_transaction(7));
        assert_eq!(connector.current_tag_id, None);
    }
}
