//! Domain layer: entities, errors and collaborator ports

pub mod charge_point;
pub mod error;
pub mod ocpp;
pub mod ports;
pub mod transaction;

pub use charge_point::{ChargingStation, Connector, ConnectorStatus, StationInfo, StatusReport};
pub use error::{DomainError, DomainResult};
pub use ocpp::OcppVersion;
pub use ports::{
    Authorization, DataTransferRecord, IdTagStatus, LockManager, LockToken, PricingProvider,
    Storage, TenantResolver,
};
pub use transaction::{
    MeterReading, MeterValuesRecord, Transaction, TransactionCost, TransactionStatus,
    TransactionStop,
};
