pub mod model;

pub use model::{ChargingStation, Connector, ConnectorStatus, StationInfo, StatusReport};
