//! Application services

mod charge_point;
mod connection_sweeper;
mod station_commands;

pub use charge_point::{
    BootOutcome, ChargePointService, LifecycleSettings, StartOutcome, StartTransactionInput,
    StopTransactionInput,
};
pub use connection_sweeper::{ConnectionSweeper, SweeperConfig};
pub use station_commands::{StationCommandError, StationCommandService};
