pub mod commands;
pub mod handlers;
pub mod services;
pub mod session;

// Re-export key types for convenience
pub use commands::{
    CommandError, OutboundAction, OutboundCommandClient, RequestCorrelator, ResetKind,
};
pub use handlers::{ActionDispatcher, CallContext, HandlerError};
pub use services::{ChargePointService, ConnectionSweeper, LifecycleSettings, StationCommandService};
pub use session::{
    ChargeBoxIdentity, ConnectionHandle, ConnectionRegistry, SharedConnectionRegistry,
};
