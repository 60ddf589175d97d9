pub mod connection;
pub mod registry;

pub use connection::{
    ChargeBoxIdentity, CloseReason, ConnectionClosed, ConnectionHandle, ConnectionId, Outbound,
    Transport,
};
pub use registry::{ConnectionRegistry, SharedConnectionRegistry};
