//! WebSocket interfaces
//!
//! - `ocpp_server`: OCPP-J WebSocket server (1.5 and 1.6)
//! - `negotiator`: subprotocol check during the handshake
//! - `path`: connection URL parsing

pub mod negotiator;
pub mod ocpp_server;
pub mod path;

pub use negotiator::{HandshakeError, ProtocolNegotiator};
pub use ocpp_server::OcppServer;
pub use path::ConnectionPath;
