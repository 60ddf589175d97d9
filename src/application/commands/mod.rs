//! Central System → Charge Point commands
//!
//! ```text
//! caller ──► OutboundCommandClient ──► ConnectionRegistry::lookup
//!                    │
//!             typed rust_ocpp request
//!                    │
//!                    ▼
//!            RequestCorrelator::send ──► outbox ──► station
//!                    ▲
//!   read loop ───────┘ resolve(CallResult | CallError)
//! ```

pub mod client;
pub mod correlator;

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::application::session::ChargeBoxIdentity;

pub use client::{OutboundAction, OutboundCommandClient, ResetKind};
pub use correlator::RequestCorrelator;

/// Outbound command failure
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Charge point not connected: {0}")]
    NotConnected(ChargeBoxIdentity),

    #[error("{action} timed out after {timeout:?}")]
    Timeout { action: String, timeout: Duration },

    #[error("Connection closed before a response arrived")]
    ConnectionClosed,

    #[error("CallError {code}: {description}")]
    CallError {
        code: String,
        description: String,
        details: Value,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to serialize request: {0}")]
    Serialization(String),
}
