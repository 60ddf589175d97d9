//! Inbound OCPP message handlers

pub mod dispatcher;
mod ocpp_v16;

use std::net::SocketAddr;

use thiserror::Error;

use crate::application::session::{ChargeBoxIdentity, ConnectionHandle};
use crate::domain::{DomainError, OcppVersion};
use crate::shared::ocpp_frame::CallErrorCode;

pub use dispatcher::ActionDispatcher;

/// Connection facts every handler receives with its request
#[derive(Debug, Clone)]
pub struct CallContext {
    pub identity: ChargeBoxIdentity,
    pub version: OcppVersion,
    pub remote_addr: Option<SocketAddr>,
}

impl CallContext {
    pub fn charge_point_id(&self) -> &str {
        &self.identity.charge_box_id
    }
}

impl From<&ConnectionHandle> for CallContext {
    fn from(handle: &ConnectionHandle) -> Self {
        Self {
            identity: handle.identity().clone(),
            version: handle.version(),
            remote_addr: handle.remote_addr(),
        }
    }
}

/// Handler failure, answered with a CallError
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Action {0} is not implemented")]
    NotImplemented(String),

    #[error("{0}")]
    FormationViolation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn error_code(&self) -> CallErrorCode {
        match self {
            Self::NotImplemented(_) => CallErrorCode::NotImplemented,
            Self::FormationViolation(_) => CallErrorCode::FormationViolation,
            Self::Internal(_) => CallErrorCode::InternalError,
        }
    }
}

impl From<DomainError> for HandlerError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => Self::FormationViolation(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}
