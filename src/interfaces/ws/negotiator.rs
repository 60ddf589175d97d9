//! OCPP protocol version negotiation
//!
//! The URL announces the protocol version and the station must offer the
//! matching WebSocket subprotocol (`ocpp1.6` for `/OCPP16/...`). Anything else
//! is refused with HTTP 400 before the upgrade completes.

use thiserror::Error;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};

use crate::domain::OcppVersion;

use super::path::ConnectionPath;

/// Handshake rejection reason
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("Malformed connection path: {0}")]
    InvalidPath(String),

    #[error("Missing Sec-WebSocket-Protocol, expected {expected}")]
    MissingSubprotocol { expected: &'static str },

    #[error("Subprotocol mismatch: expected {expected}, offered {offered}")]
    SubprotocolMismatch {
        expected: &'static str,
        offered: String,
    },

    #[error("{0} is not enabled")]
    UnsupportedVersion(OcppVersion),
}

impl HandshakeError {
    /// HTTP 400 response sent instead of the upgrade.
    pub fn to_response(&self) -> ErrorResponse {
        let mut response = ErrorResponse::new(Some(self.to_string()));
        *response.status_mut() = StatusCode::BAD_REQUEST;
        response
    }
}

/// Negotiates the OCPP version during the WebSocket handshake.
#[derive(Debug, Clone)]
pub struct ProtocolNegotiator {
    supported_versions: Vec<OcppVersion>,
}

impl ProtocolNegotiator {
    pub fn new(supported_versions: Vec<OcppVersion>) -> Self {
        Self { supported_versions }
    }

    pub fn supported_versions(&self) -> &[OcppVersion] {
        &self.supported_versions
    }

    /// Check the offered subprotocols against the version in the URL.
    pub fn negotiate(
        &self,
        version: OcppVersion,
        offered: Option<&str>,
    ) -> Result<OcppVersion, HandshakeError> {
        if !self.supported_versions.contains(&version) {
            return Err(HandshakeError::UnsupportedVersion(version));
        }

        let expected = version.subprotocol();
        let offered = match offered.map(str::trim) {
            Some(o) if !o.is_empty() => o,
            _ => return Err(HandshakeError::MissingSubprotocol { expected }),
        };

        if offered.split(',').map(str::trim).any(|p| p == expected) {
            Ok(version)
        } else {
            Err(HandshakeError::SubprotocolMismatch {
                expected,
                offered: offered.to_string(),
            })
        }
    }

    /// Validate a handshake request and select the subprotocol on the response.
    pub fn accept(
        &self,
        request: &Request,
        mut response: Response,
    ) -> Result<(ConnectionPath, Response), HandshakeError> {
        let path = ConnectionPath::parse(request.uri().path())?;
        let offered = request
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok());
        let version = self.negotiate(path.version, offered)?;

        response.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(version.subprotocol()),
        );
        Ok((path, response))
    }
}

impl Default for ProtocolNegotiator {
    fn default() -> Self {
        Self::new(OcppVersion::ALL.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str, protocols: Option<&str>) -> Request {
        let mut builder = Request::builder().uri(format!("ws://localhost:9000{path}"));
        if let Some(p) = protocols {
            builder = builder.header(SEC_WEBSOCKET_PROTOCOL, p);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn negotiate_matching_subprotocol() {
        let negotiator = ProtocolNegotiator::default();
        assert_eq!(
            negotiator.negotiate(OcppVersion::V16, Some("ocpp1.5, ocpp1.6")),
            Ok(OcppVersion::V16)
        );
        assert_eq!(
            negotiator.negotiate(OcppVersion::V15, Some("ocpp1.5")),
            Ok(OcppVersion::V15)
        );
    }

    #[test]
    fn negotiate_rejects_mismatch_and_missing() {
        let negotiator = ProtocolNegotiator::default();
        assert!(matches!(
            negotiator.negotiate(OcppVersion::V16, Some("ocpp1.5")),
            Err(HandshakeError::SubprotocolMismatch { expected: "ocpp1.6", .. })
        ));
        assert_eq!(
            negotiator.negotiate(OcppVersion::V16, None),
            Err(HandshakeError::MissingSubprotocol { expected: "ocpp1.6" })
        );
        assert_eq!(
            negotiator.negotiate(OcppVersion::V16, Some("  ")),
            Err(HandshakeError::MissingSubprotocol { expected: "ocpp1.6" })
        );
    }

    #[test]
    fn negotiate_respects_enabled_versions() {
        let negotiator = ProtocolNegotiator::new(vec![OcppVersion::V16]);
        assert_eq!(
            negotiator.negotiate(OcppVersion::V15, Some("ocpp1.5")),
            Err(HandshakeError::UnsupportedVersion(OcppVersion::V15))
        );
    }

    #[test]
    fn accept_sets_selected_subprotocol() {
        let negotiator = ProtocolNegotiator::default();
        let (path, response) = negotiator
            .accept(&request("/OCPP16/acme/CB1", Some("ocpp1.6")), Response::new(()))
            .unwrap();

        assert_eq!(path.charge_box_id, "CB1");
        assert_eq!(path.tenant.as_deref(), Some("acme"));
        assert_eq!(
            response.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "ocpp1.6"
        );
    }

    #[test]
    fn rejection_is_bad_request() {
        let negotiator = ProtocolNegotiator::default();
        let err = negotiator
            .accept(&request("/nope", Some("ocpp1.6")), Response::new(()))
            .unwrap_err();
        assert_eq!(err.to_response().status(), StatusCode::BAD_REQUEST);
    }
}
