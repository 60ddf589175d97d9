//! Connection URL parsing
//!
//! Stations connect to `/OCPP16/{tenant}/{chargeBoxId}` or, on single-tenant
//! deployments, `/OCPP16/{chargeBoxId}`. The version segment is `OCPP15` or
//! `OCPP16` (any case).

use crate::domain::OcppVersion;

use super::negotiator::HandshakeError;

/// Parsed connection URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionPath {
    pub version: OcppVersion,
    /// Tenant subdomain, `None` for the short form
    pub tenant: Option<String>,
    pub charge_box_id: String,
}

impl ConnectionPath {
    pub fn parse(path: &str) -> Result<Self, HandshakeError> {
        let invalid = || HandshakeError::InvalidPath(path.to_string());

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let (version, rest) = match segments.split_first() {
            Some((first, rest)) => (
                OcppVersion::from_path_segment(first).ok_or_else(invalid)?,
                rest,
            ),
            None => return Err(invalid()),
        };

        if rest.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }

        match rest {
            [charge_box_id] => Ok(Self {
                version,
                tenant: None,
                charge_box_id: charge_box_id.to_string(),
            }),
            [tenant, charge_box_id] => Ok(Self {
                version,
                tenant: Some(tenant.to_string()),
                charge_box_id: charge_box_id.to_string(),
            }),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_forms() {
        assert_eq!(
            ConnectionPath::parse("/OCPP16/acme/CB-001").unwrap(),
            ConnectionPath {
                version: OcppVersion::V16,
                tenant: Some("acme".into()),
                charge_box_id: "CB-001".into(),
            }
        );
        assert_eq!(
            ConnectionPath::parse("/ocpp15/CB-002").unwrap(),
            ConnectionPath {
                version: OcppVersion::V15,
                tenant: None,
                charge_box_id: "CB-002".into(),
            }
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        for path in [
            "/",
            "/OCPP16",
            "/OCPP16/",
            "/OCPP20/acme/CB1",
            "/ocpp/CB1",
            "/OCPP16/a/b/c",
            "/OCPP16//CB1",
            "/OCPP16/acme/CB1/",
        ] {
            assert!(
                matches!(ConnectionPath::parse(path), Err(HandshakeError::InvalidPath(_))),
                "{path} should be rejected"
            );
        }
    }
}
