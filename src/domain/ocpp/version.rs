//! OCPP protocol version
//!
//! Defines the OCPP-J versions this central system accepts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported OCPP protocol versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OcppVersion {
    /// OCPP 1.5 (JSON)
    V15,
    /// OCPP 1.6 (JSON / OCPP-J)
    V16,
}

impl OcppVersion {
    /// All supported OCPP versions, ordered from newest to oldest.
    pub const ALL: &'static [OcppVersion] = &[Self::V16, Self::V15];

    /// WebSocket subprotocol identifier for this OCPP version.
    ///
    /// Used in the `Sec-WebSocket-Protocol` header during handshake.
    pub fn subprotocol(&self) -> &'static str {
        match self {
            Self::V15 => "ocpp1.5",
            Self::V16 => "ocpp1.6",
        }
    }

    /// Parse an OCPP version from a WebSocket subprotocol string.
    pub fn from_subprotocol(s: &str) -> Option<Self> {
        match s.trim() {
            "ocpp1.5" => Some(Self::V15),
            "ocpp1.6" => Some(Self::V16),
            _ => None,
        }
    }

    /// URL path segment announcing the version, e.g. `OCPP16`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::V15 => "OCPP15",
            Self::V16 => "OCPP16",
        }
    }

    /// Parse the version from a URL path segment (case-insensitive).
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.path_segment().eq_ignore_ascii_case(segment))
    }

    /// Human-readable version string.
    pub fn version_string(&self) -> &'static str {
        match self {
            Self::V15 => "1.5",
            Self::V16 => "1.6",
        }
    }
}

impl fmt::Display for OcppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OCPP {}", self.version_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subprotocol_round_trip() {
        for v in OcppVersion::ALL {
            assert_eq!(OcppVersion::from_subprotocol(v.subprotocol()), Some(*v));
        }
        assert_eq!(OcppVersion::from_subprotocol("ocpp2.0.1"), None);
    }

    #[test]
    fn path_segment_is_case_insensitive() {
        assert_eq!(OcppVersion::from_path_segment("ocpp16"), Some(OcppVersion::V16));
        assert_eq!(OcppVersion::from_path_segment("OCPP15"), Some(OcppVersion::V15));
        assert_eq!(OcppVersion::from_path_segment("ocpp"), None);
    }
}
