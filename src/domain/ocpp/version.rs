//! OCPP protocol version
//!
//! A charge point announces the versions it speaks as WebSocket
//! sub-protocols. The handlers in this crate exchange OCPP 1.6 payloads, so
//! the negotiated sub-protocol has to be `ocpp1.6`; the other variants exist
//! to recognise (and refuse) what newer firmware offers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Known OCPP protocol versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OcppVersion {
    /// OCPP 1.6 (JSON / OCPP-J)
    V16,
    /// OCPP 2.0.1
    V201,
    /// OCPP 2.1
    V21,
}

impl OcppVersion {
    /// WebSocket subprotocol identifier for this OCPP version.
    pub fn subprotocol(&self) -> &'static str {
        match self {
            Self::V16 => "ocpp1.6",
            Self::V201 => "ocpp2.0.1",
            Self::V21 => "ocpp2.1",
        }
    }

    /// Parse an OCPP version from a WebSocket subprotocol string.
    pub fn from_subprotocol(s: &str) -> Option<Self> {
        match s.trim() {
            "ocpp1.6" => Some(Self::V16),
            "ocpp2.0.1" => Some(Self::V201),
            "ocpp2.1" => Some(Self::V21),
            _ => None,
        }
    }

    pub fn version_string(&self) -> &'static str {
        match self {
            Self::V16 => "1.6",
            Self::V201 => "2.0.1",
            Self::V21 => "2.1",
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
    fn subprotocol_names_round_trip() {
        for version in [OcppVersion::V16, OcppVersion::V201, OcppVersion::V21] {
            assert_eq!(OcppVersion::from_subprotocol(version.subprotocol()), Some(version));
        }
        assert_eq!(OcppVersion::from_subprotocol(" ocpp1.6 "), Some(OcppVersion::V16));
        assert_eq!(OcppVersion::from_subprotocol("ocpp1.5"), None);
    }
}
