//! OCPP sub-protocol negotiation
//!
//! During the WebSocket handshake the charge point lists the OCPP versions
//! it speaks in `Sec-WebSocket-Protocol`. The negotiator picks the first
//! supported version in server preference order.

use crate::domain::OcppVersion;

/// Outcome of negotiating one handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    /// A supported sub-protocol was offered; echo it back.
    Selected(OcppVersion),
    /// Nothing was offered; the default version is assumed and no
    /// sub-protocol header is sent back.
    Assumed(OcppVersion),
    /// Refuse the handshake.
    Rejected(String),
}

pub struct ProtocolNegotiator {
    /// Versions the central system speaks, most preferred first.
    supported_versions: Vec<OcppVersion>,
    require_subprotocol: bool,
}

impl ProtocolNegotiator {
    pub fn new(supported_versions: Vec<OcppVersion>, require_subprotocol: bool) -> Self {
        Self {
            supported_versions,
            require_subprotocol,
        }
    }

    /// The handlers in this crate speak OCPP 1.6 only.
    pub fn ocpp16(require_subprotocol: bool) -> Self {
        Self::new(vec![OcppVersion::V16], require_subprotocol)
    }

    /// Negotiate from the raw `Sec-WebSocket-Protocol` header value, if any.
    pub fn negotiate(&self, requested: Option<&str>) -> Negotiation {
        let offered: Vec<&str> = requested
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if offered.is_empty() {
            return match self.supported_versions.first() {
                Some(version) if !self.require_subprotocol => Negotiation::Assumed(*version),
                _ => Negotiation::Rejected("an OCPP sub-protocol is required".to_string()),
            };
        }

        self.supported_versions
            .iter()
            .find(|version| offered.contains(&version.subprotocol()))
            .map(|version| Negotiation::Selected(*version))
            .unwrap_or_else(|| {
                Negotiation::Rejected(format!(
                    "none of the offered sub-protocols ({}) is supported; expected {}",
                    offered.join(", "),
                    self.supported_subprotocols().join(", ")
                ))
            })
    }

    pub fn supported_subprotocols(&self) -> Vec<&'static str> {
        self.supported_versions
            .iter()
            .map(|v| v.subprotocol())
            .collect()
    }
}
