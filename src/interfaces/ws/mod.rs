//! Charge point WebSocket endpoint

pub mod negotiator;
pub mod ocpp_server;

pub use negotiator::{Negotiation, ProtocolNegotiator};
pub use ocpp_server::{charge_point_id_from_path, OcppServer};
