//! # OCPP Central
//!
//! OCPP 1.6-J central system core: accepts charge point WebSocket
//! connections, answers their Calls and sends server-initiated commands.
//!
//! ## Architecture
//!
//! - **support**: OCPP-J frame codec, shutdown signal
//! - **domain**: authorization records, transactions and their store traits
//! - **infrastructure**: in-memory stores
//! - **application**: action handlers, the action router, remote commands
//! - **session**: per-connection session task and the identity registry
//! - **interfaces**: OCPP WebSocket listener and REST API
//! - **server**: runtime wiring and lifecycle

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod session;
pub mod support;

pub use config::{default_config_path, AppConfig};
pub use server::{init_tracing, ServerHandle, ServerOptions};
