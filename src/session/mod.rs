//! Session management - one task per charge point connection

pub mod connection;
pub mod registry;

pub use connection::{CloseReason, Session};
pub use registry::{
    SessionCommand, SessionHandle, SessionInfo, SessionRegistry, SharedSessionRegistry,
};
