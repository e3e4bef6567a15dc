//! OCPP message handlers
//!
//! Every handler has the same shape, [`HandlerFn`]: it receives the
//! per-session [`HandlerContext`] and the raw JSON payload of a Call,
//! deserializes it into the action's typed request, and returns the typed
//! response serialized back to JSON. The [`Router`](super::router::Router)
//! maps action names to these functions.

pub mod ocpp_v16;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{DomainError, RepositoryProvider};
use crate::support::ocpp_frame::ErrorCode;

/// Everything a handler may touch while serving one charge point.
pub struct HandlerContext {
    pub charge_point_id: String,
    pub repos: Arc<dyn RepositoryProvider>,
    /// Interval handed out in BootNotification responses (seconds)
    pub heartbeat_interval: u32,
}

impl HandlerContext {
    pub fn new(
        charge_point_id: impl Into<String>,
        repos: Arc<dyn RepositoryProvider>,
        heartbeat_interval: u32,
    ) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            repos,
            heartbeat_interval,
        }
    }
}

/// Why a Call could not be answered with a CallResult.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Action '{0}' is not implemented")]
    NotImplemented(String),

    #[error("Invalid {action} payload: {reason}")]
    InvalidPayload {
        action: &'static str,
        reason: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] DomainError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// The OCPP-J error code reported to the charge point.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotImplemented(_) => ErrorCode::NotImplemented,
            Self::InvalidPayload { .. } => ErrorCode::FormationViolation,
            Self::Store(_) | Self::Internal(_) => ErrorCode::InternalError,
        }
    }
}

pub type HandlerResult = Result<Value, HandlerError>;
pub type HandlerFuture<'a> = BoxFuture<'a, HandlerResult>;
pub type HandlerFn = for<'a> fn(&'a HandlerContext, Value) -> HandlerFuture<'a>;

/// Deserialize a Call payload into the action's request type.
pub(crate) fn parse_request<T: DeserializeOwned>(
    action: &'static str,
    payload: Value,
) -> Result<T, HandlerError> {
    serde_json::from_value(payload).map_err(|e| HandlerError::InvalidPayload {
        action,
        reason: e.to_string(),
    })
}

/// Serialize a response type into a CallResult payload.
pub(crate) fn to_payload<T: Serialize>(response: &T) -> HandlerResult {
    serde_json::to_value(response).map_err(|e| HandlerError::Internal(e.to_string()))
}
