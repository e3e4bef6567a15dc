//! Action routing
//!
//! An explicit table from action name to [`HandlerFn`]. Protocol actions and
//! vendor extensions are registered the same way; lookup is an exact,
//! case-sensitive match with no fallback.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use serde_json::Value;
use tracing::error;

use super::handlers::ocpp_v16::{
    handle_authorize, handle_boot_notification, handle_change_availability, handle_heartbeat,
    handle_meter_values, handle_start_transaction, handle_stop_transaction,
};
use super::handlers::{HandlerContext, HandlerError, HandlerFn, HandlerResult};

#[derive(Clone, Default)]
pub struct Router {
    routes: BTreeMap<&'static str, HandlerFn>,
}

impl Router {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The charge-point-initiated OCPP 1.6 actions this server answers.
    pub fn ocpp16() -> Self {
        Self::new()
            .route("Authorize", handle_authorize)
            .route("BootNotification", handle_boot_notification)
            .route("ChangeAvailability", handle_change_availability)
            .route("Heartbeat", handle_heartbeat)
            .route("MeterValues", handle_meter_values)
            .route("StartTransaction", handle_start_transaction)
            .route("StopTransaction", handle_stop_transaction)
    }

    /// Register `handler` under `action`, replacing any earlier entry.
    pub fn route(mut self, action: &'static str, handler: HandlerFn) -> Self {
        self.routes.insert(action, handler);
        self
    }

    pub fn get(&self, action: &str) -> Option<HandlerFn> {
        self.routes.get(action).copied()
    }

    pub fn contains(&self, action: &str) -> bool {
        self.routes.contains_key(action)
    }

    /// Label for per-action metrics: the registered name, or `"unknown"`
    /// so peer-chosen names never create new series.
    pub fn metric_label(&self, action: &str) -> &'static str {
        self.routes
            .get_key_value(action)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    /// Registered action names, sorted.
    pub fn actions(&self) -> Vec<&'static str> {
        self.routes.keys().copied().collect()
    }

    /// Look up and run the handler for `action`.
    ///
    /// A panicking handler is reported as [`HandlerError::Internal`] so it
    /// only costs the charge point one CallError.
    pub async fn dispatch(
        &self,
        ctx: &HandlerContext,
        action: &str,
        payload: Value,
    ) -> HandlerResult {
        let handler = self
            .get(action)
            .ok_or_else(|| HandlerError::NotImplemented(action.to_string()))?;

        match AssertUnwindSafe(handler(ctx, payload)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(&*panic);
                error!(
                    charge_point_id = ctx.charge_point_id.as_str(),
                    action,
                    reason = reason.as_str(),
                    "Handler panicked"
                );
                Err(HandlerError::Internal(reason))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
