//! BootNotification handler

use chrono::{SubsecRound, Utc};
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::types::RegistrationStatus;
use serde_json::Value;
use tracing::info;

use crate::application::handlers::{parse_request, to_payload, HandlerContext, HandlerFuture};

const ACTION: &str = "BootNotification";

/// Every charge point is accepted.
pub fn handle_boot_notification(ctx: &HandlerContext, payload: Value) -> HandlerFuture<'_> {
    Box::pin(async move {
        let req: BootNotificationRequest = parse_request(ACTION, payload)?;

        info!(
            charge_point_id = ctx.charge_point_id.as_str(),
            vendor = req.charge_point_vendor.as_str(),
            model = req.charge_point_model.as_str(),
            firmware = ?req.firmware_version,
            "BootNotification"
        );

        to_payload(&BootNotificationResponse {
            current_time: Utc::now().trunc_subsecs(0),
            interval: ctx.heartbeat_interval,
            status: RegistrationStatus::Accepted,
        })
    })
}
