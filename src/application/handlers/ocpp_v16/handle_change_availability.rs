//! ChangeAvailability handler

use rust_ocpp::v1_6::messages::change_availability::{
    ChangeAvailabilityRequest, ChangeAvailabilityResponse,
};
use rust_ocpp::v1_6::types::AvailabilityStatus;
use serde_json::Value;
use tracing::info;

use crate::application::handlers::{parse_request, to_payload, HandlerContext, HandlerFuture};

const ACTION: &str = "ChangeAvailability";

/// Connector availability is not modelled; the request is accepted as is.
pub fn handle_change_availability(ctx: &HandlerContext, payload: Value) -> HandlerFuture<'_> {
    Box::pin(async move {
        let req: ChangeAvailabilityRequest = parse_request(ACTION, payload)?;

        info!(
            charge_point_id = ctx.charge_point_id.as_str(),
            connector_id = req.connector_id,
            kind = ?req.kind,
            "ChangeAvailability"
        );

        to_payload(&ChangeAvailabilityResponse {
            status: AvailabilityStatus::Accepted,
        })
    })
}
