//! StopTransaction handler

use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
use rust_ocpp::v1_6::types::Reason;
use serde_json::Value;
use tracing::{info, warn};

use crate::application::handlers::{parse_request, to_payload, HandlerContext, HandlerFuture};
use crate::domain::{AuthorizationRecord, DomainError, StopTransaction};

const ACTION: &str = "StopTransaction";

/// A stop is always acknowledged, even for an unknown or already stopped
/// transaction; the charge point would otherwise keep retrying it.
pub fn handle_stop_transaction(ctx: &HandlerContext, payload: Value) -> HandlerFuture<'_> {
    Box::pin(async move {
        let req: StopTransactionRequest = parse_request(ACTION, payload)?;

        let stop = StopTransaction {
            meter_stop: req.meter_stop,
            stopped_at: req.timestamp,
            reason: req.reason.as_ref().and_then(reason_wire_name),
        };

        match ctx.repos.transactions().stop(req.transaction_id, stop).await {
            Ok(tx) => info!(
                charge_point_id = ctx.charge_point_id.as_str(),
                transaction_id = tx.id,
                meter_stop = req.meter_stop,
                energy_wh = ?tx.energy_consumed(),
                "StopTransaction"
            ),
            Err(e @ (DomainError::NotFound { .. } | DomainError::TransactionAlreadyStopped(_))) => {
                warn!(
                    charge_point_id = ctx.charge_point_id.as_str(),
                    transaction_id = req.transaction_id,
                    error = %e,
                    "StopTransaction acknowledged without a matching open transaction"
                )
            }
            Err(e) => return Err(e.into()),
        }

        let id_tag_info = match req.id_tag.as_deref() {
            Some(id_tag) => Some(
                ctx.repos
                    .id_tags()
                    .find_by_id_tag(id_tag)
                    .await?
                    .map(|record| record.id_tag_info())
                    .unwrap_or_else(AuthorizationRecord::unknown_id_tag_info),
            ),
            None => None,
        };

        to_payload(&StopTransactionResponse { id_tag_info })
    })
}

/// The OCPP wire string of a stop reason, e.g. `EVDisconnected`.
fn reason_wire_name(reason: &Reason) -> Option<String> {
    match serde_json::to_value(reason) {
        Ok(Value::String(name)) => Some(name),
        _ => None,
    }
}
