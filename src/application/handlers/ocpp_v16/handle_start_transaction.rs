//! StartTransaction handler

use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde_json::Value;
use tracing::info;

use crate::application::handlers::{parse_request, to_payload, HandlerContext, HandlerFuture};
use crate::domain::NewTransaction;

const ACTION: &str = "StartTransaction";

pub fn handle_start_transaction(ctx: &HandlerContext, payload: Value) -> HandlerFuture<'_> {
    Box::pin(async move {
        let req: StartTransactionRequest = parse_request(ACTION, payload)?;

        let transaction = ctx
            .repos
            .transactions()
            .start(NewTransaction {
                charge_point_id: ctx.charge_point_id.clone(),
                connector_id: req.connector_id,
                id_tag: req.id_tag.clone(),
                meter_start: req.meter_start,
                started_at: req.timestamp,
            })
            .await?;

        info!(
            charge_point_id = ctx.charge_point_id.as_str(),
            connector_id = req.connector_id,
            id_tag = req.id_tag.as_str(),
            meter_start = req.meter_start,
            transaction_id = transaction.id,
            "StartTransaction"
        );

        to_payload(&StartTransactionResponse {
            transaction_id: transaction.id,
            id_tag_info: IdTagInfo {
                status: AuthorizationStatus::Accepted,
                expiry_date: None,
                parent_id_tag: None,
            },
        })
    })
}
