//! MeterValues handler

use rust_ocpp::v1_6::messages::meter_values::MeterValuesRequest;
use rust_ocpp::v1_6::types::MeterValue;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::application::handlers::{parse_request, to_payload, HandlerContext, HandlerFuture};

const ACTION: &str = "MeterValues";

/// Acknowledgement echoing the reported readings back.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MeterValuesAcknowledgement {
    connector_id: u32,
    meter_value: Vec<MeterValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_id: Option<i32>,
}

/// No check against open transactions is made here.
pub fn handle_meter_values(ctx: &HandlerContext, payload: Value) -> HandlerFuture<'_> {
    Box::pin(async move {
        let req: MeterValuesRequest = parse_request(ACTION, payload)?;

        info!(
            charge_point_id = ctx.charge_point_id.as_str(),
            connector_id = req.connector_id,
            transaction_id = ?req.transaction_id,
            samples = req.meter_value.len(),
            "MeterValues"
        );

        to_payload(&MeterValuesAcknowledgement {
            connector_id: req.connector_id,
            meter_value: req.meter_value,
            transaction_id: req.transaction_id,
        })
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::handlers::test_support::{context, repos_with};

    #[tokio::test]
    async fn echoes_inputs() {
        let ctx = context(repos_with(vec![]));

        let response = handle_meter_values(
            &ctx,
            json!({
                "connectorId": 2,
                "transactionId": 1111,
                "meterValue": [{
                    "timestamp": "2024-01-01T00:00:00Z",
                    "sampledValue": [{"value": "1500"}]
                }]
            }),
        )
        .await
        .unwrap();

        assert_eq!(response["connectorId"], 2);
        assert_eq!(response["transactionId"], 1111);
        assert_eq!(response["meterValue"][0]["sampledValue"][0]["value"], "1500");
    }
}
