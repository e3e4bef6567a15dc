//! Heartbeat handler

use chrono::{SubsecRound, Utc};
use rust_ocpp::v1_6::messages::heart_beat::HeartbeatResponse;
use serde_json::Value;
use tracing::debug;

use crate::application::handlers::{to_payload, HandlerContext, HandlerFuture};

/// Current server time, whole seconds, `YYYY-MM-DDTHH:MM:SSZ`.
pub fn handle_heartbeat(ctx: &HandlerContext, _payload: Value) -> HandlerFuture<'_> {
    Box::pin(async move {
        debug!(charge_point_id = ctx.charge_point_id.as_str(), "Heartbeat");

        to_payload(&HeartbeatResponse {
            current_time: Utc::now().trunc_subsecs(0),
        })
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;
    use serde_json::json;

    use super::*;
    use crate::application::handlers::test_support::{context, repos_with};

    #[tokio::test]
    async fn current_time_has_fixed_format() {
        let ctx = context(repos_with(vec![]));

        let response = handle_heartbeat(&ctx, json!({})).await.unwrap();
        let current_time = response["currentTime"].as_str().unwrap();

        assert_eq!(current_time.len(), "2017-03-08T14:22:27Z".len());
        assert!(current_time.ends_with('Z'));
        assert!(NaiveDateTime::parse_from_str(current_time, "%Y-%m-%dT%H:%M:%SZ").is_ok());
    }
}
