//! Authorize handler

use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use serde_json::Value;
use tracing::{info, warn};

use crate::application::handlers::{parse_request, to_payload, HandlerContext, HandlerFuture};
use crate::domain::AuthorizationRecord;

const ACTION: &str = "Authorize";

/// Look the tag up in the authorization store. Unknown tags are `Invalid`
/// with no expiry or parent.
pub fn handle_authorize(ctx: &HandlerContext, payload: Value) -> HandlerFuture<'_> {
    Box::pin(async move {
        let req: AuthorizeRequest = parse_request(ACTION, payload)?;

        let id_tag_info = match ctx.repos.id_tags().find_by_id_tag(&req.id_tag).await? {
            Some(record) => {
                info!(
                    charge_point_id = ctx.charge_point_id.as_str(),
                    id_tag = req.id_tag.as_str(),
                    status = %record.status,
                    "Authorize"
                );
                record.id_tag_info()
            }
            None => {
                warn!(
                    charge_point_id = ctx.charge_point_id.as_str(),
                    id_tag = req.id_tag.as_str(),
                    "Authorize: unknown id tag"
                );
                AuthorizationRecord::unknown_id_tag_info()
            }
        };

        to_payload(&AuthorizeResponse { id_tag_info })
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::application::handlers::test_support::{context, repos_with};
    use crate::application::handlers::HandlerError;
    use crate::domain::IdTagStatus;

    #[tokio::test]
    async fn known_tag_returns_full_record() {
        let record = AuthorizationRecord::new("TAG1", IdTagStatus::Accepted)
            .with_expiry(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
            .with_parent("PARENT1");
        let ctx = context(repos_with(vec![record]));

        let response = handle_authorize(&ctx, json!({"idTag": "TAG1"})).await.unwrap();
        assert_eq!(
            response["idTagInfo"],
            json!({
                "status": "Accepted",
                "expiryDate": "2030-01-01T00:00:00Z",
                "parentIdTag": "PARENT1"
            })
        );
    }

    #[tokio::test]
    async fn unknown_tag_is_invalid_without_other_fields() {
        let ctx = context(repos_with(vec![]));

        let response = handle_authorize(&ctx, json!({"idTag": "NOPE"})).await.unwrap();
        assert_eq!(response, json!({"idTagInfo": {"status": "Invalid"}}));
    }

    #[tokio::test]
    async fn blocked_tag_keeps_its_status() {
        let ctx = context(repos_with(vec![AuthorizationRecord::new(
            "TAG2",
            IdTagStatus::Blocked,
        )]));

        let response = handle_authorize(&ctx, json!({"idTag": "TAG2"})).await.unwrap();
        assert_eq!(response, json!({"idTagInfo": {"status": "Blocked"}}));
    }

    #[tokio::test]
    async fn missing_id_tag_is_invalid_payload() {
        let ctx = context(repos_with(vec![]));

        let err = handle_authorize(&ctx, json!({})).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidPayload { action: "Authorize", .. }));
    }
}
