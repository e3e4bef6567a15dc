//! Remote Start Transaction command

use rust_ocpp::v1_6::messages::remote_start_transaction::{
    RemoteStartTransactionRequest, RemoteStartTransactionResponse,
};
use rust_ocpp::v1_6::types::RemoteStartStopStatus;
use tracing::info;

use super::{status_or_rejected, CommandError, CommandSender, CommandStatus};

const ACTION: &str = "RemoteStartTransaction";

pub async fn remote_start_transaction(
    command_sender: &CommandSender,
    charge_point_id: &str,
    id_tag: &str,
    connector_id: Option<u32>,
) -> Result<CommandStatus, CommandError> {
    info!(charge_point_id, id_tag, ?connector_id, "RemoteStartTransaction");

    let request = RemoteStartTransactionRequest {
        connector_id,
        id_tag: id_tag.to_string(),
        charging_profile: None,
    };

    let outcome = command_sender
        .send_command::<_, RemoteStartTransactionResponse>(charge_point_id, ACTION, &request)
        .await
        .map(|response| match response.status {
            RemoteStartStopStatus::Accepted => CommandStatus::Accepted,
            RemoteStartStopStatus::Rejected => CommandStatus::Rejected,
        });

    status_or_rejected(charge_point_id, ACTION, outcome)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::application::commands::test_support::fake_charge_point;
    use crate::session::SessionRegistry;

    #[tokio::test]
    async fn status_comes_from_the_charge_point() {
        let registry = SessionRegistry::shared();
        let cp = fake_charge_point(&registry, "CP001", |_, _| {
            Some(Ok(json!({"status": "Accepted"})))
        });
        let sender = CommandSender::new(registry.clone(), Duration::from_secs(1));

        let status = remote_start_transaction(&sender, "CP001", "TAG1", Some(2))
            .await
            .unwrap();
        assert_eq!(status, CommandStatus::Accepted);

        registry.close_all(crate::session::CloseReason::Shutdown);
        let seen = cp.await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "RemoteStartTransaction");
        assert_eq!(seen[0].1["idTag"], "TAG1");
        assert_eq!(seen[0].1["connectorId"], 2);
    }

    #[tokio::test]
    async fn charge_point_rejection_is_passed_through() {
        let registry = SessionRegistry::shared();
        let _cp = fake_charge_point(&registry, "CP001", |_, _| {
            Some(Ok(json!({"status": "Rejected"})))
        });
        let sender = CommandSender::new(registry, Duration::from_secs(1));

        let status = remote_start_transaction(&sender, "CP001", "TAG1", None)
            .await
            .unwrap();
        assert_eq!(status, CommandStatus::Rejected);
    }

    #[tokio::test]
    async fn timeout_is_rejected() {
        let registry = SessionRegistry::shared();
        let _cp = fake_charge_point(&registry, "CP001", |_, _| Some(Err(CommandError::Timeout)));
        let sender = CommandSender::new(registry, Duration::from_secs(1));

        let status = remote_start_transaction(&sender, "CP001", "TAG1", None)
            .await
            .unwrap();
        assert_eq!(status, CommandStatus::Rejected);
    }
}
