//! Remote Stop Transaction command

use rust_ocpp::v1_6::messages::remote_stop_transaction::{
    RemoteStopTransactionRequest, RemoteStopTransactionResponse,
};
use rust_ocpp::v1_6::types::RemoteStartStopStatus;
use tracing::info;

use super::{status_or_rejected, CommandError, CommandSender, CommandStatus};

const ACTION: &str = "RemoteStopTransaction";

pub async fn remote_stop_transaction(
    command_sender: &CommandSender,
    charge_point_id: &str,
    transaction_id: i32,
) -> Result<CommandStatus, CommandError> {
    info!(charge_point_id, transaction_id, "RemoteStopTransaction");

    let request = RemoteStopTransactionRequest { transaction_id };
    let outcome = command_sender
        .send_command::<_, RemoteStopTransactionResponse>(charge_point_id, ACTION, &request)
        .await
        .map(|response| match response.status {
            RemoteStartStopStatus::Accepted => CommandStatus::Accepted,
            RemoteStartStopStatus::Rejected => CommandStatus::Rejected,
        });

    status_or_rejected(charge_point_id, ACTION, outcome)
}
