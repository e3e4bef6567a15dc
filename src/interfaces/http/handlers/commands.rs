//! Remote command API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::application::{
    remote_start_transaction, remote_stop_transaction, CommandError, CommandStatus,
};
use crate::interfaces::http::common::{ApiResponse, ValidatedJson};
use crate::interfaces::http::ApiState;

#[derive(Debug, Deserialize, Validate)]
pub struct RemoteStartRequest {
    #[validate(length(min = 1, max = 20, message = "id_tag must be 1-20 characters"))]
    pub id_tag: String,
    #[validate(range(min = 1, message = "connector_id must be positive"))]
    pub connector_id: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RemoteStopRequest {
    #[validate(range(min = 1, message = "transaction_id must be positive"))]
    pub transaction_id: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

type CommandResult = Result<Json<ApiResponse<CommandResponse>>, (StatusCode, Json<ApiResponse<CommandResponse>>)>;

fn respond(action: &str, outcome: Result<CommandStatus, CommandError>) -> CommandResult {
    match outcome {
        Ok(status) => {
            let (status, message) = match status {
                CommandStatus::Accepted => ("Accepted", format!("{} accepted", action)),
                CommandStatus::Rejected => ("Rejected", format!("{} rejected by charge point", action)),
            };
            Ok(Json(ApiResponse::success(CommandResponse {
                status: status.to_string(),
                message: Some(message),
            })))
        }
        Err(e) => {
            let code = match e {
                CommandError::NotConnected(_) => StatusCode::NOT_FOUND,
                CommandError::CallError { .. } | CommandError::InvalidResponse(_) => {
                    StatusCode::BAD_GATEWAY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((code, Json(ApiResponse::error(e.to_string()))))
        }
    }
}

/// `POST /api/v1/charge-points/{charge_point_id}/remote-start`
pub async fn remote_start(
    State(state): State<ApiState>,
    Path(charge_point_id): Path<String>,
    ValidatedJson(request): ValidatedJson<RemoteStartRequest>,
) -> CommandResult {
    let outcome = remote_start_transaction(
        &state.command_sender,
        &charge_point_id,
        &request.id_tag,
        request.connector_id,
    )
    .await;
    respond("Remote start", outcome)
}

/// `POST /api/v1/charge-points/{charge_point_id}/remote-stop`
pub async fn remote_stop(
    State(state): State<ApiState>,
    Path(charge_point_id): Path<String>,
    ValidatedJson(request): ValidatedJson<RemoteStopRequest>,
) -> CommandResult {
    let outcome =
        remote_stop_transaction(&state.command_sender, &charge_point_id, request.transaction_id)
            .await;
    respond("Remote stop", outcome)
}
