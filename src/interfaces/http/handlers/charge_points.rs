//! Connected charge points and their transactions

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::domain::{Transaction, TransactionStatus};
use crate::interfaces::http::common::ApiResponse;
use crate::interfaces::http::ApiState;
use crate::session::SessionInfo;

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionDto {
    pub id: i32,
    pub charge_point_id: String,
    pub connector_id: u32,
    pub id_tag: String,
    pub meter_start: i32,
    pub meter_stop: Option<i32>,
    pub energy_consumed_wh: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<String>,
    pub status: String,
}

impl From<Transaction> for TransactionDto {
    fn from(tx: Transaction) -> Self {
        let status = match tx.status {
            TransactionStatus::Started => "Started",
            TransactionStatus::Stopped => "Stopped",
        };
        Self {
            energy_consumed_wh: tx.energy_consumed(),
            status: status.to_string(),
            id: tx.id,
            charge_point_id: tx.charge_point_id,
            connector_id: tx.connector_id,
            id_tag: tx.id_tag,
            meter_start: tx.meter_start,
            meter_stop: tx.meter_stop,
            started_at: tx.started_at,
            stopped_at: tx.stopped_at,
            stop_reason: tx.stop_reason,
        }
    }
}

/// `GET /api/v1/charge-points`
pub async fn list_charge_points(
    State(state): State<ApiState>,
) -> Json<ApiResponse<Vec<SessionInfo>>> {
    Json(ApiResponse::success(state.session_registry.list()))
}

/// `GET /api/v1/charge-points/{charge_point_id}/transactions`
pub async fn list_transactions(
    State(state): State<ApiState>,
    Path(charge_point_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<TransactionDto>>>, (StatusCode, Json<ApiResponse<Vec<TransactionDto>>>)>
{
    match state
        .repos
        .transactions()
        .find_by_charge_point(&charge_point_id)
        .await
    {
        Ok(transactions) => Ok(Json(ApiResponse::success(
            transactions.into_iter().map(TransactionDto::from).collect(),
        ))),
        Err(e) => {
            error!(charge_point_id = charge_point_id.as_str(), error = %e, "Failed to list transactions");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            ))
        }
    }
}
