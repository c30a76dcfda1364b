use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use slotwise_core::Hold;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateHoldRequest {
    pub tenant_id: Uuid,
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/holds", post(create_hold))
}

async fn create_hold(
    State(state): State<AppState>,
    Json(req): Json<CreateHoldRequest>,
) -> Result<(StatusCode, Json<Hold>), AppError> {
    let hold = state
        .booking
        .create_hold(req.tenant_id, &req.session_id, req.start_time, req.end_time)
        .await?;
    Ok((StatusCode::CREATED, Json(hold)))
}
