use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use slotwise_core::{Appointment, BookingRequest, CancelRequest, RescheduleRequest};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RescheduleBody {
    pub tenant_id: Uuid,
    pub session_id: String,
    pub new_hold_id: Uuid,
    pub timezone: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub tenant_id: Uuid,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub tenant_id: Uuid,
    pub email: String,
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", get(find_by_email))
        .route("/v1/bookings/confirm", post(confirm_booking))
        .route("/v1/bookings/reference/{code}", get(find_by_reference))
        .route("/v1/bookings/{id}/reschedule", post(reschedule_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
}

async fn confirm_booking(
    State(state): State<AppState>,
    Json(req): Json<BookingRequest>,
) -> Result<Json<Appointment>, AppError> {
    let appointment = state.booking.confirm(&req).await?;
    Ok(Json(appointment))
}

async fn reschedule_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RescheduleBody>,
) -> Result<Json<Appointment>, AppError> {
    let req = RescheduleRequest {
        tenant_id: body.tenant_id,
        session_id: body.session_id,
        appointment_id: id,
        new_hold_id: body.new_hold_id,
        timezone: body.timezone,
    };
    let appointment = state.booking.reschedule(&req).await?;
    Ok(Json(appointment))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelBody>,
) -> Result<Json<Appointment>, AppError> {
    let req = CancelRequest {
        tenant_id: body.tenant_id,
        appointment_id: id,
        actor: body.actor,
    };
    let appointment = state.booking.cancel(&req).await?;
    Ok(Json(appointment))
}

async fn find_by_reference(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Appointment>, AppError> {
    state
        .booking
        .find_by_reference(query.tenant_id, &code)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

async fn find_by_email(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let appointments = state
        .booking
        .find_by_client_email(query.tenant_id, &query.email)
        .await?;
    Ok(Json(appointments))
}
