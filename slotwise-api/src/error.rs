use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use slotwise_core::BookingError;

#[derive(Debug)]
pub enum AppError {
    Booking(BookingError),
    NotFound,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Booking(err) => match err {
                BookingError::HoldExpired => StatusCode::GONE,
                BookingError::SessionMismatch => StatusCode::FORBIDDEN,
                BookingError::SlotConflict => StatusCode::CONFLICT,
                BookingError::CalendarSyncRequired => StatusCode::SERVICE_UNAVAILABLE,
                BookingError::NotFound => StatusCode::NOT_FOUND,
                BookingError::NotConfirmed => StatusCode::CONFLICT,
                BookingError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                BookingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (kind, message) = match &self {
            AppError::NotFound => ("not_found", BookingError::NotFound.user_message()),
            AppError::Booking(err) => {
                if status.is_server_error() {
                    tracing::error!(kind = err.kind(), "Booking request failed: {}", err);
                } else {
                    tracing::debug!(kind = err.kind(), "Booking request rejected: {}", err);
                }
                (err.kind(), err.user_message())
            }
        };

        let body = Json(json!({
            "error": message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        AppError::Booking(err)
    }
}
