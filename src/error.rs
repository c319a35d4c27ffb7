use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::booking::BookingStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("override requires a non-empty reason")]
    MissingOverrideReason,

    #[error("driver is bound to an active booking")]
    DriverBusy,

    #[error("driver is suspended")]
    DriverSuspended,

    #[error("driver not eligible: {0}")]
    DriverIneligible(String),

    #[error("entity changed concurrently; re-read and retry")]
    ConcurrentModification,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::MissingOverrideReason => "missing_override_reason",
            AppError::DriverBusy => "driver_busy",
            AppError::DriverSuspended => "driver_suspended",
            AppError::DriverIneligible(_) => "driver_ineligible",
            AppError::ConcurrentModification => "concurrent_modification",
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MissingOverrideReason | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidTransition { .. }
            | AppError::DriverBusy
            | AppError::DriverSuspended
            | AppError::DriverIneligible(_)
            | AppError::ConcurrentModification => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
