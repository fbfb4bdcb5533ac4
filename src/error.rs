use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::services::auth::AuthError;
use crate::services::booking::BookingError;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: code,
                message: message.into(),
                labels: None,
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    /// Logs `detail` and hides it from the client.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        tracing::error!("Request failed: {}", detail);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "internal server error",
        )
    }

    fn with_labels(mut self, labels: &[String]) -> Self {
        self.body.labels = Some(labels.to_vec());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match &err {
            BookingError::ShowNotFound(_) => ApiError::not_found("SHOW_NOT_FOUND", message),
            BookingError::SeatNotFound(labels) => {
                ApiError::not_found("SEAT_NOT_FOUND", message).with_labels(labels)
            }
            BookingError::SeatConflict(labels) => {
                ApiError::new(StatusCode::CONFLICT, "SEAT_CONFLICT", message).with_labels(labels)
            }
            BookingError::InvalidRequest(_) => ApiError::bad_request(message),
            BookingError::BookingNotFound(_) => ApiError::not_found("BOOKING_NOT_FOUND", message),
            BookingError::Forbidden(_) => ApiError::forbidden(message),
            BookingError::AlreadyCancelled(_) => {
                ApiError::new(StatusCode::CONFLICT, "ALREADY_CANCELLED", message)
            }
            BookingError::Internal(detail) => ApiError::internal(detail),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => ApiError::conflict(format!("{} already exists", what)),
            other => ApiError::internal(other),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidToken => {
                ApiError::unauthorized(err.to_string())
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_carries_labels() {
        let err = ApiError::from(BookingError::SeatConflict(vec!["A2".to_string()]));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "SEAT_CONFLICT");
        assert_eq!(err.body.labels, Some(vec!["A2".to_string()]));
    }

    #[test]
    fn internal_details_stay_in_the_log() {
        let err = ApiError::from(BookingError::Internal("record booking failed".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body.message, "internal server error");
        assert!(err.body.labels.is_none());
    }

    #[test]
    fn duplicate_user_is_a_conflict() {
        let err = ApiError::from(StoreError::Duplicate("user a@b.c".to_string()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "CONFLICT");
    }
}
