// ABOUTME: HTTP error type for the JSON API
// ABOUTME: Maps engine errors to status codes with an {"error": message} body

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::conflicts::ConflictError;
use crate::error::SyncError;
use crate::scheduler::SchedulerError;
use crate::token::TokenError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(what: &str, id: i64) -> Self {
        ApiError::NotFound(format!("{} {} not found", what, id))
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::BadGateway(m) => m,
            ApiError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                format!("{:#}", e)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Config(_) => ApiError::BadRequest(err.to_string()),
            SyncError::Connectivity { .. } => ApiError::BadGateway(err.to_string()),
            SyncError::Other(e) => ApiError::Internal(e),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::NotFound(_) => ApiError::NotFound(err.to_string()),
            SchedulerError::AlreadyRunning(_) => ApiError::Conflict(err.to_string()),
            SchedulerError::InvalidSchedule { .. } => ApiError::BadRequest(err.to_string()),
            SchedulerError::Sync(e) => e.into(),
            SchedulerError::Other(e) => ApiError::Internal(e),
        }
    }
}

impl From<ConflictError> for ApiError {
    fn from(err: ConflictError) -> Self {
        match err {
            ConflictError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ConflictError::AlreadyResolved(_) => ApiError::Conflict(err.to_string()),
            ConflictError::Token(e) => e.into(),
            ConflictError::Sync(e) => e.into(),
            ConflictError::Other(e) => ApiError::Internal(e),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (SyncError::config("bad").into(), StatusCode::BAD_REQUEST),
            (
                SyncError::connectivity("db", "refused").into(),
                StatusCode::BAD_GATEWAY,
            ),
            (SchedulerError::AlreadyRunning(1).into(), StatusCode::CONFLICT),
            (SchedulerError::NotFound(1).into(), StatusCode::NOT_FOUND),
            (ConflictError::AlreadyResolved(1).into(), StatusCode::CONFLICT),
            (TokenError::Expired.into(), StatusCode::BAD_REQUEST),
            (anyhow::anyhow!("boom").into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
