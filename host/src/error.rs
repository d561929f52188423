//! The top-level host error and its `IntoResponse` mapping (§7, §6.4).
//! Mirrors the teacher's `host/src/interfaces/error.rs` shape: a flat
//! `{"status":"error","error":...,"message":...}` JSON body, but with an
//! explicit HTTP status per `SchedError` kind rather than a blanket 200.

use crate::modified_tracker::TrackerError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sched_lib::error::SchedError;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Sched(#[from] SchedError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("not yet implemented")]
    NotImplemented,

    #[error("there was an I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("there was a deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("there was an unexpected error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

fn sched_error_parts(e: &SchedError) -> (StatusCode, &'static str) {
    match e {
        SchedError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        SchedError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
        SchedError::PermissionDenied(_) => (StatusCode::FORBIDDEN, "permission_denied"),
        SchedError::ConcurrentUpdate(_) => (StatusCode::CONFLICT, "concurrent_update"),
        SchedError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "transient"),
        SchedError::CachedPermanent(_) => (StatusCode::UNPROCESSABLE_ENTITY, "cached_permanent"),
        SchedError::Canceled => (StatusCode::REQUEST_TIMEOUT, "canceled"),
        SchedError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

impl IntoResponse for HostError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            HostError::Sched(e) => sched_error_parts(e),
            HostError::Tracker(TrackerError::ExpiredToken) => (StatusCode::GONE, "expired_token"),
            HostError::Tracker(TrackerError::Store(e)) => sched_error_parts(e),
            HostError::NotImplemented => (StatusCode::NOT_IMPLEMENTED, "not_implemented"),
            HostError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            HostError::Serde(_) => (StatusCode::BAD_REQUEST, "serde_error"),
            HostError::Anyhow(_) => (StatusCode::INTERNAL_SERVER_ERROR, "anyhow_error"),
        };
        let message = self.to_string();
        (
            status,
            Json(serde_json::json!({ "status": "error", "error": error, "message": message })),
        )
            .into_response()
    }
}

pub type HostResult<T> = Result<T, HostError>;
