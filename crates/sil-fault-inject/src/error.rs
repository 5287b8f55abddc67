//! Injector error variants and their HTTP mapping.
//!
//! Handlers return typed errors; this adapter maps them to status codes at
//! the edge.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use sil_codec::CanError;

/// Remaining lock seconds, surfaced on acquire conflicts.
pub const REMAINING_SEC_HEADER: &str = "X-Remaining-Sec";

#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),

    #[error("control locked by '{holder}' ({remaining_secs}s remaining)")]
    LockDenied { holder: String, remaining_secs: u64 },

    #[error("lock already held by '{holder}' ({remaining_secs}s remaining)")]
    AcquireConflict { holder: String, remaining_secs: u64 },

    #[error("lock not held by this client")]
    NotOwner,

    #[error("scenario failed: {0}")]
    Bus(#[from] CanError),
}

impl IntoResponse for InjectError {
    fn into_response(self) -> Response {
        let status = match &self {
            InjectError::UnknownScenario(_) => StatusCode::NOT_FOUND,
            InjectError::LockDenied { .. } | InjectError::NotOwner => StatusCode::FORBIDDEN,
            InjectError::AcquireConflict { .. } => StatusCode::CONFLICT,
            InjectError::Bus(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        let mut response = (status, axum::Json(body)).into_response();
        if let InjectError::AcquireConflict { remaining_secs, .. } = &self
            && let Ok(value) = HeaderValue::from_str(&remaining_secs.to_string())
        {
            response.headers_mut().insert(REMAINING_SEC_HEADER, value);
        }
        response
    }
}

/// Convenience alias.
pub type InjectResult<T> = Result<T, InjectError>;
