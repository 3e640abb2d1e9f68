use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::{AuthError, CacheError, SyncError};
use crate::types::Resource;

/// Errors returned by the route handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Callback state did not match the pending authorization.
    #[error("Invalid state parameter.")]
    InvalidState,

    /// Code exchange or tenant resolution failed during the callback.
    #[error("Error obtaining access token: {0}")]
    Authorization(#[source] AuthError),

    /// The sync run right after a successful callback failed.
    #[error("Error obtaining access token: {0}")]
    InitialSync(#[source] SyncError),

    /// An on-demand sync failed.
    #[error("{0}")]
    Sync(#[source] SyncError),

    #[error("{} data not found", .0.display_name())]
    NotFound(Resource),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::StateMismatch => Self::InvalidState,
            other => Self::Authorization(other),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidState => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Sync(SyncError::Fetch { source, .. }) if source.requires_authorization() => {
                StatusCode::UNAUTHORIZED
            }
            Self::Authorization(_) | Self::InitialSync(_) | Self::Sync(_) | Self::Cache(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::InvalidState => (status, self.to_string()).into_response(),
            Self::NotFound(_) => (status, Json(json!({ "error": self.to_string() }))).into_response(),
            Self::Cache(_) => {
                tracing::error!(error = %self, "Cache read failed");
                (status, Json(json!({ "error": "Internal error" }))).into_response()
            }
            _ => {
                if status.is_server_error() {
                    tracing::error!(error = %self, "Request failed");
                } else {
                    tracing::warn!(error = %self, "Request requires authorization");
                }
                (status, Json(json!({ "message": self.to_string() }))).into_response()
            }
        }
    }
}
