pub mod authorize;
pub mod health;
pub mod session;
pub mod signup;

// common envelope and error mapping for the handlers
use crate::auth::AuthError;
use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

/// JSON envelope every endpoint answers with.
#[derive(ToSchema, Serialize, Debug, Default)]
pub struct ApiResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    #[must_use]
    pub fn message(text: &str) -> Self {
        Self {
            message: Some(text.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn error(text: &str) -> Self {
        Self {
            error: Some(text.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn data(value: String, text: &str) -> Self {
        Self {
            data: Some(value),
            message: Some(text.to_string()),
            ..Self::default()
        }
    }
}

/// Status-code mapping for the core outcome taxonomy. The taxonomy itself
/// never carries HTTP concerns.
pub(crate) fn error_response(err: &AuthError) -> (StatusCode, Json<ApiResponse>) {
    let status = match err {
        AuthError::InvalidInput(_)
        | AuthError::AlreadyExists
        | AuthError::AlreadyInProgress
        | AuthError::NotInProgress
        | AuthError::CodeMismatch => StatusCode::BAD_REQUEST,
        AuthError::IncorrectCredential | AuthError::InvalidToken | AuthError::ExpiredToken => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::NotFound => StatusCode::NOT_FOUND,
        AuthError::Unavailable(source) => {
            error!("store failure: {source:#}");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    let body = match err {
        AuthError::Unavailable(_) => "unexpected error".to_string(),
        other => other.to_string(),
    };

    (status, Json(ApiResponse::error(&body)))
}
