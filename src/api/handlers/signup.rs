//! The four signup stages as HTTP endpoints.

use super::{error_response, ApiResponse};
use crate::api::middleware::REFRESH_COOKIE_NAME;
use crate::auth::token::TokenProcessor;
use crate::auth::AuthService;
use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, CONTENT_TYPE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CheckRequest {
    email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ConfirmRequest {
    email: String,
    code: String,
    password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CredentialsRequest {
    pub(crate) email: String,
    pub(crate) password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CompleteRequest {
    email: String,
    password: String,
    code: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/signup/check",
    request_body = CheckRequest,
    responses(
        (status = 202, description = "Verification code has been sent", body = ApiResponse),
        (status = 400, description = "Email taken, signup already in progress, or malformed email", body = ApiResponse),
        (status = 503, description = "A backing store or the mail transport failed", body = ApiResponse),
    ),
    tag = "signup"
)]
#[instrument(skip(service, payload))]
pub async fn check(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<CheckRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match service.check(&request.email).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::message("verification code has been sent")),
        )
            .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/signup/confirm",
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Code accepted, unverified identity created", body = ApiResponse),
        (status = 400, description = "No signup in progress or wrong code", body = ApiResponse),
        (status = 503, description = "A backing store failed", body = ApiResponse),
    ),
    tag = "signup"
)]
#[instrument(skip(service, payload))]
pub async fn confirm(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<ConfirmRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match service
        .confirm_email(&request.email, &request.code, &request.password)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::message("verification code processed")),
        )
            .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/signup/qr",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Provisioning QR as PNG", content_type = "image/png"),
        (status = 401, description = "Incorrect password", body = ApiResponse),
        (status = 404, description = "Unknown identity", body = ApiResponse),
    ),
    tag = "signup"
)]
#[instrument(skip(service, payload))]
pub async fn qr(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<CredentialsRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match service.provision(&request.email, &request.password).await {
        Ok(png) => (
            StatusCode::OK,
            [(CONTENT_TYPE, HeaderValue::from_static("image/png"))],
            png,
        )
            .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/signup/complete",
    request_body = CompleteRequest,
    responses(
        (status = 200, description = "Access token in data, refresh token as cookie", body = ApiResponse),
        (status = 400, description = "One-time code outside the accepted window", body = ApiResponse),
        (status = 401, description = "Incorrect password", body = ApiResponse),
        (status = 404, description = "Unknown identity", body = ApiResponse),
    ),
    tag = "signup"
)]
#[instrument(skip(service, tokens, payload))]
pub async fn complete(
    service: Extension<Arc<AuthService>>,
    tokens: Extension<Arc<TokenProcessor>>,
    payload: Option<Json<CompleteRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match service
        .complete(&request.email, &request.password, &request.code)
        .await
    {
        Ok(issued) => {
            let cookie = match refresh_cookie(&issued.refresh, tokens.refresh_ttl().as_secs()) {
                Ok(cookie) => cookie,
                Err(err) => {
                    error!("failed to build refresh cookie: {err}");
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(ApiResponse::error("unexpected error")),
                    )
                        .into_response();
                }
            };
            let mut headers = HeaderMap::new();
            headers.insert(SET_COOKIE, cookie);
            (
                StatusCode::OK,
                headers,
                Json(ApiResponse::data(issued.access, "user created")),
            )
                .into_response()
        }
        Err(err) => error_response(&err).into_response(),
    }
}

/// Build the persistent `HttpOnly` cookie carrying the refresh token.
fn refresh_cookie(token: &str, max_age_seconds: u64) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{REFRESH_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}"
    ))
}

fn missing_payload() -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::error("missing payload")),
    )
        .into_response()
}
