//! Rotation-protocol entry point for every authenticated route.
//!
//! The refresh token rides a persistent cookie, the access token the
//! `Authorization` header. An expired access token short-circuits the
//! request with 205 RESET CONTENT carrying the renewed token; the caller
//! retries with it.

use crate::api::handlers::ApiResponse;
use crate::auth::rotation::{self, RotationOutcome};
use crate::auth::token::TokenProcessor;
use crate::auth::AuthError;
use crate::store::EphemeralStore;
use axum::{
    extract::{Extension, Request},
    http::{
        header::{AUTHORIZATION, COOKIE},
        HeaderMap, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::error;

pub const REFRESH_COOKIE_NAME: &str = "enlasi-refresh";

pub async fn rotate_session(
    Extension(tokens): Extension<Arc<TokenProcessor>>,
    Extension(sessions): Extension<Arc<dyn EphemeralStore>>,
    mut request: Request,
    next: Next,
) -> Response {
    let refresh = cookie_value(request.headers(), REFRESH_COOKIE_NAME);
    let access = access_token(request.headers());

    let outcome = rotation::authorize(
        &tokens,
        sessions.as_ref(),
        refresh.as_deref(),
        access.as_deref(),
    )
    .await;

    match outcome {
        Ok(RotationOutcome::Authorized(claims)) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Ok(RotationOutcome::Renewed { access_token }) => (
            StatusCode::RESET_CONTENT,
            Json(ApiResponse::data(access_token, "access token renewed")),
        )
            .into_response(),
        Err(AuthError::ExpiredToken) => (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("session expired")),
        )
            .into_response(),
        Err(AuthError::InvalidToken) => (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("invalid token")),
        )
            .into_response(),
        Err(err) => {
            if let AuthError::Unavailable(source) = &err {
                error!("token renewal failed: {source:#}");
            }
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error("cannot renew token")),
            )
                .into_response()
        }
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name {
            return Some(val.to_string());
        }
    }
    None
}

fn access_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))
        .unwrap_or(trimmed)
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
