use super::ApiResponse;
use crate::auth::token::TokenClaims;
use axum::{extract::Extension, response::IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub session: String,
    pub expires_at: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/session",
    responses(
        (status = 200, description = "Claims of the authorized request", body = SessionResponse),
        (status = 205, description = "Access token was expired; a renewed one is returned", body = ApiResponse),
        (status = 401, description = "Missing, invalid, or expired token pair", body = ApiResponse),
    ),
    tag = "auth"
)]
pub async fn session(claims: Extension<TokenClaims>) -> impl IntoResponse {
    Json(SessionResponse {
        user_id: claims.user_id.clone(),
        session: claims.session.clone(),
        expires_at: claims.exp,
    })
}
