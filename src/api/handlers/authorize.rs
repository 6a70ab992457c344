use super::{error_response, signup::CredentialsRequest, ApiResponse};
use crate::auth::AuthService;
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::instrument;

#[utoipa::path(
    post,
    path = "/api/v1/auth/reauthorize",
    request_body = CredentialsRequest,
    responses(
        (status = 202, description = "Password re-check passed", body = ApiResponse),
        (status = 401, description = "Incorrect password", body = ApiResponse),
        (status = 404, description = "Unknown identity", body = ApiResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(service, payload))]
pub async fn reauthorize(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<CredentialsRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("missing payload")),
        )
            .into_response();
    };

    match service
        .reauthorize(&request.email, &request.password)
        .await
    {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::message("processed")),
        )
            .into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
