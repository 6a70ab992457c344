//! Request-time token-pair validation and silent access-token renewal.
//!
//! The refresh token is the trust anchor: its failure is always terminal
//! for the request and it is never renewed here. The access token is
//! silently reissued only when it fails verification with `Expired`.

use crate::auth::token::{TokenClaims, TokenError, TokenKind, TokenProcessor};
use crate::auth::{code, AuthError};
use crate::store::{auth_session_key, EphemeralStore, AUTH_SESSION_TTL};

/// Outcome of running the protocol over a request's token pair.
#[derive(Debug)]
pub enum RotationOutcome {
    /// Both tokens verified; the request proceeds as the claims' identity.
    Authorized(TokenClaims),
    /// The access token had expired. A fresh one was minted under a new
    /// session id; the caller retries with it instead of reaching the
    /// protected resource on this request.
    Renewed { access_token: String },
}

/// Validate the pair and renew an expired access token.
///
/// # Errors
/// - `InvalidToken`: refresh token missing or failing verification for any
///   reason other than expiry; or access token failing for any reason other
///   than expiry.
/// - `ExpiredToken`: refresh token expired ("session expired" to callers).
/// - `Unavailable`: session overwrite or minting failed during renewal.
pub async fn authorize(
    tokens: &TokenProcessor,
    sessions: &dyn EphemeralStore,
    refresh_token: Option<&str>,
    access_token: Option<&str>,
) -> Result<RotationOutcome, AuthError> {
    let refresh_token = refresh_token.ok_or(AuthError::InvalidToken)?;

    let refresh = match tokens.verify(refresh_token) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => return Err(AuthError::ExpiredToken),
        Err(_) => return Err(AuthError::InvalidToken),
    };

    let access_token = access_token.ok_or(AuthError::InvalidToken)?;

    match tokens.verify(access_token) {
        Ok(claims) => Ok(RotationOutcome::Authorized(claims)),
        Err(TokenError::Expired) => {
            let session = code::session_id();
            sessions
                .set(
                    &auth_session_key(&refresh.user_id),
                    &session,
                    AUTH_SESSION_TTL,
                )
                .await
                .map_err(AuthError::unavailable)?;

            let access_token = tokens
                .issue(TokenKind::Access, &refresh.user_id, &session)
                .map_err(AuthError::unavailable)?;

            Ok(RotationOutcome::Renewed { access_token })
        }
        Err(_) => Err(AuthError::InvalidToken),
    }
}
