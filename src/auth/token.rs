//! RS256 token processor for the access/refresh pair.
//!
//! The key pair lives for the process lifetime and is generated at startup
//! with a randomized size inside a bounded range. Tokens signed by a previous
//! process are rejected after a restart; callers re-authenticate.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, Rng};
use rsa::errors::Error as RsaError;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{Keypair, SignatureEncoding, Signer, Verifier};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

const KEY_BITS_FLOOR: usize = 1100;
const KEY_BITS_SPREAD: usize = 899;

/// Token kind carried in the `sub` claim. Access and refresh tokens are
/// structurally identical otherwise; only kind and TTL differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn rs256() -> Self {
        Self {
            alg: "RS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub sub: String,
    pub user_id: String,
    pub session: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl TokenClaims {
    /// Kind encoded in `sub`, if it is one of the two known kinds.
    #[must_use]
    pub fn kind(&self) -> Option<TokenKind> {
        match self.sub.as_str() {
            "access" => Some(TokenKind::Access),
            "refresh" => Some(TokenKind::Refresh),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("rsa error")]
    Rsa(#[from] RsaError),
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(0))
}

/// Signs and verifies the access/refresh token pair.
///
/// Read-only after construction; safe to share behind `Arc` across request
/// tasks.
pub struct TokenProcessor {
    signing_key: SigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    issuer: Option<String>,
}

impl TokenProcessor {
    /// Generate a fresh process-lifetime key pair and build the processor.
    ///
    /// # Errors
    /// Returns an error if RSA key generation fails.
    pub fn generate(
        access_ttl: Duration,
        refresh_ttl: Duration,
        issuer: Option<String>,
    ) -> Result<Self, TokenError> {
        let bits = KEY_BITS_FLOOR + OsRng.gen_range(0..KEY_BITS_SPREAD);
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)?;
        let signing_key = SigningKey::<Sha256>::new(private_key);
        let verifying_key = signing_key.verifying_key();

        Ok(Self {
            signing_key,
            verifying_key,
            access_ttl,
            refresh_ttl,
            issuer,
        })
    }

    /// Refresh lifetime, the cookie Max-Age callers advertise.
    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue a signed token of the given kind for `user_id` bound to
    /// `session`, starting now.
    ///
    /// # Errors
    /// Returns an error if claim encoding fails.
    pub fn issue(
        &self,
        kind: TokenKind,
        user_id: &str,
        session: &str,
    ) -> Result<String, TokenError> {
        self.issue_at(kind, user_id, session, now_unix_seconds())
    }

    /// Issue a token with an explicit issuance instant. Exposed so callers
    /// and tests can pin the clock.
    ///
    /// # Errors
    /// Returns an error if claim encoding fails.
    pub fn issue_at(
        &self,
        kind: TokenKind,
        user_id: &str,
        session: &str,
        now: i64,
    ) -> Result<String, TokenError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = TokenClaims {
            sub: kind.as_str().to_string(),
            user_id: user_id.to_string(),
            session: session.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            nbf: now,
            exp: now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
        };

        let header_b64 = b64e_json(&TokenHeader::rs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_vec());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify a token against the process key and return its claims.
    ///
    /// # Errors
    /// Returns `TokenError::Expired` for a structurally valid, correctly
    /// signed but stale token; any other failure (format, base64, json,
    /// algorithm, signature, not-before, issuer) is its own kind. Callers
    /// that branch on expiry rely on this distinction.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, now_unix_seconds())
    }

    /// Verify with an explicit clock. Exposed so callers and tests can pin
    /// the instant the checks run against.
    ///
    /// # Errors
    /// Same contract as [`Self::verify`].
    pub fn verify_at(&self, token: &str, now: i64) -> Result<TokenClaims, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        if header_b64.is_empty() || claims_b64.is_empty() || parts.next().is_some() {
            return Err(TokenError::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != "RS256" {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }

        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature_bytes =
            Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
        let signature = Signature::try_from(signature_bytes.as_slice())
            .map_err(|_| TokenError::InvalidSignature)?;
        self.verifying_key
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: TokenClaims = b64d_json(claims_b64)?;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }
        if claims.nbf > now {
            return Err(TokenError::NotYetValid);
        }
        // Issuer is only enforced when one is configured.
        if let Some(issuer) = &self.issuer {
            if claims.iss.as_deref() != Some(issuer.as_str()) {
                return Err(TokenError::InvalidIssuer);
            }
        }

        Ok(claims)
    }
}
