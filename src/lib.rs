//! # Enlasi (Credential Issuance & Session Lifecycle)
//!
//! `enlasi` onboards a new identity through an email-verified,
//! TOTP-protected signup flow, then issues and silently rotates short-lived
//! access / long-lived refresh tokens for subsequent requests.
//!
//! ## Signup Flow
//!
//! Four stages, each an independent HTTP entry point. No persisted "current
//! stage" exists: the ephemeral signup session record is itself the
//! in-progress flag, so a crash mid-flow leaves only a time-bounded record.
//!
//! 1. **check**: gate the attempt (no identity, no active signup session),
//!    then mail a 6-digit code. The session lives 2 minutes.
//! 2. **confirm**: consume the code (timing-safe compare) and create the
//!    unverified identity plus its secret material.
//! 3. **qr**: re-check the password and render the TOTP provisioning QR.
//! 4. **complete**: password plus a currently valid one-time code buys the
//!    access/refresh pair and flips the identity to verified.
//!
//! ## Session Rotation
//!
//! The refresh token (cookie) is the trust anchor; the access token
//! (`Authorization` header) is the per-request credential. An expired access
//! token is silently reissued under a fresh session id as long as the
//! refresh token verifies; refresh failure is always terminal.
//!
//! ## Stores
//!
//! Identity rows live in Postgres, ephemeral session records in Redis,
//! secret material (password hash, TOTP seed) in Vault KV v2. Each is
//! reached only through its capability trait in [`store`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;
pub mod totp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
