//! Store adapter contracts and the key/path namespaces the core writes under.
//!
//! Each backend gets one capability-set trait and one concrete adapter,
//! injected at composition time behind `Arc<dyn …>`. The core never touches
//! a driver directly.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

pub mod mail;
pub mod memory;
pub mod postgres;
pub mod qr;
pub mod redis;
pub mod vault;

/// Bound on every store round-trip and mail dispatch; expiry surfaces as a
/// store failure, not its own error kind.
pub const STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Signup sessions live this long; the record's existence is the
/// "signup in progress" flag.
pub const SIGNUP_SESSION_TTL: Duration = Duration::from_secs(120);

/// Auth sessions are overwritten on every rotation and expire after this.
pub const AUTH_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Ephemeral key for the signup verification code of one email.
#[must_use]
pub fn signup_code_key(email: &str) -> String {
    format!("codes:signup:email-confirmation:{email}")
}

/// Ephemeral key for the current session id of one identity.
#[must_use]
pub fn auth_session_key(user_id: &str) -> String {
    format!("auth:sessions:users:{user_id}")
}

/// Secret-store path for the password hash of one identity.
#[must_use]
pub fn password_path(email: &str) -> String {
    format!("users/global/login/pwd/{email}")
}

/// Secret-store path for the one-time-code seed of one identity.
#[must_use]
pub fn totp_seed_path(email: &str) -> String {
    format!("users/totp/seed/{email}")
}

/// Field name secrets are stored under at both paths.
pub const SECRET_FIELD: &str = "val";

/// Identity row created at signup completion. Never deleted by this service.
#[derive(Debug, Clone)]
pub struct Identity {
    pub email: String,
    pub id: Uuid,
    pub deployer: Uuid,
    pub cert_print: String,
    pub verified: bool,
    pub banned: bool,
}

/// Durable identity records.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn exists(&self, email: &str) -> Result<bool>;
    async fn create(&self, identity: &Identity) -> Result<()>;
    async fn mark_verified(&self, email: &str) -> Result<()>;
}

/// TTL-keyed record store shared by signup sessions and auth sessions,
/// under the distinct key namespaces above.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    /// Atomic create. Returns false without writing when the key is live.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Write-once-per-field secret material (password hash, one-time-code seed).
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn write(&self, path: &str, fields: HashMap<String, String>) -> Result<()>;
    async fn read(&self, path: &str) -> Result<Option<HashMap<String, String>>>;
}

/// Outbound mail transport. Message construction stays with the caller.
#[async_trait]
pub trait MailDispatcher: Send + Sync {
    async fn send(&self, to: &str, message: &[u8]) -> Result<()>;
}

/// Renders a provisioning URI as a scannable image.
pub trait ImageRenderer: Send + Sync {
    /// # Errors
    /// Returns an error if encoding fails.
    fn encode(&self, uri: &str) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_namespaces_are_distinct() {
        let code_key = signup_code_key("a@x.com");
        let session_key = auth_session_key("a@x.com");
        assert_ne!(code_key, session_key);
        assert!(code_key.starts_with("codes:signup:"));
        assert!(session_key.starts_with("auth:sessions:"));
    }

    #[test]
    fn secret_paths_are_distinct() {
        assert_ne!(password_path("a@x.com"), totp_seed_path("a@x.com"));
    }
}
