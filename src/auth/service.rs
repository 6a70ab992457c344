//! The signup state machine.
//!
//! Four stages, each an independent entry point: no persisted "current
//! stage" exists beyond the signup session record itself. A crash mid-flow
//! leaves only a time-bounded ephemeral record.

use crate::auth::token::{TokenKind, TokenProcessor};
use crate::auth::{code, AuthError};
use crate::store::{
    auth_session_key, mail, password_path, signup_code_key, totp_seed_path, EphemeralStore,
    Identity, IdentityStore, MailDispatcher, SecretStore, AUTH_SESSION_TTL, SECRET_FIELD,
    SIGNUP_SESSION_TTL,
};
use crate::totp::TotpService;
use anyhow::anyhow;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Adaptive cost factor for the password hash.
const BCRYPT_COST: u32 = 7;

/// Access/refresh pair issued at signup completion, with the session id they
/// are both bound to.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access: String,
    pub refresh: String,
    pub session: String,
}

/// Drives signup from the first email check to the issued token pair.
pub struct AuthService {
    identities: Arc<dyn IdentityStore>,
    sessions: Arc<dyn EphemeralStore>,
    secrets: Arc<dyn SecretStore>,
    mailer: Arc<dyn MailDispatcher>,
    totp: Arc<TotpService>,
    tokens: Arc<TokenProcessor>,
    sender: String,
}

impl AuthService {
    #[must_use]
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        sessions: Arc<dyn EphemeralStore>,
        secrets: Arc<dyn SecretStore>,
        mailer: Arc<dyn MailDispatcher>,
        totp: Arc<TotpService>,
        tokens: Arc<TokenProcessor>,
        sender: String,
    ) -> Self {
        Self {
            identities,
            sessions,
            secrets,
            mailer,
            totp,
            tokens,
            sender,
        }
    }

    /// INIT: gate a new signup attempt and dispatch the verification code.
    ///
    /// Both pre-checks are required and independent; the atomic set-if-absent
    /// write is the authoritative gate against concurrent attempts. A mail
    /// dispatch failure deletes the just-created session so the caller can
    /// retry cleanly.
    ///
    /// # Errors
    /// `InvalidInput`, `AlreadyExists`, `AlreadyInProgress`, or `Unavailable`.
    pub async fn check(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidInput("malformed email".to_string()));
        }

        if self
            .identities
            .exists(&email)
            .await
            .map_err(AuthError::unavailable)?
        {
            return Err(AuthError::AlreadyExists);
        }

        let key = signup_code_key(&email);
        if self
            .sessions
            .exists(&key)
            .await
            .map_err(AuthError::unavailable)?
        {
            return Err(AuthError::AlreadyInProgress);
        }

        let verification_code = code::verification_code();
        let created = self
            .sessions
            .set_if_absent(&key, &verification_code, SIGNUP_SESSION_TTL)
            .await
            .map_err(AuthError::unavailable)?;
        if !created {
            return Err(AuthError::AlreadyInProgress);
        }

        let message = mail::build_verification_message(&self.sender, &email, &verification_code);
        if let Err(err) = self.mailer.send(&email, &message).await {
            if let Err(delete_err) = self.sessions.delete(&key).await {
                warn!("failed to drop signup session after mail failure: {delete_err}");
            }
            return Err(AuthError::unavailable(err));
        }

        Ok(())
    }

    /// CODE_SENT → REGISTER: consume the code and create the unverified
    /// identity with its secret material.
    ///
    /// A mismatched code leaves the session intact so the caller can retry
    /// while the TTL lasts.
    ///
    /// # Errors
    /// `NotInProgress`, `CodeMismatch`, or `Unavailable`.
    pub async fn confirm_email(
        &self,
        email: &str,
        submitted_code: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let key = signup_code_key(&email);

        if !self
            .sessions
            .exists(&key)
            .await
            .map_err(AuthError::unavailable)?
        {
            return Err(AuthError::NotInProgress);
        }

        let Some(stored_code) = self
            .sessions
            .get(&key)
            .await
            .map_err(AuthError::unavailable)?
        else {
            // Expired between the existence check and the read.
            return Err(AuthError::NotInProgress);
        };

        if !code::verify_eq(submitted_code, &stored_code) {
            return Err(AuthError::CodeMismatch);
        }

        self.sessions
            .delete(&key)
            .await
            .map_err(AuthError::unavailable)?;

        self.register(&email, password).await
    }

    /// PROVISION: re-check the password and render the provisioning QR.
    /// No state change.
    ///
    /// # Errors
    /// `NotFound`, `IncorrectCredential`, or `Unavailable`.
    pub async fn provision(&self, email: &str, password: &str) -> Result<Vec<u8>, AuthError> {
        let email = normalize_email(email);
        self.verify_identity(&email, password).await?;
        self.totp.provisioning_qr(&email).await
    }

    /// COMPLETE: password plus a currently valid one-time code buys the
    /// token pair and flips the identity to verified.
    ///
    /// An incorrect password or code performs no state mutation.
    ///
    /// # Errors
    /// `NotFound`, `IncorrectCredential`, `CodeMismatch`, or `Unavailable`.
    pub async fn complete(
        &self,
        email: &str,
        password: &str,
        one_time_code: &str,
    ) -> Result<IssuedTokens, AuthError> {
        let email = normalize_email(email);
        self.verify_identity(&email, password).await?;

        if !self.totp.is_code_correct(&email, one_time_code).await? {
            return Err(AuthError::CodeMismatch);
        }

        let tokens = self.create_session(&email).await?;

        self.identities
            .mark_verified(&email)
            .await
            .map_err(AuthError::unavailable)?;

        Ok(tokens)
    }

    /// Password re-check for an existing identity, nothing more.
    ///
    /// # Errors
    /// `NotFound`, `IncorrectCredential`, or `Unavailable`.
    pub async fn reauthorize(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        self.verify_identity(&email, password).await
    }

    async fn register(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let password_hash = bcrypt::hash(password, BCRYPT_COST).map_err(AuthError::unavailable)?;
        let seed = code::totp_seed();

        let identity = Identity {
            email: email.to_string(),
            id: Uuid::new_v4(),
            deployer: Uuid::new_v4(),
            cert_print: code::cert_print(),
            verified: false,
            banned: false,
        };

        self.identities
            .create(&identity)
            .await
            .map_err(AuthError::unavailable)?;

        self.secrets
            .write(
                &password_path(email),
                HashMap::from([(SECRET_FIELD.to_string(), password_hash)]),
            )
            .await
            .map_err(AuthError::unavailable)?;

        self.secrets
            .write(
                &totp_seed_path(email),
                HashMap::from([(SECRET_FIELD.to_string(), seed)]),
            )
            .await
            .map_err(AuthError::unavailable)?;

        Ok(())
    }

    async fn verify_identity(&self, email: &str, password: &str) -> Result<(), AuthError> {
        if !self
            .identities
            .exists(email)
            .await
            .map_err(AuthError::unavailable)?
        {
            return Err(AuthError::NotFound);
        }

        let fields = self
            .secrets
            .read(&password_path(email))
            .await
            .map_err(AuthError::unavailable)?
            .ok_or(AuthError::NotFound)?;
        let password_hash = fields
            .get(SECRET_FIELD)
            .ok_or_else(|| AuthError::unavailable(anyhow!("password hash missing")))?;

        if !bcrypt::verify(password, password_hash).map_err(AuthError::unavailable)? {
            return Err(AuthError::IncorrectCredential);
        }

        Ok(())
    }

    async fn create_session(&self, user: &str) -> Result<IssuedTokens, AuthError> {
        let session = code::session_id();
        self.sessions
            .set(&auth_session_key(user), &session, AUTH_SESSION_TTL)
            .await
            .map_err(AuthError::unavailable)?;

        let access = self
            .tokens
            .issue(TokenKind::Access, user, &session)
            .map_err(AuthError::unavailable)?;
        let refresh = self
            .tokens
            .issue(TokenKind::Refresh, user, &session)
            .map_err(AuthError::unavailable)?;

        Ok(IssuedTokens {
            access,
            refresh,
            session,
        })
    }
}

/// Normalize an email for lookup/uniqueness checks.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{
        MemoryEphemeralStore, MemoryIdentityStore, MemoryMailDispatcher, MemorySecretStore,
    };
    use crate::store::qr::QrImageRenderer;
    use std::sync::OnceLock;
    use std::time::Duration;

    // Key generation is the slow part; share one processor across tests.
    fn shared_processor() -> Arc<TokenProcessor> {
        static PROCESSOR: OnceLock<Arc<TokenProcessor>> = OnceLock::new();
        PROCESSOR
            .get_or_init(|| {
                Arc::new(
                    TokenProcessor::generate(
                        Duration::from_secs(900),
                        Duration::from_secs(86_400),
                        None,
                    )
                    .expect("key generation"),
                )
            })
            .clone()
    }

    struct Harness {
        service: AuthService,
        identities: Arc<MemoryIdentityStore>,
        sessions: Arc<MemoryEphemeralStore>,
        secrets: Arc<MemorySecretStore>,
        mailer: Arc<MemoryMailDispatcher>,
        tokens: Arc<TokenProcessor>,
    }

    fn harness() -> Harness {
        let identities = Arc::new(MemoryIdentityStore::new());
        let sessions = Arc::new(MemoryEphemeralStore::new());
        let secrets = Arc::new(MemorySecretStore::new());
        let mailer = Arc::new(MemoryMailDispatcher::new());
        let tokens = shared_processor();
        let totp = Arc::new(TotpService::new(
            secrets.clone(),
            Arc::new(QrImageRenderer),
            "enlasi".to_string(),
        ));
        let service = AuthService::new(
            identities.clone(),
            sessions.clone(),
            secrets.clone(),
            mailer.clone(),
            totp,
            tokens.clone(),
            "noreply@enlasi.dev".to_string(),
        );
        Harness {
            service,
            identities,
            sessions,
            secrets,
            mailer,
            tokens,
        }
    }

    async fn sent_code(harness: &Harness, email: &str) -> String {
        harness
            .sessions
            .get(&signup_code_key(email))
            .await
            .expect("memory get")
            .expect("signup session present")
    }

    #[tokio::test]
    async fn check_gates_once_and_dispatches_code() -> Result<(), AuthError> {
        let harness = harness();
        harness.service.check("A@X.com ").await?;

        // Email is normalized before any store touch.
        let code = sent_code(&harness, "a@x.com").await;
        assert_eq!(code.len(), 6);
        let (to, message) = harness.mailer.sent().pop().expect("one message");
        assert_eq!(to, "a@x.com");
        assert!(String::from_utf8_lossy(&message).contains(&code));

        let second = harness.service.check("a@x.com").await;
        assert!(matches!(second, Err(AuthError::AlreadyInProgress)));
        Ok(())
    }

    #[tokio::test]
    async fn check_rejects_existing_identity_and_bad_input() {
        let harness = harness();
        assert!(matches!(
            harness.service.check("not-an-email").await,
            Err(AuthError::InvalidInput(_))
        ));

        harness
            .identities
            .create(&Identity {
                email: "a@x.com".to_string(),
                id: Uuid::new_v4(),
                deployer: Uuid::new_v4(),
                cert_print: String::new(),
                verified: false,
                banned: false,
            })
            .await
            .expect("create");

        assert!(matches!(
            harness.service.check("a@x.com").await,
            Err(AuthError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn mail_failure_compensates_and_allows_retry() -> Result<(), AuthError> {
        let harness = harness();
        harness.mailer.fail_next_sends(true);

        let result = harness.service.check("a@x.com").await;
        assert!(matches!(result, Err(AuthError::Unavailable(_))));
        // The half-created session is gone, so the retry is clean.
        assert!(!harness
            .sessions
            .exists(&signup_code_key("a@x.com"))
            .await
            .map_err(AuthError::unavailable)?);

        harness.mailer.fail_next_sends(false);
        harness.service.check("a@x.com").await?;
        Ok(())
    }

    #[tokio::test]
    async fn confirm_requires_session_and_exact_code() -> Result<(), AuthError> {
        let harness = harness();

        let premature = harness.service.confirm_email("a@x.com", "123456", "pw1").await;
        assert!(matches!(premature, Err(AuthError::NotInProgress)));

        harness.service.check("a@x.com").await?;
        let code = sent_code(&harness, "a@x.com").await;

        let wrong = format!("{:06}", (code.parse::<u32>().unwrap_or(0) + 1) % 1_000_000);
        let mismatch = harness.service.confirm_email("a@x.com", &wrong, "pw1").await;
        assert!(matches!(mismatch, Err(AuthError::CodeMismatch)));

        // Session survived the mismatch; the right code still works.
        harness.service.confirm_email("a@x.com", &code, "pw1").await?;

        let identity = harness.identities.get("a@x.com").expect("identity created");
        assert!(!identity.verified);
        assert!(!identity.banned);

        // The session was consumed; replaying the code is NotInProgress.
        let replay = harness.service.confirm_email("a@x.com", &code, "pw1").await;
        assert!(matches!(replay, Err(AuthError::NotInProgress)));
        Ok(())
    }

    #[tokio::test]
    async fn expired_session_is_not_in_progress() -> Result<(), AuthError> {
        let harness = harness();
        harness.service.check("a@x.com").await?;
        let code = sent_code(&harness, "a@x.com").await;

        harness.sessions.expire(&signup_code_key("a@x.com"));
        let result = harness.service.confirm_email("a@x.com", &code, "pw1").await;
        assert!(matches!(result, Err(AuthError::NotInProgress)));
        Ok(())
    }

    async fn registered(harness: &Harness, email: &str, password: &str) -> Result<(), AuthError> {
        harness.service.check(email).await?;
        let code = sent_code(harness, email).await;
        harness.service.confirm_email(email, &code, password).await
    }

    #[tokio::test]
    async fn provision_checks_password_then_renders() -> Result<(), AuthError> {
        let harness = harness();
        registered(&harness, "a@x.com", "pw1").await?;

        let missing = harness.service.provision("nobody@x.com", "pw1").await;
        assert!(matches!(missing, Err(AuthError::NotFound)));

        let wrong = harness.service.provision("a@x.com", "pw2").await;
        assert!(matches!(wrong, Err(AuthError::IncorrectCredential)));

        let png = harness.service.provision("a@x.com", "pw1").await?;
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
        Ok(())
    }

    #[tokio::test]
    async fn complete_with_wrong_password_mutates_nothing() -> Result<(), AuthError> {
        let harness = harness();
        registered(&harness, "a@x.com", "pw1").await?;

        let result = harness.service.complete("a@x.com", "pw2", "000000").await;
        assert!(matches!(result, Err(AuthError::IncorrectCredential)));

        let identity = harness.identities.get("a@x.com").expect("identity");
        assert!(!identity.verified);
        assert!(!harness
            .sessions
            .exists(&auth_session_key("a@x.com"))
            .await
            .map_err(AuthError::unavailable)?);
        Ok(())
    }

    #[tokio::test]
    async fn complete_issues_bound_pair_and_verifies_identity() -> Result<(), AuthError> {
        let harness = harness();
        registered(&harness, "a@x.com", "pw1").await?;

        let wrong_code = harness.service.complete("a@x.com", "pw1", "000000").await;
        // A fixed guess can collide with the real code only 3 in 10^6 runs;
        // treat a pass here as the overwhelmingly likely mismatch.
        if let Err(err) = wrong_code {
            assert!(matches!(err, AuthError::CodeMismatch));
        }

        let seed_fields = harness
            .secrets
            .read(&totp_seed_path("a@x.com"))
            .await
            .map_err(AuthError::unavailable)?
            .expect("seed stored");
        let seed_base32 = seed_fields.get(SECRET_FIELD).expect("seed field");
        let seed = crate::totp::uri::decode_seed(seed_base32).expect("base32 seed");
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        let code = crate::totp::code::derive_code(&seed, now / 30).map_err(AuthError::unavailable)?;

        let issued = harness.service.complete("a@x.com", "pw1", &code).await?;

        let identity = harness.identities.get("a@x.com").expect("identity");
        assert!(identity.verified);

        let access = harness.tokens.verify(&issued.access).map_err(AuthError::unavailable)?;
        let refresh = harness.tokens.verify(&issued.refresh).map_err(AuthError::unavailable)?;
        assert_eq!(access.user_id, "a@x.com");
        assert_eq!(access.session, issued.session);
        assert_eq!(refresh.session, issued.session);
        assert_eq!(access.sub, "access");
        assert_eq!(refresh.sub, "refresh");

        let stored_session = harness
            .sessions
            .get(&auth_session_key("a@x.com"))
            .await
            .map_err(AuthError::unavailable)?;
        assert_eq!(stored_session.as_deref(), Some(issued.session.as_str()));
        Ok(())
    }

    #[tokio::test]
    async fn reauthorize_recheck_paths() -> Result<(), AuthError> {
        let harness = harness();
        registered(&harness, "a@x.com", "pw1").await?;

        harness.service.reauthorize("a@x.com", "pw1").await?;
        assert!(matches!(
            harness.service.reauthorize("a@x.com", "pw2").await,
            Err(AuthError::IncorrectCredential)
        ));
        assert!(matches!(
            harness.service.reauthorize("b@x.com", "pw1").await,
            Err(AuthError::NotFound)
        ));
        Ok(())
    }

    #[test]
    fn email_validation_normalizes_first() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }
}
