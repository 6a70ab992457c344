use crate::auth::AuthError;
use crate::store::{totp_seed_path, ImageRenderer, SecretStore, SECRET_FIELD};
use crate::totp::{code, uri};
use anyhow::anyhow;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// One-time-code operations over the stored per-identity seed.
pub struct TotpService {
    secrets: Arc<dyn SecretStore>,
    renderer: Arc<dyn ImageRenderer>,
    issuer: String,
}

impl TotpService {
    #[must_use]
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        renderer: Arc<dyn ImageRenderer>,
        issuer: String,
    ) -> Self {
        Self {
            secrets,
            renderer,
            issuer,
        }
    }

    /// Render the provisioning QR for an identity's stored seed.
    ///
    /// # Errors
    /// `NotFound` when no seed is stored; `Unavailable` on store or
    /// rendering failure.
    pub async fn provisioning_qr(&self, email: &str) -> Result<Vec<u8>, AuthError> {
        let seed_base32 = self.stored_seed(email).await?;
        let uri = uri::provisioning_uri(&self.issuer, email, &seed_base32);
        self.renderer.encode(&uri).map_err(AuthError::unavailable)
    }

    /// Check a submitted code against the ±1-step drift window, now.
    ///
    /// # Errors
    /// `NotFound` when no seed is stored; `Unavailable` on store failure or
    /// a corrupt seed. A plain mismatch is `Ok(false)`, never an error.
    pub async fn is_code_correct(&self, email: &str, submitted: &str) -> Result<bool, AuthError> {
        self.is_code_correct_at(email, submitted, now_unix()).await
    }

    /// Same check with a pinned clock.
    ///
    /// # Errors
    /// Same contract as [`Self::is_code_correct`].
    pub async fn is_code_correct_at(
        &self,
        email: &str,
        submitted: &str,
        now_unix: u64,
    ) -> Result<bool, AuthError> {
        let seed_base32 = self.stored_seed(email).await?;
        let seed = uri::decode_seed(&seed_base32)
            .ok_or_else(|| AuthError::unavailable(anyhow!("stored seed is not valid base32")))?;
        code::verify_window(&seed, submitted, now_unix).map_err(AuthError::unavailable)
    }

    async fn stored_seed(&self, email: &str) -> Result<String, AuthError> {
        let fields = self
            .secrets
            .read(&totp_seed_path(email))
            .await
            .map_err(AuthError::unavailable)?
            .ok_or(AuthError::NotFound)?;

        fields
            .get(SECRET_FIELD)
            .cloned()
            .ok_or_else(|| AuthError::unavailable(anyhow!("seed field missing from secret store")))
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemorySecretStore;
    use crate::store::qr::QrImageRenderer;
    use crate::totp::code::{derive_code, STEP_SECONDS};
    use std::collections::HashMap;

    const SEED_BASE32: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ"; // "12345678901234567890"

    async fn service_with_seed() -> (TotpService, Arc<MemorySecretStore>) {
        let secrets = Arc::new(MemorySecretStore::new());
        secrets
            .write(
                &totp_seed_path("a@x.com"),
                HashMap::from([(SECRET_FIELD.to_string(), SEED_BASE32.to_string())]),
            )
            .await
            .expect("memory write");
        let service = TotpService::new(
            secrets.clone(),
            Arc::new(QrImageRenderer),
            "enlasi".to_string(),
        );
        (service, secrets)
    }

    #[tokio::test]
    async fn accepts_codes_inside_window_only() -> Result<(), AuthError> {
        let (service, _secrets) = service_with_seed().await;
        let now = 1000 * STEP_SECONDS;

        for counter in 999..=1001_u64 {
            let code = derive_code(b"12345678901234567890", counter).map_err(AuthError::unavailable)?;
            assert!(service.is_code_correct_at("a@x.com", &code, now).await?);
        }
        let stale = derive_code(b"12345678901234567890", 998).map_err(AuthError::unavailable)?;
        assert!(!service.is_code_correct_at("a@x.com", &stale, now).await?);
        Ok(())
    }

    #[tokio::test]
    async fn missing_seed_is_not_found() {
        let secrets: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let service = TotpService::new(secrets, Arc::new(QrImageRenderer), "enlasi".to_string());

        let result = service.is_code_correct_at("nobody@x.com", "000000", 0).await;
        assert!(matches!(result, Err(AuthError::NotFound)));
    }

    #[tokio::test]
    async fn provisioning_qr_is_png() -> Result<(), AuthError> {
        let (service, _secrets) = service_with_seed().await;
        let png = service.provisioning_qr("a@x.com").await?;
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
        Ok(())
    }
}
