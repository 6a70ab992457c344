use secrecy::SecretString;
use std::time::Duration;

/// Configuration shared across the server wiring: secret-store access, mail
/// transport, and token lifetimes. Secrets stay wrapped until the adapter
/// that needs them.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub vault_url: String,
    pub vault_mount: String,
    pub vault_token: SecretString,
    pub mail_sender: String,
    pub mail_relay_url: Option<String>,
    pub mail_api_key: SecretString,
    pub issuer: Option<String>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(vault_url: String) -> Self {
        Self {
            vault_url,
            vault_mount: "secret".to_string(),
            vault_token: SecretString::default(),
            mail_sender: String::new(),
            mail_relay_url: None,
            mail_api_key: SecretString::default(),
            issuer: None,
            access_ttl: Duration::from_secs(900),
            refresh_ttl: Duration::from_secs(86_400),
        }
    }

    pub fn set_token(&mut self, token: SecretString) {
        self.vault_token = token;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new("https://localhost:8200".to_string());
        assert_eq!(args.vault_url, "https://localhost:8200");
        assert_eq!(args.vault_mount, "secret");
        assert_eq!(args.vault_token.expose_secret(), "");
        assert_eq!(args.access_ttl, Duration::from_secs(900));
        assert_eq!(args.refresh_ttl, Duration::from_secs(86_400));
    }
}
