//! Secret material in Vault KV v2.

use super::{SecretStore, STORE_TIMEOUT};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info_span, Instrument};

pub struct VaultSecretStore {
    client: Client,
    base_url: String,
    mount: String,
    token: SecretString,
}

impl VaultSecretStore {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, mount: &str, token: SecretString) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(STORE_TIMEOUT)
            .build()
            .context("failed to build vault client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            mount: mount.to_string(),
            token,
        })
    }

    fn data_url(&self, path: &str) -> String {
        format!("{}/v1/{}/data/{}", self.base_url, self.mount, path)
    }
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn write(&self, path: &str, fields: HashMap<String, String>) -> Result<()> {
        let url = self.data_url(path);
        let span = info_span!("vault.kv.write", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .header("X-Vault-Token", self.token.expose_secret())
            .json(&json!({ "data": fields }))
            .send()
            .instrument(span)
            .await
            .context("vault kv write request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("vault kv write failed: {status} {body}"));
        }

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<HashMap<String, String>>> {
        let url = self.data_url(path);
        let span = info_span!("vault.kv.read", http.method = "GET", url = %url);
        let response = self
            .client
            .get(&url)
            .header("X-Vault-Token", self.token.expose_secret())
            .send()
            .instrument(span)
            .await
            .context("vault kv read request failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("vault kv read failed: {status} {body}"));
        }

        let payload: Value = response
            .json()
            .await
            .context("vault kv read returned invalid json")?;
        let data = payload
            .get("data")
            .and_then(|data| data.get("data"))
            .and_then(Value::as_object)
            .context("vault kv response missing data")?;

        let fields = data
            .iter()
            .filter_map(|(key, value)| {
                value
                    .as_str()
                    .map(|value| (key.clone(), value.to_string()))
            })
            .collect();

        Ok(Some(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_targets_kv_v2() -> Result<()> {
        let store = VaultSecretStore::new(
            "https://vault.tld:8200/",
            "secret",
            SecretString::from("token"),
        )?;
        assert_eq!(
            store.data_url("users/totp/seed/a@x.com"),
            "https://vault.tld:8200/v1/secret/data/users/totp/seed/a@x.com"
        );
        Ok(())
    }
}
