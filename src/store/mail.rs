//! Verification mail construction and delivery adapters.
//!
//! Message construction (subject, templated HTML body, MIME headers) happens
//! here; the dispatcher only moves bytes. `LogMailDispatcher` is the local
//! dev default, `HttpMailDispatcher` posts the raw message to a relay
//! endpoint.

use super::{MailDispatcher, STORE_TIMEOUT};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, info_span, Instrument};

pub const VERIFICATION_SUBJECT: &str = "Verify Your Email Address";

const VERIFICATION_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Email Verification</title></head>
<body style="margin: 0; padding: 0; font-family: 'Segoe UI', Arial, sans-serif;">
  <p>Hello!</p>
  <p>Thank you for registering. To continue, enter the following 6-digit
  verification code:</p>
  <p style="font-size: 32px; font-weight: bold; letter-spacing: 8px;">{code}</p>
  <p>This code expires in 2 minutes. If you didn't request it, ignore this
  email.</p>
</body>
</html>
"#;

/// Build the full MIME message carrying the verification code.
#[must_use]
pub fn build_verification_message(sender: &str, to: &str, code: &str) -> Vec<u8> {
    let html = VERIFICATION_TEMPLATE.replace("{code}", code);

    let mut message = String::new();
    message.push_str(&format!("From: {sender}\r\n"));
    message.push_str(&format!("To: {to}\r\n"));
    message.push_str(&format!("Subject: {VERIFICATION_SUBJECT}\r\n"));
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str("Content-Type: text/html; charset=\"utf-8\"\r\n");
    message.push_str("Content-Transfer-Encoding: 7bit\r\n");
    message.push_str("\r\n");
    message.push_str(&html);
    message.push_str("\r\n");

    message.into_bytes()
}

/// Dev transport: logs the delivery instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogMailDispatcher;

#[async_trait]
impl MailDispatcher for LogMailDispatcher {
    async fn send(&self, to: &str, message: &[u8]) -> Result<()> {
        info!(to, bytes = message.len(), "mail dispatch stub");
        Ok(())
    }
}

/// Posts the raw RFC 822 message to an HTTP mail relay.
pub struct HttpMailDispatcher {
    client: Client,
    endpoint: String,
    api_key: SecretString,
}

impl HttpMailDispatcher {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: &str, api_key: SecretString) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(STORE_TIMEOUT)
            .build()
            .context("failed to build mail relay client")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl MailDispatcher for HttpMailDispatcher {
    async fn send(&self, to: &str, message: &[u8]) -> Result<()> {
        let span = info_span!("mail.relay.send", to, endpoint = %self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose_secret())
            .header("content-type", "message/rfc822")
            .query(&[("to", to)])
            .body(message.to_vec())
            .send()
            .instrument(span)
            .await
            .context("mail relay request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("mail relay rejected message: {}", response.status()));
        }

        Ok(())
    }
}
