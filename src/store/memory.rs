//! In-memory adapters for local development and tests.
//!
//! These honor the same contracts as the real backends, including TTL expiry
//! and the atomic set-if-absent gate, so the orchestrator and rotation logic
//! can be exercised without external services.

use super::{EphemeralStore, Identity, IdentityStore, MailDispatcher, SecretStore};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    rows: Mutex<HashMap<String, Identity>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one row, for assertions.
    #[must_use]
    pub fn get(&self, email: &str) -> Option<Identity> {
        lock(&self.rows).get(email).cloned()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn exists(&self, email: &str) -> Result<bool> {
        Ok(lock(&self.rows).contains_key(email))
    }

    async fn create(&self, identity: &Identity) -> Result<()> {
        let mut rows = lock(&self.rows);
        if rows.contains_key(&identity.email) {
            return Err(anyhow!("duplicate identity: {}", identity.email));
        }
        rows.insert(identity.email.clone(), identity.clone());
        Ok(())
    }

    async fn mark_verified(&self, email: &str) -> Result<()> {
        let mut rows = lock(&self.rows);
        match rows.get_mut(email) {
            Some(identity) => {
                identity.verified = true;
                Ok(())
            }
            None => Err(anyhow!("no identity for {email}")),
        }
    }
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Default)]
pub struct MemoryEphemeralStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryEphemeralStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a key past its TTL, for expiry tests.
    pub fn expire(&self, key: &str) {
        if let Some(entry) = lock(&self.entries).get_mut(key) {
            entry.expires_at = Instant::now();
        }
    }
}

#[async_trait]
impl EphemeralStore for MemoryEphemeralStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(lock(&self.entries).get(key).is_some_and(Entry::live))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.entries)
            .get(key)
            .filter(|entry| entry.live())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        lock(&self.entries).insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut entries = lock(&self.entries);
        if entries.get(key).is_some_and(Entry::live) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySecretStore {
    paths: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn write(&self, path: &str, fields: HashMap<String, String>) -> Result<()> {
        lock(&self.paths).insert(path.to_string(), fields);
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<HashMap<String, String>>> {
        Ok(lock(&self.paths).get(path).cloned())
    }
}

/// Captures outbound messages; can be toggled to fail for compensating-action
/// tests.
#[derive(Default)]
pub struct MemoryMailDispatcher {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    fail: AtomicBool,
}

impl MemoryMailDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Messages accepted so far, in dispatch order.
    #[must_use]
    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.sent).clone()
    }

    /// The last message body as text, for code extraction in tests.
    #[must_use]
    pub fn last_message_text(&self) -> Option<String> {
        lock(&self.sent)
            .last()
            .map(|(_, bytes)| String::from_utf8_lossy(bytes).to_string())
    }
}

#[async_trait]
impl MailDispatcher for MemoryMailDispatcher {
    async fn send(&self, to: &str, message: &[u8]) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("mail transport unavailable"));
        }
        lock(&self.sent).push((to.to_string(), message.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_ttl_and_nx_semantics() -> Result<()> {
        let store = MemoryEphemeralStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.set_if_absent("k", "v1", ttl).await?);
        assert!(!store.set_if_absent("k", "v2", ttl).await?);
        assert_eq!(store.get("k").await?.as_deref(), Some("v1"));

        store.expire("k");
        assert!(!store.exists("k").await?);
        assert!(store.set_if_absent("k", "v3", ttl).await?);
        Ok(())
    }

    #[tokio::test]
    async fn identity_store_rejects_duplicates() -> Result<()> {
        let store = MemoryIdentityStore::new();
        let identity = Identity {
            email: "a@x.com".to_string(),
            id: uuid::Uuid::new_v4(),
            deployer: uuid::Uuid::new_v4(),
            cert_print: "print".to_string(),
            verified: false,
            banned: false,
        };
        store.create(&identity).await?;
        assert!(store.exists("a@x.com").await?);
        assert!(store.create(&identity).await.is_err());

        store.mark_verified("a@x.com").await?;
        assert!(store.get("a@x.com").is_some_and(|row| row.verified));
        Ok(())
    }
}
