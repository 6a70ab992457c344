//! Identity records in Postgres.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE users (
//!     email      TEXT PRIMARY KEY,
//!     id         UUID NOT NULL,
//!     deployer   UUID NOT NULL,
//!     cert_print TEXT NOT NULL,
//!     verified   BOOL NOT NULL DEFAULT FALSE,
//!     banned     BOOL NOT NULL DEFAULT FALSE,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use super::{Identity, IdentityStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info_span, Instrument};

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn exists(&self, email: &str) -> Result<bool> {
        let query = "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let exists: bool = sqlx::query_scalar(query)
            .bind(email)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to check identity existence")?;

        Ok(exists)
    }

    async fn create(&self, identity: &Identity) -> Result<()> {
        let query = r"
            INSERT INTO users (email, id, deployer, cert_print, verified, banned, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&identity.email)
            .bind(identity.id)
            .bind(identity.deployer)
            .bind(&identity.cert_print)
            .bind(identity.verified)
            .bind(identity.banned)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to create identity")?;

        Ok(())
    }

    async fn mark_verified(&self, email: &str) -> Result<()> {
        let query = "UPDATE users SET verified = TRUE WHERE email = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark identity verified")?;

        Ok(())
    }
}
