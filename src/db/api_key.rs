//! Issued API key tracking for revocation.
//!
//! The key itself is a signed JWT handed to the customer once. Only its JTI,
//! owner and lifecycle timestamps are stored.

use sqlx::sqlite::SqlitePool;
use std::time::{SystemTime, UNIX_EPOCH};

/// A stored API key record. Timestamps are Unix seconds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKeyRecord {
    pub key_id: String,
    pub customer_id: String,
    pub name: Option<String>,
    pub issued_at: i64,
    pub expires_at: i64,
    pub revoked_at: Option<i64>,
    pub last_used_at: Option<i64>,
}

impl ApiKeyRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

pub struct ApiKeyStore {
    pool: SqlitePool,
}

impl ApiKeyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a newly issued key.
    pub async fn create(
        &self,
        key_id: &str,
        customer_id: &str,
        name: Option<&str>,
        issued_at: u64,
        expires_at: u64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO api_keys (key_id, customer_id, name, issued_at, expires_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(key_id)
        .bind(customer_id)
        .bind(name)
        .bind(issued_at as i64)
        .bind(expires_at as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a key by its JWT ID, revoked or not.
    pub async fn get(&self, key_id: &str) -> Result<Option<ApiKeyRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT key_id, customer_id, name, issued_at, expires_at, revoked_at, last_used_at FROM api_keys WHERE key_id = ?",
        )
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Record that the key was just used to authenticate.
    pub async fn touch(&self, key_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE key_id = ?")
            .bind(unix_now())
            .bind(key_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark a key revoked. Returns false if it was unknown or already revoked.
    pub async fn revoke(&self, key_id: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE api_keys SET revoked_at = ? WHERE key_id = ? AND revoked_at IS NULL")
                .bind(unix_now())
                .bind(key_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List unexpired keys for a customer, newest first.
    pub async fn list_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<ApiKeyRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT key_id, customer_id, name, issued_at, expires_at, revoked_at, last_used_at FROM api_keys WHERE customer_id = ? AND expires_at >= ? ORDER BY issued_at DESC, key_id",
        )
        .bind(customer_id)
        .bind(unix_now())
        .fetch_all(&self.pool)
        .await
    }

    /// Delete all expired keys.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM api_keys WHERE expires_at < ?")
            .bind(unix_now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
