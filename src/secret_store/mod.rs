//! SecretStore - Token Material Persistence
//!
//! ## Responsibilities
//!
//! - Opaque-ref secret rows (per-user OAuth token material)
//! - Upsert / read / delete; single-writer discipline is the warden's
//!   lease, readers are unbounded
//!
//! Token material never lives in the registry tables; `User.token_ref`
//! points here.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;

/// Per-user OAuth token material
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenMaterial {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch seconds
    pub expires_at: i64,
}

/// SecretStore instance
#[derive(Clone)]
pub struct SecretStore {
    pool: MySqlPool,
}

impl SecretStore {
    /// Create new SecretStore
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Read token material by opaque ref
    pub async fn get_token_material(&self, secret_ref: &str) -> Result<Option<TokenMaterial>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT payload FROM secrets WHERE secret_ref = ?")
                .bind(secret_ref)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((payload,)) => Ok(Some(serde_json::from_value(payload)?)),
            None => Ok(None),
        }
    }

    /// Write token material (insert or replace)
    pub async fn put_token_material(
        &self,
        secret_ref: &str,
        material: &TokenMaterial,
    ) -> Result<()> {
        let payload = serde_json::to_value(material)?;
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO secrets (secret_ref, payload, updated_at)
            VALUES (?, ?, ?)
            ON DUPLICATE KEY UPDATE payload = ?, updated_at = ?
            "#,
        )
        .bind(secret_ref)
        .bind(&payload)
        .bind(now)
        .bind(&payload)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a secret (user disconnect)
    pub async fn delete(&self, secret_ref: &str) -> Result<()> {
        sqlx::query("DELETE FROM secrets WHERE secret_ref = ?")
            .bind(secret_ref)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
