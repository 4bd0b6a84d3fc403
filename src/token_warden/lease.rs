//! Per-user refresh lease
//!
//! Two concurrent refreshes for the same user can each mint a token and
//! clobber the other's write, so refreshes are serialized across the
//! whole deployment through a row-level lease acquired by conditional
//! write.

use crate::error::Result;
use chrono::Utc;
use sqlx::MySqlPool;
use uuid::Uuid;

/// A held lease. Release it on every exit path.
#[derive(Debug, Clone)]
pub struct TokenRefreshLease {
    pub user_id: String,
    pub lease_id: String,
    /// Epoch seconds; an expired lease is free for the taking
    pub lease_until: i64,
}

/// Lease repository
#[derive(Clone)]
pub struct LeaseRepository {
    pool: MySqlPool,
}

impl LeaseRepository {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Try to acquire the refresh lease for a user.
    ///
    /// The upsert only steals the row when the previous lease has
    /// expired; the read-back confirms whether our lease id won.
    pub async fn acquire(
        &self,
        user_id: &str,
        ttl_seconds: i64,
    ) -> Result<Option<TokenRefreshLease>> {
        let now = Utc::now().timestamp();
        let lease_id = Uuid::new_v4().to_string();
        let lease_until = now + ttl_seconds;

        // Assignment order matters: lease_id is decided against the old
        // lease_until before lease_until itself is rewritten.
        sqlx::query(
            r#"
            INSERT INTO token_refresh_leases (user_id, lease_id, lease_until)
            VALUES (?, ?, ?)
            ON DUPLICATE KEY UPDATE
                lease_id = IF(lease_until < ?, VALUES(lease_id), lease_id),
                lease_until = IF(lease_until < ?, VALUES(lease_until), lease_until)
            "#,
        )
        .bind(user_id)
        .bind(&lease_id)
        .bind(lease_until)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let holder: Option<(String,)> =
            sqlx::query_as("SELECT lease_id FROM token_refresh_leases WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        match holder {
            Some((held,)) if held == lease_id => Ok(Some(TokenRefreshLease {
                user_id: user_id.to_string(),
                lease_id,
                lease_until,
            })),
            _ => Ok(None),
        }
    }

    /// Release a held lease. Guarded on the lease id so a lease that
    /// expired and was re-acquired elsewhere is never released by us.
    pub async fn release(&self, lease: &TokenRefreshLease) -> Result<()> {
        sqlx::query(
            "UPDATE token_refresh_leases SET lease_until = 0 WHERE user_id = ? AND lease_id = ?",
        )
        .bind(&lease.user_id)
        .bind(&lease.lease_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
