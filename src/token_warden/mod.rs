//! TokenWarden - Access-Token Freshness
//!
//! ## Responsibilities
//!
//! - Periodic refresh of every connected user's access token before
//!   expiry
//! - Per-user deployment-wide lease (refreshes are serialized)
//! - In-process read-through cache for consumers (orchestrator, reaper)
//! - `invalid_grant` handling: disconnect the user and alert
//!
//! ## Design
//!
//! - A failure for one user never aborts the tick; the loop isolates
//!   per-user outcomes and reports counters
//! - Consumers that observe an already-expired token trigger the refresh
//!   path synchronously instead of waiting for the next tick

mod cache;
mod lease;

pub use cache::{TokenCache, CACHE_TTL_CAP_SECONDS};
pub use lease::{LeaseRepository, TokenRefreshLease};

use crate::error::{Error, Result};
use crate::music_adapter::MusicService;
use crate::registry::{Registry, User};
use crate::retry;
use crate::secret_store::{SecretStore, TokenMaterial};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Refresh-lease TTL; long enough to cover a slow OAuth round trip
const LEASE_TTL_SECONDS: i64 = 60;
/// Refresh when less than this many seconds of validity remain
const SAFETY_MARGIN_SECONDS: i64 = 300;
/// Below this remaining validity a consumer-side read refreshes inline
const SYNC_REFRESH_FLOOR_SECONDS: i64 = 30;
/// Per-tick fan-out cap
const MAX_CONCURRENT_REFRESHES: usize = 10;

/// Per-user outcome within one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOutcome {
    Refreshed,
    Skipped,
    Failed,
    Disconnected,
}

/// TokenWarden instance
pub struct TokenWarden {
    registry: Arc<Registry>,
    secrets: SecretStore,
    music: Arc<dyn MusicService>,
    leases: LeaseRepository,
    cache: TokenCache,
    tick_seconds: u64,
    running: Arc<RwLock<bool>>,
}

impl TokenWarden {
    /// Create new TokenWarden
    pub fn new(
        registry: Arc<Registry>,
        secrets: SecretStore,
        music: Arc<dyn MusicService>,
        leases: LeaseRepository,
        tick_seconds: u64,
    ) -> Self {
        Self {
            registry,
            secrets,
            music,
            leases,
            cache: TokenCache::new(),
            tick_seconds,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the refresh loop
    pub fn start(self: Arc<Self>) {
        let warden = self;
        tokio::spawn(async move {
            {
                let mut running = warden.running.write().await;
                if *running {
                    tracing::warn!("Token warden already running");
                    return;
                }
                *running = true;
            }

            tracing::info!(
                tick_seconds = warden.tick_seconds,
                safety_margin_seconds = SAFETY_MARGIN_SECONDS,
                "Token warden started"
            );

            let mut interval = tokio::time::interval(Duration::from_secs(warden.tick_seconds));
            loop {
                interval.tick().await;
                {
                    let is_running = warden.running.read().await;
                    if !*is_running {
                        break;
                    }
                }
                warden.run_tick().await;
            }

            tracing::info!("Token warden stopped");
        });
    }

    /// Stop the refresh loop
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    /// One pass over all connected users
    pub async fn run_tick(&self) {
        let users = match self.registry.service().list_connected_users().await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(error = %e, "Token warden tick: user listing failed");
                return;
            }
        };

        let total = users.len();
        let outcomes: Vec<RefreshOutcome> = futures::stream::iter(users)
            .map(|user| async move { self.refresh_user(&user).await })
            .buffer_unordered(MAX_CONCURRENT_REFRESHES)
            .collect()
            .await;

        let refreshed = outcomes.iter().filter(|o| **o == RefreshOutcome::Refreshed).count();
        let skipped = outcomes.iter().filter(|o| **o == RefreshOutcome::Skipped).count();
        let failed = outcomes.iter().filter(|o| **o == RefreshOutcome::Failed).count();
        let disconnected = outcomes
            .iter()
            .filter(|o| **o == RefreshOutcome::Disconnected)
            .count();

        tracing::info!(
            users = total,
            refreshed = refreshed,
            skipped = skipped,
            failed = failed,
            disconnected = disconnected,
            "Token warden tick completed"
        );
    }

    /// Refresh one user, isolating every failure
    async fn refresh_user(&self, user: &User) -> RefreshOutcome {
        let now = chrono::Utc::now().timestamp();

        let material = match self.load_material(user).await {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(user_id = %user.user_id, error = %e, "Token material unavailable");
                return RefreshOutcome::Failed;
            }
        };

        if material.expires_at - now > SAFETY_MARGIN_SECONDS {
            return RefreshOutcome::Skipped;
        }

        match self.refresh_with_lease(user, &material).await {
            Ok(Some(_)) => RefreshOutcome::Refreshed,
            // Lease held elsewhere; that holder is doing the work
            Ok(None) => RefreshOutcome::Skipped,
            Err(Error::AuthExpired(msg)) => {
                self.handle_revoked_grant(user, &msg).await;
                RefreshOutcome::Disconnected
            }
            Err(e) => {
                tracing::warn!(user_id = %user.user_id, error = %e, "Token refresh failed");
                RefreshOutcome::Failed
            }
        }
    }

    /// Refresh under the deployment-wide lease.
    ///
    /// Returns Ok(None) when the lease is held elsewhere. The lease is
    /// released on every exit path, including refresh errors.
    async fn refresh_with_lease(
        &self,
        user: &User,
        material: &TokenMaterial,
    ) -> Result<Option<TokenMaterial>> {
        let lease = match self.leases.acquire(&user.user_id, LEASE_TTL_SECONDS).await? {
            Some(lease) => lease,
            None => return Ok(None),
        };

        // Re-read under the lease: a previous holder may have refreshed
        // between our staleness check and the acquire
        let result = match self.load_material(user).await {
            Ok(current) if current.expires_at > material.expires_at => Ok(current),
            Ok(current) => self.do_refresh(user, &current).await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.leases.release(&lease).await {
            tracing::warn!(user_id = %user.user_id, error = %e, "Lease release failed");
        }

        result.map(Some)
    }

    /// The actual OAuth exchange and write-back
    async fn do_refresh(&self, user: &User, material: &TokenMaterial) -> Result<TokenMaterial> {
        let token_ref = user
            .token_ref
            .as_deref()
            .ok_or_else(|| Error::Internal(format!("User {} has no token_ref", user.user_id)))?;

        let refreshed = retry::with_backoff("refresh_access_token", || {
            self.music.refresh_access_token(&material.refresh_token)
        })
        .await?;

        let new_material = TokenMaterial {
            access_token: refreshed.access_token,
            // Preserve the refresh token unless the service rotated it
            refresh_token: refreshed
                .refresh_token
                .unwrap_or_else(|| material.refresh_token.clone()),
            expires_at: refreshed.expires_at,
        };

        self.secrets.put_token_material(token_ref, &new_material).await?;
        self.cache.invalidate(&user.user_id).await;

        let now = chrono::Utc::now().timestamp();
        self.cache
            .put(&user.user_id, &new_material.access_token, new_material.expires_at, now)
            .await;

        tracing::info!(
            user_id = %user.user_id,
            expires_at = new_material.expires_at,
            "Access token refreshed"
        );

        Ok(new_material)
    }

    /// Revoked refresh token: disconnect and alert, never retry this tick
    async fn handle_revoked_grant(&self, user: &User, reason: &str) {
        tracing::error!(
            user_id = %user.user_id,
            reason = reason,
            alert = true,
            "Refresh token revoked; disconnecting music account"
        );

        self.cache.invalidate(&user.user_id).await;
        if let Err(e) = self.registry.service().disconnect_music(&user.user_id).await {
            tracing::error!(user_id = %user.user_id, error = %e, "Music disconnect failed");
        }
    }

    /// Read-through access-token lookup for consumers.
    ///
    /// Cache hit is the fast path. On miss the per-user flight mutex is
    /// taken so concurrent consumers do a single secret-store read (or a
    /// single inline refresh when the stored token is already stale).
    pub async fn get_access_token(&self, user: &User) -> Result<String> {
        let now = chrono::Utc::now().timestamp();

        if let Some(token) = self.cache.get(&user.user_id, now).await {
            return Ok(token);
        }

        let flight = self.cache.flight(&user.user_id).await;
        let _guard = flight.lock().await;

        // A racer may have filled the cache while we waited
        let now = chrono::Utc::now().timestamp();
        if let Some(token) = self.cache.get(&user.user_id, now).await {
            return Ok(token);
        }

        let material = self.load_material(user).await?;

        if material.expires_at - now > SYNC_REFRESH_FLOOR_SECONDS {
            self.cache
                .put(&user.user_id, &material.access_token, material.expires_at, now)
                .await;
            return Ok(material.access_token);
        }

        // Stored token is stale: refresh inline rather than waiting for
        // the next tick
        match self.refresh_with_lease(user, &material).await {
            Ok(Some(fresh)) => Ok(fresh.access_token),
            Ok(None) => {
                // Another node is refreshing right now; its write may
                // already have landed
                let rechecked = self.load_material(user).await?;
                if rechecked.expires_at > now {
                    Ok(rechecked.access_token)
                } else {
                    Err(Error::Transient(format!(
                        "Token for {} is being refreshed elsewhere",
                        user.user_id
                    )))
                }
            }
            Err(Error::AuthExpired(msg)) => {
                self.handle_revoked_grant(user, &msg).await;
                Err(Error::AuthExpired(msg))
            }
            Err(e) => Err(e),
        }
    }

    async fn load_material(&self, user: &User) -> Result<TokenMaterial> {
        let token_ref = user.token_ref.as_deref().ok_or_else(|| {
            Error::AuthExpired(format!("User {} has no music connection", user.user_id))
        })?;

        self.secrets
            .get_token_material(token_ref)
            .await?
            .ok_or_else(|| {
                Error::Internal(format!(
                    "token_ref {} for user {} resolves to no secret",
                    token_ref, user.user_id
                ))
            })
    }
}
