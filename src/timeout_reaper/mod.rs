//! TimeoutReaper - Inactivity Session Closure
//!
//! ## Responsibilities
//!
//! - Periodic scan of active sessions (status-indexed, never a full
//!   table walk)
//! - Close sessions whose last motion is older than the owning sensor's
//!   timeout: pause playback, conditional transition, audit row
//! - Bounded retention purge of expired sessions and audit rows
//!
//! ## Concurrency
//!
//! Multiple reaper instances may run; the conditional close makes the
//! transition idempotent. Pause failures never prevent the close — a
//! stuck-active session is worse than an un-paused device.

use crate::error::{Error, Result};
use crate::music_adapter::MusicService;
use crate::registry::Registry;
use crate::retry;
use crate::session_store::{
    EventMetadata, MotionEventType, NewMotionEvent, Session, SessionRepository,
};
use crate::token_warden::TokenWarden;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Per-tick fan-out cap
const MAX_CONCURRENT_CLOSES: usize = 10;
/// Rows deleted per retention sweep
const PURGE_BATCH: i64 = 500;

/// One tick's results
#[derive(Debug, Default, Clone, Copy)]
pub struct ReapSummary {
    pub scanned: usize,
    pub closed: usize,
    pub pause_failures: usize,
    pub purged_sessions: u64,
    pub purged_events: u64,
}

/// TimeoutReaper instance
pub struct TimeoutReaper {
    registry: Arc<Registry>,
    sessions: SessionRepository,
    warden: Arc<TokenWarden>,
    music: Arc<dyn MusicService>,
    tick_seconds: u64,
    retention_seconds: i64,
    running: Arc<RwLock<bool>>,
}

impl TimeoutReaper {
    /// Create new TimeoutReaper
    pub fn new(
        registry: Arc<Registry>,
        sessions: SessionRepository,
        warden: Arc<TokenWarden>,
        music: Arc<dyn MusicService>,
        tick_seconds: u64,
        retention_seconds: i64,
    ) -> Self {
        Self {
            registry,
            sessions,
            warden,
            music,
            tick_seconds,
            retention_seconds,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the reap loop
    pub fn start(self: Arc<Self>) {
        let reaper = self;
        tokio::spawn(async move {
            {
                let mut running = reaper.running.write().await;
                if *running {
                    tracing::warn!("Timeout reaper already running");
                    return;
                }
                *running = true;
            }

            tracing::info!(tick_seconds = reaper.tick_seconds, "Timeout reaper started");

            let mut interval = tokio::time::interval(Duration::from_secs(reaper.tick_seconds));
            loop {
                interval.tick().await;
                {
                    let is_running = reaper.running.read().await;
                    if !*is_running {
                        break;
                    }
                }

                let now = chrono::Utc::now().timestamp();
                match reaper.run_tick(now).await {
                    Ok(summary) => {
                        tracing::info!(
                            scanned = summary.scanned,
                            closed = summary.closed,
                            pause_failures = summary.pause_failures,
                            purged_sessions = summary.purged_sessions,
                            purged_events = summary.purged_events,
                            "Reaper tick completed"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Reaper tick failed");
                    }
                }
            }

            tracing::info!("Timeout reaper stopped");
        });
    }

    /// Stop the reap loop
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    /// One pass over active sessions at clock `now`
    pub async fn run_tick(&self, now: i64) -> Result<ReapSummary> {
        let active = self.sessions.list_active_sessions().await?;
        let scanned = active.len();

        let outcomes: Vec<(bool, bool)> = futures::stream::iter(active)
            .map(|session| async move {
                match self.reap_session(&session, now).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(
                            session_id = %session.session_id,
                            error = %e,
                            "Session reap failed"
                        );
                        (false, false)
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_CLOSES)
            .collect()
            .await;

        let closed = outcomes.iter().filter(|(closed, _)| *closed).count();
        let pause_failures = outcomes.iter().filter(|(_, failed)| *failed).count();

        let (purged_sessions, purged_events) =
            self.sessions.purge_expired(now, PURGE_BATCH).await?;

        Ok(ReapSummary {
            scanned,
            closed,
            pause_failures,
            purged_sessions,
            purged_events,
        })
    }

    /// Close one session if it has idled past its sensor's timeout.
    ///
    /// Returns `(closed, pause_failed)`.
    async fn reap_session(&self, session: &Session, now: i64) -> Result<(bool, bool)> {
        // The owning sensor is authoritative for the timeout. An orphaned
        // session (sensor deleted out from under it) closes immediately.
        let timeout = match self.registry.service().get_sensor(&session.sensor_id).await? {
            Some(sensor) => sensor.inactivity_timeout_seconds as i64,
            None => {
                tracing::warn!(
                    session_id = %session.session_id,
                    sensor_id = %session.sensor_id,
                    "Active session for deleted sensor, closing"
                );
                0
            }
        };

        if now - session.last_motion_at < timeout {
            return Ok((false, false));
        }

        let pause_failed = !self.pause_playback(session).await;

        // Conditional close: a conflict means the orchestrator or another
        // reaper got there first — drop silently
        if !self.sessions.close_session(&session.session_id, now).await? {
            tracing::debug!(
                session_id = %session.session_id,
                "Session already closed elsewhere"
            );
            return Ok((false, pause_failed));
        }

        self.sessions
            .insert_motion_event(
                &NewMotionEvent {
                    sensor_id: session.sensor_id.clone(),
                    user_id: session.user_id.clone(),
                    session_id: Some(session.session_id.clone()),
                    occurred_at: now,
                    event_type: MotionEventType::SessionClosed,
                    action_taken: "session-closed".to_string(),
                    metadata: EventMetadata::default(),
                },
                self.retention_seconds,
            )
            .await?;

        tracing::info!(
            session_id = %session.session_id,
            sensor_id = %session.sensor_id,
            idle_seconds = now - session.last_motion_at,
            duration_seconds = now - session.start_at,
            motion_count = session.motion_count,
            pause_failed = pause_failed,
            "Session closed on inactivity"
        );

        Ok((true, pause_failed))
    }

    /// Pause playback on the session's user/target. "Nothing to pause"
    /// (404 / no active device) is absorbed as success. Returns whether
    /// the pause is considered settled.
    async fn pause_playback(&self, session: &Session) -> bool {
        let user = match self.registry.service().get_user(&session.user_id).await {
            Ok(Some(user)) if user.music_connected => user,
            Ok(_) => return true,
            Err(e) => {
                tracing::warn!(user_id = %session.user_id, error = %e, "User lookup for pause failed");
                return false;
            }
        };

        let sensor = match self.registry.service().get_sensor(&session.sensor_id).await {
            Ok(Some(sensor)) => sensor,
            Ok(None) => return true,
            Err(e) => {
                tracing::warn!(sensor_id = %session.sensor_id, error = %e, "Sensor lookup for pause failed");
                return false;
            }
        };

        let token = match self.warden.get_access_token(&user).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(user_id = %user.user_id, error = %e, "Token for pause unavailable");
                return false;
            }
        };

        let result = retry::with_backoff("pause_playback", || {
            self.music
                .pause_playback(&token, &sensor.playback_target_id)
        })
        .await;

        match result {
            Ok(()) => true,
            // Already paused / device gone: settled
            Err(Error::NotFound(_)) => true,
            Err(e) => {
                tracing::warn!(
                    session_id = %session.session_id,
                    device_id = %sensor.playback_target_id,
                    error_kind = e.kind(),
                    error = %e,
                    "Pause failed; closing session regardless"
                );
                false
            }
        }
    }
}
