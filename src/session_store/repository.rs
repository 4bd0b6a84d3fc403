//! Session store repository
//!
//! All update paths that could race use conditional writes. The "at most
//! one active session per sensor" invariant is enforced by the unique
//! index on `active_key` (NULL rows never collide in MySQL).

use super::types::*;
use crate::error::{Error, Result};
use sqlx::MySqlPool;

/// Session repository for database operations
#[derive(Clone)]
pub struct SessionRepository {
    pool: MySqlPool,
}

/// Outcome of a resolve-or-open call
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session: Session,
    /// True when this call created the row, false when an existing active
    /// session was adopted
    pub opened: bool,
}

impl SessionRepository {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Session SELECT columns
    const SESSION_COLUMNS: &'static str = r#"
        session_id, sensor_id, user_id, status, active_key,
        start_at, last_motion_at, end_at, motion_count,
        playback_started, duration_seconds, expire_at,
        created_at, updated_at
    "#;

    /// Get session by ID
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let query = format!(
            "SELECT {} FROM sessions WHERE session_id = ?",
            Self::SESSION_COLUMNS
        );
        let session = sqlx::query_as::<_, Session>(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    /// Get the active session for a sensor, if any
    pub async fn get_active_session(&self, sensor_id: &str) -> Result<Option<Session>> {
        let query = format!(
            "SELECT {} FROM sessions WHERE active_key = ?",
            Self::SESSION_COLUMNS
        );
        let session = sqlx::query_as::<_, Session>(&query)
            .bind(sensor_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    /// Resolve-or-open the active session for a sensor.
    ///
    /// The insert is conditional on the `active_key` unique index; losing
    /// the race means another handler opened the session first, and that
    /// row is adopted instead.
    pub async fn open_or_adopt_session(
        &self,
        sensor_id: &str,
        user_id: &str,
        occurred_at: i64,
        retention_seconds: i64,
    ) -> Result<SessionHandle> {
        if let Some(existing) = self.get_active_session(sensor_id).await? {
            return Ok(SessionHandle {
                session: existing,
                opened: false,
            });
        }

        let session_id = generate_session_id(sensor_id, occurred_at);
        let now = chrono::Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO sessions (
                session_id, sensor_id, user_id, status, active_key,
                start_at, last_motion_at, end_at, motion_count,
                playback_started, duration_seconds, expire_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, 'active', ?, ?, ?, NULL, 1, FALSE, NULL, ?, ?, ?)
            "#,
        )
        .bind(&session_id)
        .bind(sensor_id)
        .bind(user_id)
        .bind(sensor_id)
        .bind(occurred_at)
        .bind(occurred_at)
        .bind(occurred_at + retention_seconds)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                let session = self
                    .get_session(&session_id)
                    .await?
                    .ok_or(Error::Internal("Session vanished after insert".to_string()))?;
                Ok(SessionHandle {
                    session,
                    opened: true,
                })
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                // Lost the open race; adopt the winner's session
                let session = self.get_active_session(sensor_id).await?.ok_or(
                    Error::Conflict(format!(
                        "Active-session race for {} resolved to no session",
                        sensor_id
                    )),
                )?;
                Ok(SessionHandle {
                    session,
                    opened: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record an admitted motion on an active session.
    ///
    /// `motion_count` converges under concurrency via the in-place
    /// increment; `last_motion_at` only moves forward. Returns false when
    /// the session was closed in the meantime.
    pub async fn record_motion(&self, session_id: &str, occurred_at: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET motion_count = motion_count + 1,
                last_motion_at = GREATEST(last_motion_at, ?),
                updated_at = ?
            WHERE session_id = ? AND status = 'active'
            "#,
        )
        .bind(occurred_at)
        .bind(chrono::Utc::now())
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark that playback was actually started for this session
    pub async fn mark_playback_started(&self, session_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET playback_started = TRUE, updated_at = ? WHERE session_id = ?",
        )
        .bind(chrono::Utc::now())
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close a session: conditional transition from `active` to
    /// `completed`. Returns false on conflict (someone else closed it) —
    /// callers drop silently.
    pub async fn close_session(&self, session_id: &str, end_at: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'completed',
                active_key = NULL,
                end_at = ?,
                duration_seconds = ? - start_at,
                updated_at = ?
            WHERE session_id = ? AND status = 'active'
            "#,
        )
        .bind(end_at)
        .bind(end_at)
        .bind(chrono::Utc::now())
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List all active sessions (reaper scan; served by the
    /// `(status, last_motion_at)` index, never a full-table walk)
    pub async fn list_active_sessions(&self) -> Result<Vec<Session>> {
        let query = format!(
            "SELECT {} FROM sessions WHERE status = 'active' ORDER BY last_motion_at",
            Self::SESSION_COLUMNS
        );
        let sessions = sqlx::query_as::<_, Session>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(sessions)
    }

    /// Recent sessions for a sensor, newest first
    pub async fn list_sessions_by_sensor(
        &self,
        sensor_id: &str,
        limit: i64,
    ) -> Result<Vec<Session>> {
        let query = format!(
            "SELECT {} FROM sessions WHERE sensor_id = ? ORDER BY start_at DESC LIMIT ?",
            Self::SESSION_COLUMNS
        );
        let sessions = sqlx::query_as::<_, Session>(&query)
            .bind(sensor_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(sessions)
    }

    // ========================================
    // Motion events (append-only audit log)
    // ========================================

    /// Insert one audit row
    pub async fn insert_motion_event(
        &self,
        ev: &NewMotionEvent,
        retention_seconds: i64,
    ) -> Result<String> {
        let event_id = generate_event_id(&ev.sensor_id, ev.occurred_at);
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO motion_events (
                event_id, sensor_id, user_id, session_id, occurred_at,
                event_type, action_taken,
                battery_level, signal_strength, firmware_version,
                clock_rederived, expire_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event_id)
        .bind(&ev.sensor_id)
        .bind(&ev.user_id)
        .bind(&ev.session_id)
        .bind(ev.occurred_at)
        .bind(ev.event_type.as_str())
        .bind(&ev.action_taken)
        .bind(ev.metadata.battery_level)
        .bind(ev.metadata.signal_strength)
        .bind(&ev.metadata.firmware_version)
        .bind(ev.metadata.clock_rederived)
        .bind(ev.occurred_at + retention_seconds)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(event_id)
    }

    /// Recent audit rows for a sensor, newest first
    pub async fn list_motion_events(
        &self,
        sensor_id: &str,
        limit: i64,
    ) -> Result<Vec<MotionEvent>> {
        let events = sqlx::query_as::<_, MotionEvent>(
            r#"
            SELECT event_id, sensor_id, user_id, session_id, occurred_at,
                   event_type, action_taken,
                   battery_level, signal_strength, firmware_version,
                   clock_rederived, expire_at, created_at
            FROM motion_events
            WHERE sensor_id = ?
            ORDER BY occurred_at DESC
            LIMIT ?
            "#,
        )
        .bind(sensor_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    // ========================================
    // Retention
    // ========================================

    /// Delete a bounded batch of expired rows. Stands in for the managed
    /// store's TTL attribute; called from the reaper tick.
    pub async fn purge_expired(&self, now: i64, limit: i64) -> Result<(u64, u64)> {
        let sessions = sqlx::query(
            "DELETE FROM sessions WHERE expire_at < ? AND status = 'completed' LIMIT ?",
        )
        .bind(now)
        .bind(limit)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let events = sqlx::query("DELETE FROM motion_events WHERE expire_at < ? LIMIT ?")
            .bind(now)
            .bind(limit)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok((sessions, events))
    }
}
