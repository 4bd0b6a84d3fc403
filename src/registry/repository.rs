//! Registry Repository
//!
//! Database access layer for sensors and users

use super::types::*;
use crate::error::{Error, Result};
use sqlx::MySqlPool;

/// Registry repository for database operations
#[derive(Clone)]
pub struct RegistryRepository {
    pool: MySqlPool,
}

impl RegistryRepository {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    // ========================================
    // Sensor CRUD
    // ========================================

    /// Sensor SELECT columns
    const SENSOR_COLUMNS: &'static str = r#"
        sensor_id, user_id, location_label, enabled,
        motion_debounce_seconds, inactivity_timeout_seconds,
        status_report_interval_seconds, led_enabled,
        quiet_start, quiet_end, quiet_tz,
        playback_target_id, playback_context_ref,
        last_motion_at, status, thing_handle, certificate_handle,
        firmware_version, created_at, updated_at
    "#;

    /// Get sensor by ID
    pub async fn get_sensor(&self, sensor_id: &str) -> Result<Option<Sensor>> {
        let query = format!(
            "SELECT {} FROM sensors WHERE sensor_id = ?",
            Self::SENSOR_COLUMNS
        );
        let sensor = sqlx::query_as::<_, Sensor>(&query)
            .bind(sensor_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sensor)
    }

    /// Get all sensors owned by a user
    pub async fn get_sensors_by_user(&self, user_id: &str) -> Result<Vec<Sensor>> {
        let query = format!(
            "SELECT {} FROM sensors WHERE user_id = ? ORDER BY sensor_id",
            Self::SENSOR_COLUMNS
        );
        let sensors = sqlx::query_as::<_, Sensor>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(sensors)
    }

    /// Create sensor record
    pub async fn create_sensor(
        &self,
        rec: &CreateSensorRecord,
        debounce: i32,
        timeout: i32,
        status_report_interval: i32,
        led_enabled: bool,
        quiet: Option<&QuietHours>,
    ) -> Result<Sensor> {
        let now = chrono::Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO sensors (
                sensor_id, user_id, location_label, enabled,
                motion_debounce_seconds, inactivity_timeout_seconds,
                status_report_interval_seconds, led_enabled,
                quiet_start, quiet_end, quiet_tz,
                playback_target_id, playback_context_ref,
                status, thing_handle, certificate_handle,
                created_at, updated_at
            ) VALUES (?, ?, ?, TRUE, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'registered', ?, ?, ?, ?)
            "#,
        )
        .bind(&rec.sensor_id)
        .bind(&rec.user_id)
        .bind(&rec.location_label)
        .bind(debounce)
        .bind(timeout)
        .bind(status_report_interval)
        .bind(led_enabled)
        .bind(quiet.map(|q| q.start.clone()))
        .bind(quiet.map(|q| q.end.clone()))
        .bind(quiet.map(|q| q.timezone.clone()))
        .bind(&rec.playback_target_id)
        .bind(&rec.playback_context_ref)
        .bind(&rec.thing_handle)
        .bind(&rec.certificate_handle)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(Error::Conflict(format!(
                    "Sensor {} already exists",
                    rec.sensor_id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        self.get_sensor(&rec.sensor_id)
            .await?
            .ok_or(Error::NotFound("Sensor not found after insert".to_string()))
    }

    /// Update sensor configuration fields
    pub async fn update_sensor_config(
        &self,
        sensor_id: &str,
        req: &UpdateSensorConfigRequest,
    ) -> Result<Sensor> {
        let now = chrono::Utc::now();

        let mut set_clauses = vec!["updated_at = ?".to_string()];

        if req.enabled.is_some() {
            set_clauses.push("enabled = ?".to_string());
        }
        if req.motion_debounce_seconds.is_some() {
            set_clauses.push("motion_debounce_seconds = ?".to_string());
        }
        if req.inactivity_timeout_seconds.is_some() {
            set_clauses.push("inactivity_timeout_seconds = ?".to_string());
        }
        if req.status_report_interval_seconds.is_some() {
            set_clauses.push("status_report_interval_seconds = ?".to_string());
        }
        if req.led_enabled.is_some() {
            set_clauses.push("led_enabled = ?".to_string());
        }
        if req.quiet_hours.is_some() {
            set_clauses.push("quiet_start = ?".to_string());
            set_clauses.push("quiet_end = ?".to_string());
            set_clauses.push("quiet_tz = ?".to_string());
        }
        if req.playback_target_id.is_some() {
            set_clauses.push("playback_target_id = ?".to_string());
        }
        if req.playback_context_ref.is_some() {
            set_clauses.push("playback_context_ref = ?".to_string());
        }
        if req.location_label.is_some() {
            set_clauses.push("location_label = ?".to_string());
        }

        if set_clauses.len() <= 1 {
            // Only updated_at, no actual changes
            return self
                .get_sensor(sensor_id)
                .await?
                .ok_or(Error::NotFound("Sensor not found".to_string()));
        }

        let query = format!(
            "UPDATE sensors SET {} WHERE sensor_id = ?",
            set_clauses.join(", ")
        );

        let mut q = sqlx::query(&query).bind(now);

        if let Some(v) = req.enabled {
            q = q.bind(v);
        }
        if let Some(v) = req.motion_debounce_seconds {
            q = q.bind(v);
        }
        if let Some(v) = req.inactivity_timeout_seconds {
            q = q.bind(v);
        }
        if let Some(v) = req.status_report_interval_seconds {
            q = q.bind(v);
        }
        if let Some(v) = req.led_enabled {
            q = q.bind(v);
        }
        if let Some(ref quiet) = req.quiet_hours {
            q = q.bind(&quiet.start).bind(&quiet.end).bind(&quiet.timezone);
        }
        if let Some(ref v) = req.playback_target_id {
            q = q.bind(v);
        }
        if let Some(ref v) = req.playback_context_ref {
            q = q.bind(v);
        }
        if let Some(ref v) = req.location_label {
            q = q.bind(v);
        }

        q = q.bind(sensor_id);
        q.execute(&self.pool).await?;

        self.get_sensor(sensor_id)
            .await?
            .ok_or(Error::NotFound("Sensor not found after update".to_string()))
    }

    /// Advance `last_motion_at` monotonically.
    ///
    /// Concurrent handlers may observe motions out of order; the stored
    /// value is `max(stored, occurred_at)`, never a plain overwrite.
    pub async fn touch_last_motion(&self, sensor_id: &str, occurred_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sensors
            SET last_motion_at = GREATEST(COALESCE(last_motion_at, 0), ?),
                updated_at = ?
            WHERE sensor_id = ?
            "#,
        )
        .bind(occurred_at)
        .bind(chrono::Utc::now())
        .bind(sensor_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Update sensor runtime status
    pub async fn update_sensor_status(&self, sensor_id: &str, status: SensorStatus) -> Result<()> {
        sqlx::query("UPDATE sensors SET status = ?, updated_at = ? WHERE sensor_id = ?")
            .bind(String::from(status))
            .bind(chrono::Utc::now())
            .bind(sensor_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Update sensor firmware version (reported in motion metadata)
    pub async fn update_firmware_version(&self, sensor_id: &str, version: &str) -> Result<()> {
        sqlx::query("UPDATE sensors SET firmware_version = ?, updated_at = ? WHERE sensor_id = ?")
            .bind(version)
            .bind(chrono::Utc::now())
            .bind(sensor_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete sensor record
    pub async fn delete_sensor(&self, sensor_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sensors WHERE sensor_id = ?")
            .bind(sensor_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ========================================
    // User CRUD
    // ========================================

    /// User SELECT columns
    const USER_COLUMNS: &'static str = r#"
        user_id, music_connected, token_ref,
        default_debounce_seconds, default_timeout_seconds,
        default_quiet_start, default_quiet_end, default_quiet_tz,
        notifications_enabled, created_at, updated_at
    "#;

    /// Get user by ID
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE user_id = ?", Self::USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Get all users with a connected music account
    pub async fn get_connected_users(&self) -> Result<Vec<User>> {
        let query = format!(
            "SELECT {} FROM users WHERE music_connected = TRUE ORDER BY user_id",
            Self::USER_COLUMNS
        );
        let users = sqlx::query_as::<_, User>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    /// Mark a user's music connection state.
    ///
    /// Disconnecting clears `token_ref` so the connected⇒secret invariant
    /// cannot be observed half-broken.
    pub async fn set_music_connected(
        &self,
        user_id: &str,
        connected: bool,
        token_ref: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET music_connected = ?, token_ref = ?, updated_at = ? WHERE user_id = ?",
        )
        .bind(connected)
        .bind(if connected { token_ref } else { None })
        .bind(chrono::Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
