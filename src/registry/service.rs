//! Registry Service
//!
//! Business logic layer for sensors and users

use super::repository::RegistryRepository;
use super::types::*;
use crate::error::Result;

/// Status-report interval when neither request nor firmware says
/// otherwise
const DEFAULT_STATUS_REPORT_INTERVAL_SECONDS: i32 = 300;

/// Registry service for business logic
pub struct RegistryService {
    repo: RegistryRepository,
}

impl RegistryService {
    /// Create new service
    pub fn new(repo: RegistryRepository) -> Self {
        Self { repo }
    }

    // ========================================
    // Sensor Operations
    // ========================================

    /// Get sensor by ID
    pub async fn get_sensor(&self, sensor_id: &str) -> Result<Option<Sensor>> {
        self.repo.get_sensor(sensor_id).await
    }

    /// Resolve a sensor or fail with NotFound
    pub async fn require_sensor(&self, sensor_id: &str) -> Result<Sensor> {
        self.repo.get_sensor(sensor_id).await?.ok_or_else(|| {
            crate::Error::NotFound(format!("Sensor {} not found", sensor_id))
        })
    }

    /// List sensors owned by a user
    pub async fn list_sensors(&self, user_id: &str) -> Result<Vec<Sensor>> {
        self.repo.get_sensors_by_user(user_id).await
    }

    /// Create a sensor record, inheriting unset knobs from the owner's
    /// preference defaults.
    pub async fn create_sensor(&self, rec: CreateSensorRecord) -> Result<Sensor> {
        if !validate_sensor_id(&rec.sensor_id) {
            return Err(crate::Error::Validation(format!(
                "sensor_id {:?} must match [A-Za-z0-9_-]{{3,128}}",
                rec.sensor_id
            )));
        }

        let user = self.require_user(&rec.user_id).await?;

        let debounce = rec
            .motion_debounce_seconds
            .unwrap_or(user.default_debounce_seconds);
        let timeout = rec
            .inactivity_timeout_seconds
            .unwrap_or(user.default_timeout_seconds);
        if debounce < 0 || timeout <= 0 {
            return Err(crate::Error::Validation(
                "debounce must be >= 0 and timeout > 0 seconds".to_string(),
            ));
        }

        let status_report_interval = rec
            .status_report_interval_seconds
            .unwrap_or(DEFAULT_STATUS_REPORT_INTERVAL_SECONDS);
        if status_report_interval <= 0 {
            return Err(crate::Error::Validation(
                "status_report_interval_seconds must be > 0".to_string(),
            ));
        }
        let led_enabled = rec.led_enabled.unwrap_or(true);

        let inherited_quiet = match (
            &user.default_quiet_start,
            &user.default_quiet_end,
            &user.default_quiet_tz,
        ) {
            (Some(start), Some(end), Some(tz)) => Some(QuietHours {
                start: start.clone(),
                end: end.clone(),
                timezone: tz.clone(),
            }),
            _ => None,
        };
        let quiet = rec.quiet_hours.clone().or(inherited_quiet);
        if let Some(ref q) = quiet {
            validate_quiet_hours(q)?;
        }

        self.repo
            .create_sensor(
                &rec,
                debounce,
                timeout,
                status_report_interval,
                led_enabled,
                quiet.as_ref(),
            )
            .await
    }

    /// Update sensor configuration
    pub async fn update_sensor_config(
        &self,
        sensor_id: &str,
        req: UpdateSensorConfigRequest,
    ) -> Result<Sensor> {
        self.require_sensor(sensor_id).await?;

        if let Some(ref q) = req.quiet_hours {
            validate_quiet_hours(q)?;
        }
        if let Some(d) = req.motion_debounce_seconds {
            if d < 0 {
                return Err(crate::Error::Validation(
                    "motion_debounce_seconds must be >= 0".to_string(),
                ));
            }
        }
        if let Some(t) = req.inactivity_timeout_seconds {
            if t <= 0 {
                return Err(crate::Error::Validation(
                    "inactivity_timeout_seconds must be > 0".to_string(),
                ));
            }
        }
        if let Some(interval) = req.status_report_interval_seconds {
            if interval <= 0 {
                return Err(crate::Error::Validation(
                    "status_report_interval_seconds must be > 0".to_string(),
                ));
            }
        }

        self.repo.update_sensor_config(sensor_id, &req).await
    }

    /// Advance the sensor's last-motion watermark
    pub async fn touch_last_motion(&self, sensor_id: &str, occurred_at: i64) -> Result<()> {
        self.repo.touch_last_motion(sensor_id, occurred_at).await
    }

    /// Update sensor runtime status
    pub async fn update_sensor_status(&self, sensor_id: &str, status: SensorStatus) -> Result<()> {
        self.repo.update_sensor_status(sensor_id, status).await
    }

    /// Record the firmware version a device reported
    pub async fn update_firmware_version(&self, sensor_id: &str, version: &str) -> Result<()> {
        self.repo.update_firmware_version(sensor_id, version).await
    }

    /// Delete sensor record
    pub async fn delete_sensor(&self, sensor_id: &str) -> Result<()> {
        self.repo.delete_sensor(sensor_id).await
    }

    // ========================================
    // User Operations
    // ========================================

    /// Get user by ID
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.repo.get_user(user_id).await
    }

    /// Resolve a user or fail with NotFound
    pub async fn require_user(&self, user_id: &str) -> Result<User> {
        self.repo
            .get_user(user_id)
            .await?
            .ok_or_else(|| crate::Error::NotFound(format!("User {} not found", user_id)))
    }

    /// List users with a connected music account
    pub async fn list_connected_users(&self) -> Result<Vec<User>> {
        self.repo.get_connected_users().await
    }

    /// Disconnect a user's music account (revoked refresh token)
    pub async fn disconnect_music(&self, user_id: &str) -> Result<()> {
        self.repo.set_music_connected(user_id, false, None).await
    }
}

/// Validate an "HH:MM" pair and IANA timezone
fn validate_quiet_hours(q: &QuietHours) -> Result<()> {
    if parse_hhmm(&q.start).is_none() || parse_hhmm(&q.end).is_none() {
        return Err(crate::Error::Validation(format!(
            "quiet hours must be HH:MM, got {:?}..{:?}",
            q.start, q.end
        )));
    }
    if q.timezone.parse::<chrono_tz::Tz>().is_err() {
        return Err(crate::Error::Validation(format!(
            "unknown IANA timezone {:?}",
            q.timezone
        )));
    }
    Ok(())
}

/// Parse "HH:MM" into minutes since midnight
pub fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hhmm_parsing() {
        assert_eq!(parse_hhmm("00:00"), Some(0));
        assert_eq!(parse_hhmm("22:00"), Some(22 * 60));
        assert_eq!(parse_hhmm("23:59"), Some(23 * 60 + 59));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("7:00"), None);
        assert_eq!(parse_hhmm("0700"), None);
        assert_eq!(parse_hhmm("aa:bb"), None);
    }

    #[test]
    fn quiet_hours_validation() {
        let ok = QuietHours {
            start: "22:00".into(),
            end: "07:00".into(),
            timezone: "Europe/London".into(),
        };
        assert!(validate_quiet_hours(&ok).is_ok());

        let bad_tz = QuietHours {
            timezone: "GMT+9".into(),
            ..ok.clone()
        };
        assert!(validate_quiet_hours(&bad_tz).is_err());

        let bad_time = QuietHours {
            start: "25:00".into(),
            ..ok
        };
        assert!(validate_quiet_hours(&bad_time).is_err());
    }
}
