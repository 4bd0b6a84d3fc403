//! Admission policy
//!
//! Checks run in order, each short-circuiting with its own audit tag:
//! disabled, quiet hours, debounce. Decisions read persisted sensor
//! state so retries and re-ordered arrivals converge to the same audit
//! outcome.

use crate::registry::{parse_hhmm, QuietHours, Sensor};
use crate::session_store::MotionEventType;
use chrono::{TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Outcome of the admission checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admitted,
    Disabled,
    QuietHours,
    Debounced,
}

impl AdmissionDecision {
    /// Audit tag for a suppressed motion; None when admitted
    pub fn suppression_event_type(&self) -> Option<MotionEventType> {
        match self {
            AdmissionDecision::Admitted => None,
            AdmissionDecision::Disabled => Some(MotionEventType::DisabledSuppressed),
            AdmissionDecision::QuietHours => Some(MotionEventType::QuietHoursSuppressed),
            AdmissionDecision::Debounced => Some(MotionEventType::Debounced),
        }
    }
}

/// Evaluate the admission checks for one motion at `occurred_at`
/// (epoch seconds, server-side event clock).
pub fn evaluate(sensor: &Sensor, occurred_at: i64) -> AdmissionDecision {
    if !sensor.enabled {
        return AdmissionDecision::Disabled;
    }

    if let Some(quiet) = sensor.quiet_hours() {
        if in_quiet_window(&quiet, occurred_at) {
            return AdmissionDecision::QuietHours;
        }
    }

    if let Some(last) = sensor.last_motion_at {
        // Out-of-order arrivals make the difference negative; those are
        // inside the window too
        if occurred_at - last < sensor.motion_debounce_seconds as i64 {
            return AdmissionDecision::Debounced;
        }
    }

    AdmissionDecision::Admitted
}

/// Whether `occurred_at` falls inside the daily window, evaluated in the
/// window's IANA timezone.
///
/// Windows that cross midnight (start > end) admit `now >= start OR
/// now < end`; same-day windows admit `start <= now < end`. An
/// unparseable timezone disables the window (fail open, logged) rather
/// than silencing the sensor forever.
pub fn in_quiet_window(quiet: &QuietHours, occurred_at: i64) -> bool {
    let (Some(start), Some(end)) = (parse_hhmm(&quiet.start), parse_hhmm(&quiet.end)) else {
        tracing::warn!(
            start = %quiet.start,
            end = %quiet.end,
            "Quiet-hours window has malformed HH:MM, ignoring"
        );
        return false;
    };

    let tz: Tz = match quiet.timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(timezone = %quiet.timezone, "Unknown quiet-hours timezone, ignoring");
            return false;
        }
    };

    let Some(utc) = Utc.timestamp_opt(occurred_at, 0).single() else {
        return false;
    };
    let local = utc.with_timezone(&tz);
    let now = local.hour() * 60 + local.minute();

    if start > end {
        now >= start || now < end
    } else {
        start <= now && now < end
    }
}
