use super::admission::{evaluate, in_quiet_window, AdmissionDecision};
use crate::registry::{QuietHours, Sensor};
use chrono::{TimeZone, Utc};
use chrono_tz::Tz;

fn sensor(enabled: bool, debounce: i32, last_motion_at: Option<i64>) -> Sensor {
    Sensor {
        sensor_id: "bathroom-main".into(),
        user_id: "u1".into(),
        location_label: None,
        enabled,
        motion_debounce_seconds: debounce,
        inactivity_timeout_seconds: 300,
        status_report_interval_seconds: 300,
        led_enabled: true,
        quiet_start: None,
        quiet_end: None,
        quiet_tz: None,
        playback_target_id: "D1".into(),
        playback_context_ref: "context:playlist:P".into(),
        last_motion_at,
        status: "active".into(),
        thing_handle: Some("thing-1".into()),
        certificate_handle: Some("cert-1".into()),
        firmware_version: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn london_epoch(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
    let tz: Tz = "Europe/London".parse().unwrap();
    tz.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().timestamp()
}

#[test]
fn disabled_sensor_short_circuits() {
    let s = sensor(false, 120, None);
    assert_eq!(evaluate(&s, 1000), AdmissionDecision::Disabled);
}

#[test]
fn first_motion_is_admitted() {
    let s = sensor(true, 120, None);
    assert_eq!(evaluate(&s, 1000), AdmissionDecision::Admitted);
}

#[test]
fn motion_inside_debounce_is_suppressed() {
    let s = sensor(true, 120, Some(1000));
    assert_eq!(evaluate(&s, 1030), AdmissionDecision::Debounced);
    // exactly on the boundary is admitted
    assert_eq!(evaluate(&s, 1120), AdmissionDecision::Admitted);
    assert_eq!(evaluate(&s, 1150), AdmissionDecision::Admitted);
}

#[test]
fn reordered_arrival_is_debounced() {
    let s = sensor(true, 120, Some(1000));
    // arrives with an earlier event clock than the stored watermark
    assert_eq!(evaluate(&s, 950), AdmissionDecision::Debounced);
}

#[test]
fn zero_debounce_admits_everything() {
    let s = sensor(true, 0, Some(1000));
    assert_eq!(evaluate(&s, 1000), AdmissionDecision::Admitted);
}

#[test]
fn quiet_hours_cross_midnight() {
    let quiet = QuietHours {
        start: "22:00".into(),
        end: "07:00".into(),
        timezone: "Europe/London".into(),
    };

    // 03:15 local, inside the overnight window
    assert!(in_quiet_window(&quiet, london_epoch(2026, 1, 15, 3, 15)));
    // 23:30 local, inside
    assert!(in_quiet_window(&quiet, london_epoch(2026, 1, 15, 23, 30)));
    // 12:00 local, outside
    assert!(!in_quiet_window(&quiet, london_epoch(2026, 1, 15, 12, 0)));
    // boundary behavior: start inclusive, end exclusive
    assert!(in_quiet_window(&quiet, london_epoch(2026, 1, 15, 22, 0)));
    assert!(!in_quiet_window(&quiet, london_epoch(2026, 1, 15, 7, 0)));
    assert!(in_quiet_window(&quiet, london_epoch(2026, 1, 15, 6, 59)));
}

#[test]
fn quiet_hours_same_day() {
    let quiet = QuietHours {
        start: "09:00".into(),
        end: "17:00".into(),
        timezone: "Europe/London".into(),
    };

    assert!(in_quiet_window(&quiet, london_epoch(2026, 1, 15, 12, 0)));
    assert!(!in_quiet_window(&quiet, london_epoch(2026, 1, 15, 8, 59)));
    assert!(!in_quiet_window(&quiet, london_epoch(2026, 1, 15, 17, 0)));
}

#[test]
fn quiet_hours_respect_timezone_not_utc() {
    let quiet = QuietHours {
        start: "22:00".into(),
        end: "07:00".into(),
        timezone: "Asia/Tokyo".into(),
    };

    // 23:00 Tokyo == 14:00 UTC; inside the window locally, outside in UTC
    let tz: Tz = "Asia/Tokyo".parse().unwrap();
    let at = tz.with_ymd_and_hms(2026, 1, 15, 23, 0, 0).unwrap().timestamp();
    assert!(in_quiet_window(&quiet, at));
}

#[test]
fn unknown_timezone_fails_open() {
    let quiet = QuietHours {
        start: "22:00".into(),
        end: "07:00".into(),
        timezone: "Mars/Olympus".into(),
    };
    assert!(!in_quiet_window(&quiet, london_epoch(2026, 1, 15, 23, 0)));
}

#[test]
fn quiet_hours_run_before_debounce() {
    let mut s = sensor(true, 120, Some(0));
    s.quiet_start = Some("00:00".into());
    s.quiet_end = Some("23:59".into());
    s.quiet_tz = Some("UTC".into());

    // Inside both quiet hours and the debounce window: quiet hours wins
    assert_eq!(evaluate(&s, 30), AdmissionDecision::QuietHours);
}
