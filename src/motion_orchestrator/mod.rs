//! MotionOrchestrator - Motion to Session Pipeline
//!
//! ## Responsibilities
//!
//! - Resolve sensor and owner for each motion event
//! - Admission policy: disabled, quiet hours, debounce (in that order)
//! - Session resolve-or-open, extend on repeat motion
//! - Playback command (state-checked, idempotent)
//! - Audit row for every delivered motion, regardless of outcome
//!
//! ## Ordering & idempotency
//!
//! Broker delivery is at-least-once and unordered per sensor. The active
//! session is a row, not process memory; the debounce watermark advances
//! with `max(stored, occurred_at)`; opens race through a conditional
//! insert and losers adopt the winner's row.

pub mod admission;

pub use admission::{evaluate, in_quiet_window, AdmissionDecision};

use crate::error::{Error, Result};
use crate::music_adapter::MusicService;
use crate::registry::{Registry, Sensor, User};
use crate::retry;
use crate::session_store::{
    EventMetadata, MotionEventType, NewMotionEvent, SessionRepository,
};
use crate::token_warden::TokenWarden;
use std::sync::Arc;

/// Result of one motion delivery
#[derive(Debug, Clone)]
pub struct MotionOutcome {
    pub admitted: bool,
    pub event_type: MotionEventType,
    pub action_taken: String,
    pub session_id: Option<String>,
    /// True when a start-playback command was issued this invocation
    pub playback_command_sent: bool,
}

/// MotionOrchestrator instance
pub struct MotionOrchestrator {
    registry: Arc<Registry>,
    sessions: SessionRepository,
    warden: Arc<TokenWarden>,
    music: Arc<dyn MusicService>,
    /// Session/audit retention horizon in seconds
    retention_seconds: i64,
}

impl MotionOrchestrator {
    /// Create new MotionOrchestrator
    pub fn new(
        registry: Arc<Registry>,
        sessions: SessionRepository,
        warden: Arc<TokenWarden>,
        music: Arc<dyn MusicService>,
        retention_seconds: i64,
    ) -> Self {
        Self {
            registry,
            sessions,
            warden,
            music,
            retention_seconds,
        }
    }

    /// Handle one motion event.
    ///
    /// Every delivery produces exactly one audit row. Transient playback
    /// failures never roll back the session record; "we saw motion but
    /// couldn't play" stays observable.
    pub async fn handle_motion(
        &self,
        sensor_id: &str,
        occurred_at: i64,
        metadata: EventMetadata,
    ) -> Result<MotionOutcome> {
        let sensor = self.registry.service().require_sensor(sensor_id).await?;
        let user = self.registry.service().require_user(&sensor.user_id).await?;

        // Admission checks, each with its own audit tag
        let decision = admission::evaluate(&sensor, occurred_at);
        if let Some(event_type) = decision.suppression_event_type() {
            self.write_audit(
                &sensor,
                None,
                occurred_at,
                event_type,
                "suppressed",
                metadata,
            )
            .await?;

            tracing::info!(
                sensor_id = sensor_id,
                occurred_at = occurred_at,
                suppressed_as = event_type.as_str(),
                "Motion suppressed"
            );

            return Ok(MotionOutcome {
                admitted: false,
                event_type,
                action_taken: "suppressed".to_string(),
                session_id: None,
                playback_command_sent: false,
            });
        }

        // Resolve-or-open the active session. A session closed between
        // the lookup and the extend means closure is terminal: open a
        // fresh one instead of resurrecting it.
        let mut opened = false;
        let mut session = None;
        for _ in 0..2 {
            let handle = self
                .sessions
                .open_or_adopt_session(sensor_id, &sensor.user_id, occurred_at, self.retention_seconds)
                .await?;

            if handle.opened {
                opened = true;
                session = Some(handle.session);
                break;
            }

            if self.sessions.record_motion(&handle.session.session_id, occurred_at).await? {
                session = Some(handle.session);
                break;
            }

            tracing::debug!(
                sensor_id = sensor_id,
                session_id = %handle.session.session_id,
                "Adopted session closed mid-flight, reopening"
            );
        }
        let session = session.ok_or_else(|| {
            Error::Conflict(format!(
                "Session open/extend for {} lost every race",
                sensor_id
            ))
        })?;

        // Playback command, state-checked so repeats are idempotent
        let playback_command_sent = match self
            .ensure_playback(&user, &sensor, &session.session_id)
            .await
        {
            Ok(sent) => sent,
            Err(e) => {
                tracing::warn!(
                    sensor_id = sensor_id,
                    session_id = %session.session_id,
                    error_kind = e.kind(),
                    error = %e,
                    "Playback command failed; motion still recorded"
                );
                false
            }
        };

        // Persist: watermark forward, audit row
        self.registry
            .service()
            .touch_last_motion(sensor_id, occurred_at)
            .await?;

        let action = if opened { "session-opened" } else { "session-extended" };
        self.write_audit(
            &sensor,
            Some(session.session_id.clone()),
            occurred_at,
            MotionEventType::Detected,
            action,
            metadata,
        )
        .await?;

        tracing::info!(
            sensor_id = sensor_id,
            session_id = %session.session_id,
            occurred_at = occurred_at,
            action = action,
            playback_command_sent = playback_command_sent,
            "Motion admitted"
        );

        Ok(MotionOutcome {
            admitted: true,
            event_type: MotionEventType::Detected,
            action_taken: action.to_string(),
            session_id: Some(session.session_id),
            playback_command_sent,
        })
    }

    /// Query playback state and start playback when the target is idle.
    ///
    /// Returns whether a start command was issued.
    async fn ensure_playback(
        &self,
        user: &User,
        sensor: &Sensor,
        session_id: &str,
    ) -> Result<bool> {
        if !user.music_connected {
            tracing::debug!(user_id = %user.user_id, "Music not connected; skipping playback");
            return Ok(false);
        }

        let token = self.warden.get_access_token(user).await?;

        let state = retry::with_backoff("get_playback_state", || {
            self.music
                .get_playback_state(&token, &sensor.playback_target_id)
        })
        .await?;

        if state.playing_on(&sensor.playback_target_id) {
            tracing::debug!(
                sensor_id = %sensor.sensor_id,
                device_id = %sensor.playback_target_id,
                "Target already playing; skipping start"
            );
            return Ok(false);
        }

        retry::with_backoff("start_playback", || {
            self.music.start_playback(
                &token,
                &sensor.playback_target_id,
                &sensor.playback_context_ref,
            )
        })
        .await?;

        self.sessions.mark_playback_started(session_id).await?;

        tracing::info!(
            sensor_id = %sensor.sensor_id,
            session_id = session_id,
            device_id = %sensor.playback_target_id,
            context_ref = %sensor.playback_context_ref,
            "Playback started"
        );

        Ok(true)
    }

    async fn write_audit(
        &self,
        sensor: &Sensor,
        session_id: Option<String>,
        occurred_at: i64,
        event_type: MotionEventType,
        action_taken: &str,
        metadata: EventMetadata,
    ) -> Result<()> {
        self.sessions
            .insert_motion_event(
                &NewMotionEvent {
                    sensor_id: sensor.sensor_id.clone(),
                    user_id: sensor.user_id.clone(),
                    session_id,
                    occurred_at,
                    event_type,
                    action_taken: action_taken.to_string(),
                    metadata,
                },
                self.retention_seconds,
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests;
