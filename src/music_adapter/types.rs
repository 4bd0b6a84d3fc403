//! Music adapter data types

use serde::{Deserialize, Serialize};

/// Result of an OAuth refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Epoch seconds
    pub expires_at: i64,
    /// Present only when the service rotated the refresh token
    pub refresh_token: Option<String>,
}

/// Current playback state on the user's account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    /// Device the playback is happening on, if any
    pub device_id: Option<String>,
    /// Context (playlist/album) currently playing, if any
    pub context_ref: Option<String>,
}

impl PlaybackState {
    /// Whether the given target device is already playing
    pub fn playing_on(&self, device_id: &str) -> bool {
        self.is_playing && self.device_id.as_deref() == Some(device_id)
    }
}

/// A playback-capable device known to the music service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackDevice {
    pub device_id: String,
    pub name: String,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playing_on_matches_device() {
        let state = PlaybackState {
            is_playing: true,
            device_id: Some("D1".into()),
            context_ref: Some("context:playlist:P".into()),
        };
        assert!(state.playing_on("D1"));
        assert!(!state.playing_on("D2"));

        let paused = PlaybackState {
            is_playing: false,
            ..state
        };
        assert!(!paused.playing_on("D1"));
    }
}
