//! MusicAdapter - Music Service Integration
//!
//! ## Responsibilities
//!
//! - OAuth token refresh
//! - Playback state query, start, pause
//! - Device listing
//!
//! The trait seam keeps the orchestrator, reaper and warden testable
//! against an in-memory service.

mod client;
mod types;

pub use client::HttpMusicClient;
pub use types::*;

use crate::error::Result;
use async_trait::async_trait;

/// Music service operations the core depends on
#[async_trait]
pub trait MusicService: Send + Sync {
    /// Exchange a refresh token for a fresh access token
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken>;

    /// Current playback state on the user's account
    async fn get_playback_state(&self, access_token: &str, device_id: &str)
        -> Result<PlaybackState>;

    /// Start playback of `context_ref` on the target device
    async fn start_playback(
        &self,
        access_token: &str,
        device_id: &str,
        context_ref: &str,
    ) -> Result<()>;

    /// Pause playback on the target device
    async fn pause_playback(&self, access_token: &str, device_id: &str) -> Result<()>;

    /// List playback-capable devices
    async fn list_devices(&self, access_token: &str) -> Result<Vec<PlaybackDevice>>;
}
