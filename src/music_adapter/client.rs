//! Music service HTTP client
//!
//! Thin adapter over the music service's Web API and OAuth token
//! endpoint. Responses are classified into the core error taxonomy:
//! 401 -> AuthExpired, 429 -> RateLimited (with Retry-After), 5xx ->
//! Transient.

use super::types::*;
use super::MusicService;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Music service HTTP client
#[derive(Clone)]
pub struct HttpMusicClient {
    http: Client,
    /// Web API base, e.g. https://api.music.example
    api_base: String,
    /// OAuth token endpoint base, e.g. https://accounts.music.example
    auth_base: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayerStateBody {
    is_playing: bool,
    device: Option<PlayerDeviceBody>,
    context: Option<PlayerContextBody>,
}

#[derive(Debug, Deserialize)]
struct PlayerDeviceBody {
    id: Option<String>,
    name: Option<String>,
    is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct PlayerContextBody {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceListBody {
    devices: Vec<PlayerDeviceBody>,
}

impl HttpMusicClient {
    /// Create new client
    pub fn new(
        api_base: String,
        auth_base: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            api_base,
            auth_base,
            client_id,
            client_secret,
        }
    }

    /// Map a non-success status into the error taxonomy
    fn classify_status(status: StatusCode, retry_after: Option<u64>, context: &str) -> Error {
        match status {
            StatusCode::UNAUTHORIZED => {
                Error::AuthExpired(format!("{context}: music service returned 401"))
            }
            StatusCode::NOT_FOUND => {
                Error::NotFound(format!("{context}: no such device or resource"))
            }
            StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
                message: format!("{context}: music service throttled the request"),
                retry_after,
            },
            s if s.is_server_error() => {
                Error::Transient(format!("{context}: music service returned {s}"))
            }
            s => Error::Internal(format!("{context}: unexpected status {s}")),
        }
    }

    fn retry_after_header(resp: &reqwest::Response) -> Option<u64> {
        resp.headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }
}

#[async_trait]
impl MusicService for HttpMusicClient {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken> {
        let url = format!("{}/api/token", self.auth_base);

        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            let body: TokenResponse = resp.json().await?;
            let now = chrono::Utc::now().timestamp();
            return Ok(RefreshedToken {
                access_token: body.access_token,
                expires_at: now + body.expires_in,
                refresh_token: body.refresh_token,
            });
        }

        // A revoked refresh token comes back as 400 invalid_grant, which
        // is an auth failure, not a validation one
        if status == StatusCode::BAD_REQUEST {
            let body: OAuthErrorBody = resp.json().await.unwrap_or(OAuthErrorBody { error: None });
            if body.error.as_deref() == Some("invalid_grant") {
                return Err(Error::AuthExpired(
                    "token refresh rejected: invalid_grant (refresh token revoked)".to_string(),
                ));
            }
            return Err(Error::Validation(format!(
                "token refresh rejected: {}",
                body.error.unwrap_or_else(|| "bad request".to_string())
            )));
        }

        let retry_after = Self::retry_after_header(&resp);
        Err(Self::classify_status(status, retry_after, "refresh_access_token"))
    }

    async fn get_playback_state(
        &self,
        access_token: &str,
        _device_id: &str,
    ) -> Result<PlaybackState> {
        let url = format!("{}/v1/me/player", self.api_base);

        let resp = self.http.get(&url).bearer_auth(access_token).send().await?;

        let status = resp.status();
        // 204: no active playback anywhere
        if status == StatusCode::NO_CONTENT {
            return Ok(PlaybackState::default());
        }
        if status.is_success() {
            let body: PlayerStateBody = resp.json().await?;
            return Ok(PlaybackState {
                is_playing: body.is_playing,
                device_id: body.device.and_then(|d| d.id),
                context_ref: body.context.and_then(|c| c.uri),
            });
        }

        let retry_after = Self::retry_after_header(&resp);
        Err(Self::classify_status(status, retry_after, "get_playback_state"))
    }

    async fn start_playback(
        &self,
        access_token: &str,
        device_id: &str,
        context_ref: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/v1/me/player/play?device_id={}",
            self.api_base,
            urlencoding::encode(device_id)
        );

        let resp = self
            .http
            .put(&url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "context_uri": context_ref }))
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let retry_after = Self::retry_after_header(&resp);
        Err(Self::classify_status(status, retry_after, "start_playback"))
    }

    async fn pause_playback(&self, access_token: &str, device_id: &str) -> Result<()> {
        let url = format!(
            "{}/v1/me/player/pause?device_id={}",
            self.api_base,
            urlencoding::encode(device_id)
        );

        let resp = self.http.put(&url).bearer_auth(access_token).send().await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let retry_after = Self::retry_after_header(&resp);
        Err(Self::classify_status(status, retry_after, "pause_playback"))
    }

    async fn list_devices(&self, access_token: &str) -> Result<Vec<PlaybackDevice>> {
        let url = format!("{}/v1/me/player/devices", self.api_base);

        let resp = self.http.get(&url).bearer_auth(access_token).send().await?;

        let status = resp.status();
        if status.is_success() {
            let body: DeviceListBody = resp.json().await?;
            let devices = body
                .devices
                .into_iter()
                .filter_map(|d| {
                    Some(PlaybackDevice {
                        device_id: d.id?,
                        name: d.name.unwrap_or_default(),
                        is_active: d.is_active.unwrap_or(false),
                    })
                })
                .collect();
            return Ok(devices);
        }

        let retry_after = Self::retry_after_header(&resp);
        Err(Self::classify_status(status, retry_after, "list_devices"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_follows_taxonomy() {
        let e = HttpMusicClient::classify_status(StatusCode::UNAUTHORIZED, None, "t");
        assert!(matches!(e, Error::AuthExpired(_)));

        let e = HttpMusicClient::classify_status(StatusCode::TOO_MANY_REQUESTS, Some(17), "t");
        match e {
            Error::RateLimited { retry_after, .. } => assert_eq!(retry_after, Some(17)),
            other => panic!("expected RateLimited, got {other:?}"),
        }

        let e = HttpMusicClient::classify_status(StatusCode::BAD_GATEWAY, None, "t");
        assert!(e.is_transient());

        let e = HttpMusicClient::classify_status(StatusCode::NOT_FOUND, None, "t");
        assert!(matches!(e, Error::NotFound(_)));
        assert!(!e.is_transient());
    }
}
