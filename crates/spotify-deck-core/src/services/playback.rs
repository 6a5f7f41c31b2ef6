use std::sync::Arc;

use crate::api::SpotifyApiClient;
use crate::auth::AuthManager;

use super::{require_token, ServiceResult};

/// Playback control, remembering the active device on the session.
#[derive(Clone)]
pub struct PlaybackService {
    auth: Arc<AuthManager>,
    api: SpotifyApiClient,
}

impl PlaybackService {
    pub fn new(auth: Arc<AuthManager>, api: SpotifyApiClient) -> Self {
        Self { auth, api }
    }

    /// Move playback to the device and remember it for this session.
    pub async fn transfer_to(&self, device_id: &str, play: bool) -> ServiceResult<()> {
        let token = require_token(&self.auth).await?;
        self.api.transfer_playback(&token, device_id, play).await?;
        self.auth
            .session()
            .set_playback_device(Some(device_id.to_owned()))
            .await;
        Ok(())
    }

    /// Start playback of the given track URIs on the active device.
    pub async fn play(&self, uris: &[String]) -> ServiceResult<()> {
        let token = require_token(&self.auth).await?;
        self.api.play_uris(&token, uris).await?;
        Ok(())
    }
}
