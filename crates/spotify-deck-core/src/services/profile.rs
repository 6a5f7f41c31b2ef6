use std::sync::Arc;

use crate::api::{SpotifyApiClient, UserProfile};
use crate::auth::AuthManager;

use super::{require_token, ServiceResult};

/// Fetches the authenticated user's profile and mirrors it on the session.
#[derive(Clone)]
pub struct ProfileService {
    auth: Arc<AuthManager>,
    api: SpotifyApiClient,
}

impl ProfileService {
    pub fn new(auth: Arc<AuthManager>, api: SpotifyApiClient) -> Self {
        Self { auth, api }
    }

    /// Fetch the profile and record it on the session.
    ///
    /// Callers showing a "logged in as" line may treat failure as best-effort;
    /// the profile simply stays absent.
    pub async fn fetch(&self) -> ServiceResult<UserProfile> {
        let token = require_token(&self.auth).await?;
        let profile = self.api.current_user(&token).await?;
        self.auth.session().set_profile(Some(profile.clone())).await;
        Ok(profile)
    }
}
