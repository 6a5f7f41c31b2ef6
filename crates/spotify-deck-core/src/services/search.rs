use std::sync::Arc;

use crate::api::{SpotifyApiClient, TrackSummary};
use crate::auth::AuthManager;

use super::{require_token, ServiceResult};

/// Result page size used when the caller does not ask for one.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Track search keeping the session's query and results in step.
#[derive(Clone)]
pub struct SearchService {
    auth: Arc<AuthManager>,
    api: SpotifyApiClient,
}

impl SearchService {
    pub fn new(auth: Arc<AuthManager>, api: SpotifyApiClient) -> Self {
        Self { auth, api }
    }

    /// Search tracks, recording the query (persisted) and the results
    /// (transient) on the session.
    pub async fn search(&self, query: &str, limit: usize) -> ServiceResult<Vec<TrackSummary>> {
        let token = require_token(&self.auth).await?;
        self.auth.session().set_search_query(query).await?;
        let tracks = self.api.search_tracks(&token, query, limit).await?;
        self.auth
            .session()
            .set_search_results(tracks.clone())
            .await;
        Ok(tracks)
    }
}
