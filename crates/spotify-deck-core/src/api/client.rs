use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.spotify.com";
const USER_AGENT: &str = "spotify-deck/0.1.0";

/// Errors returned by the Web API client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} body: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Minimal client for the provider's resource endpoints.
///
/// Every call takes the bearer token handed out by the credential guard;
/// callers must not lift a token off the session themselves.
#[derive(Debug, Clone)]
pub struct SpotifyApiClient {
    http: Client,
    base_url: Url,
}

impl SpotifyApiClient {
    /// Build a client targeting the production Web API.
    pub fn new() -> ApiResult<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Build a client with a custom base URL (useful for testing).
    pub fn with_base_url(base_url: &str) -> ApiResult<Self> {
        let base_url = Url::parse(base_url)?;
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http, base_url })
    }

    /// Fetch the authenticated user's profile.
    pub async fn current_user(&self, token: &str) -> ApiResult<UserProfile> {
        let url = self.base_url.join("/v1/me")?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let response = ok_or_status(response).await?;
        Ok(response.json::<UserProfile>().await?)
    }

    /// Search tracks by free-text query.
    pub async fn search_tracks(
        &self,
        token: &str,
        query: &str,
        limit: usize,
    ) -> ApiResult<Vec<TrackSummary>> {
        let mut url = self.base_url.join("/v1/search")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("type", "track")
            .append_pair("limit", &limit.to_string());
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let response = ok_or_status(response).await?;
        let payload: SearchResponse = response.json().await?;
        Ok(payload.tracks.map(|page| page.items).unwrap_or_default())
    }

    /// Move playback to the given device.
    pub async fn transfer_playback(&self, token: &str, device_id: &str, play: bool) -> ApiResult<()> {
        let url = self.base_url.join("/v1/me/player")?;
        let body = serde_json::json!({ "device_ids": [device_id], "play": play });
        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        ok_or_status(response).await?;
        Ok(())
    }

    /// Start playback of the given track URIs on the active device.
    pub async fn play_uris(&self, token: &str, uris: &[String]) -> ApiResult<()> {
        let url = self.base_url.join("/v1/me/player/play")?;
        let body = serde_json::json!({ "uris": uris });
        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        ok_or_status(response).await?;
        Ok(())
    }
}

async fn ok_or_status(response: reqwest::Response) -> ApiResult<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status { status, body });
    }
    Ok(response)
}

/// Subset of profile fields the front-ends display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub product: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSummary {
    pub id: String,
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub artists: Vec<ArtistSummary>,
    pub album: Option<AlbumSummary>,
    pub duration_ms: Option<i64>,
}

impl TrackSummary {
    /// Comma-joined artist names for display.
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistSummary {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumSummary {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    items: Vec<TrackSummary>,
}
