use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::session::Credential;

use super::{random_state, AuthError, CallbackParams, PendingAuthorization, PkcePair};

/// Scopes the original player asks for: streaming plus the read/modify
/// playback surface.
pub const DEFAULT_SCOPES: &[&str] = &[
    "streaming",
    "user-read-email",
    "user-read-private",
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "playlist-read-private",
];

const DEFAULT_USER_AGENT: &str = "spotify-deck/0.1.0";
const STATE_LEN: usize = 32;
const REFRESH_DEADLINE: StdDuration = StdDuration::from_secs(30);

/// OAuth client configuration supplied by consumers.
///
/// Authorization-code-with-PKCE only; there is deliberately no client
/// secret field.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    pub fn new<S: Into<String>>(client_id: S, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri,
            scopes: DEFAULT_SCOPES.iter().map(|scope| scope.to_string()).collect(),
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

/// Account-service endpoints used by the authorize and token steps.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub authorize_url: Url,
    pub token_url: Url,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: Url::parse("https://accounts.spotify.com/authorize").unwrap(),
            token_url: Url::parse("https://accounts.spotify.com/api/token").unwrap(),
        }
    }
}

/// One authorization attempt: the URL to open plus its single-use secrets.
#[derive(Debug)]
pub struct AuthorizeRequest {
    pub url: Url,
    pub pending: PendingAuthorization,
}

/// Token endpoint response for both grant types.
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub scope: Option<String>,
}

impl TokenGrant {
    /// Credential as of `received_at`; keeps `previous_refresh` when the
    /// provider did not rotate the refresh token.
    pub fn into_credential(
        self,
        received_at: DateTime<Utc>,
        previous_refresh: Option<String>,
    ) -> Credential {
        Credential {
            access_token: Some(self.access_token),
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: Some(received_at + Duration::seconds(self.expires_in)),
        }
    }
}

/// Performs the authorize-URL construction and token exchanges.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    config: OAuthConfig,
    endpoints: OAuthEndpoints,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Result<Self, AuthError> {
        Self::with_endpoints(config, OAuthEndpoints::default())
    }

    pub fn with_endpoints(
        config: OAuthConfig,
        endpoints: OAuthEndpoints,
    ) -> Result<Self, AuthError> {
        let http = Client::builder().user_agent(DEFAULT_USER_AGENT).build()?;
        Ok(Self {
            http,
            config,
            endpoints,
        })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &OAuthEndpoints {
        &self.endpoints
    }

    /// Start a fresh authorization attempt.
    ///
    /// Verifier, challenge, and state are new on every call; the caller holds
    /// the returned `pending` until the redirect comes back.
    pub fn begin_authorization(&self) -> AuthorizeRequest {
        let pkce = PkcePair::generate();
        let state = random_state(STATE_LEN);
        let url = self.authorize_url(&pkce, &state);
        AuthorizeRequest {
            url,
            pending: PendingAuthorization::new(pkce, state),
        }
    }

    fn authorize_url(&self, pkce: &PkcePair, state: &str) -> Url {
        let mut url = self.endpoints.authorize_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("client_id", &self.config.client_id);
            pairs.append_pair("response_type", "code");
            pairs.append_pair("redirect_uri", self.config.redirect_uri.as_str());
            pairs.append_pair("code_challenge_method", "S256");
            pairs.append_pair("code_challenge", pkce.challenge());
            pairs.append_pair("scope", &self.config.scopes.join(" "));
            pairs.append_pair("state", state);
            // Always re-prompt for consent.
            pairs.append_pair("show_dialog", "true");
        }
        url
    }

    /// Exchange an authorization code for an access/refresh token pair.
    ///
    /// A non-success response ends the login attempt; there is no retry.
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce: &PkcePair,
    ) -> Result<TokenGrant, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", pkce.verifier()),
            ("client_id", self.config.client_id.as_str()),
        ];

        let response = self
            .http
            .post(self.endpoints.token_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::ExchangeFailed { status, body });
        }
        Ok(response.json::<TokenGrant>().await?)
    }

    /// Trade a refresh token for a new access token.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];

        let response = self
            .http
            .post(self.endpoints.token_url.clone())
            .form(&form)
            .timeout(REFRESH_DEADLINE)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshFailed { status, body });
        }
        Ok(response.json::<TokenGrant>().await?)
    }

    /// Finish an authorization attempt from a redirect URL.
    pub async fn complete_authorization(
        &self,
        pending: PendingAuthorization,
        redirect_url: &Url,
    ) -> Result<Credential, AuthError> {
        let params = CallbackParams::from_url(redirect_url)?;
        let pkce = pending.verify(&params)?;
        let grant = self.exchange_code(&params.code, &pkce).await?;
        Ok(grant.into_credential(Utc::now(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use reqwest::StatusCode;
    use std::collections::HashMap;

    fn test_config() -> OAuthConfig {
        OAuthConfig::new("abc", Url::parse("https://x/cb").unwrap()).with_scopes(["streaming"])
    }

    fn client_with_token_url(token_url: &str) -> OAuthClient {
        let endpoints = OAuthEndpoints {
            authorize_url: Url::parse("https://accounts.spotify.com/authorize").unwrap(),
            token_url: Url::parse(token_url).unwrap(),
        };
        OAuthClient::with_endpoints(test_config(), endpoints).unwrap()
    }

    fn query_map(url: &Url) -> HashMap<String, String> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn authorize_url_carries_exact_parameters() {
        let client = OAuthClient::new(test_config()).unwrap();
        let request = client.begin_authorization();

        assert!(request
            .url
            .as_str()
            .starts_with("https://accounts.spotify.com/authorize?"));

        let params = query_map(&request.url);
        assert_eq!(params["client_id"], "abc");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["redirect_uri"], "https://x/cb");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["scope"], "streaming");
        assert_eq!(params["show_dialog"], "true");
        assert_eq!(params["state"], request.pending.state());
        assert!(!params["state"].is_empty());
        assert_eq!(request.pending.verifier().len(), 64);
    }

    #[test]
    fn authorize_url_joins_scopes_with_spaces() {
        let config = OAuthConfig::new("abc", Url::parse("https://x/cb").unwrap())
            .with_scopes(["streaming", "user-read-email"]);
        let client = OAuthClient::new(config).unwrap();
        let request = client.begin_authorization();
        assert_eq!(query_map(&request.url)["scope"], "streaming user-read-email");
    }

    #[test]
    fn consecutive_attempts_are_unguessable() {
        let client = OAuthClient::new(test_config()).unwrap();
        let first = client.begin_authorization();
        let second = client.begin_authorization();
        assert_ne!(first.pending.verifier(), second.pending.verifier());
        assert_ne!(first.pending.state(), second.pending.state());
        assert_ne!(first.url, second.url);
    }

    #[tokio::test]
    async fn exchange_code_posts_pkce_form() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/token")
                .header("content-type", "application/x-www-form-urlencoded")
                .body_contains("grant_type=authorization_code")
                .body_contains("code=code123")
                .body_contains("client_id=abc")
                .body_contains("code_verifier=");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "access-1",
                "refresh_token": "refresh-1",
                "expires_in": 3600,
                "token_type": "Bearer",
                "scope": "streaming"
            }));
        });

        let client = client_with_token_url(&format!("{}{}", server.base_url(), "/api/token"));
        let pkce = PkcePair::generate();
        let grant = client.exchange_code("code123", &pkce).await.unwrap();
        mock.assert();
        assert_eq!(grant.access_token, "access-1");
        assert_eq!(grant.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(grant.expires_in, 3600);
    }

    #[tokio::test]
    async fn exchange_code_failure_is_terminal() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/token");
            then.status(400).body("invalid_grant");
        });

        let client = client_with_token_url(&format!("{}{}", server.base_url(), "/api/token"));
        let pkce = PkcePair::generate();
        let err = client.exchange_code("bad", &pkce).await.unwrap_err();
        // Exactly one request; a failed exchange is never retried.
        mock.assert();
        match err {
            AuthError::ExchangeFailed { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "invalid_grant");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_posts_refresh_grant() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/token")
                .body_contains("grant_type=refresh_token")
                .body_contains("refresh_token=refresh-1");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "access-2",
                "expires_in": 3600
            }));
        });

        let client = client_with_token_url(&format!("{}{}", server.base_url(), "/api/token"));
        let grant = client.refresh_access_token("refresh-1").await.unwrap();
        mock.assert();
        assert_eq!(grant.access_token, "access-2");
        assert!(grant.refresh_token.is_none());
    }

    #[tokio::test]
    async fn refresh_failure_carries_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/token");
            then.status(401).body("invalid refresh token");
        });

        let client = client_with_token_url(&format!("{}{}", server.base_url(), "/api/token"));
        let err = client.refresh_access_token("stale").await.unwrap_err();
        match err {
            AuthError::RefreshFailed { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "invalid refresh token");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn grant_keeps_previous_refresh_token_when_not_rotated() {
        let grant = TokenGrant {
            access_token: "access-2".into(),
            refresh_token: None,
            expires_in: 7200,
            scope: None,
        };
        let received_at = Utc::now();
        let credential = grant.into_credential(received_at, Some("refresh-1".into()));
        assert_eq!(credential.access_token.as_deref(), Some("access-2"));
        assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(
            credential.expires_at.unwrap(),
            received_at + Duration::seconds(7200)
        );
    }

    #[tokio::test]
    async fn complete_authorization_verifies_state_before_exchange() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/token");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "access-1",
                "refresh_token": "refresh-1",
                "expires_in": 3600
            }));
        });

        let client = client_with_token_url(&format!("{}{}", server.base_url(), "/api/token"));
        let request = client.begin_authorization();
        let redirect = Url::parse(&format!(
            "https://x/cb?code=code123&state={}",
            request.pending.state()
        ))
        .unwrap();

        let credential = client
            .complete_authorization(request.pending, &redirect)
            .await
            .unwrap();
        mock.assert();
        assert_eq!(credential.access_token.as_deref(), Some("access-1"));
        assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));
        assert!(credential.expires_at.is_some());
    }

    #[tokio::test]
    async fn complete_authorization_fails_closed_on_state_mismatch() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/token");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "access-1",
                "expires_in": 3600
            }));
        });

        let client = client_with_token_url(&format!("{}{}", server.base_url(), "/api/token"));
        let request = client.begin_authorization();
        let redirect = Url::parse("https://x/cb?code=code123&state=forged").unwrap();

        let err = client
            .complete_authorization(request.pending, &redirect)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
        // The exchange must never fire for a rejected callback.
        mock.assert_hits(0);
    }
}
