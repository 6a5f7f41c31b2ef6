use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use url::Url;

use crate::session::{Credential, SessionHandle};

use super::loopback::run_loopback_flow;
use super::manual::run_manual_flow;
use super::{AuthError, AuthorizeRequest, OAuthClient, PendingAuthorization};

/// Safety margin against clock drift and in-flight request latency.
const REFRESH_SKEW_SECONDS: i64 = 60;

/// Coordinates login flows, the credential lifecycle, and token refresh.
///
/// One instance per session; all token access for API calls goes through
/// [`AuthManager::ensure_access_token`].
pub struct AuthManager {
    oauth: OAuthClient,
    session: SessionHandle,
    refresh_skew: Duration,
    // Serializes refresh decisions so concurrent stale callers trigger at
    // most one refresh request.
    refresh_gate: Mutex<()>,
}

impl AuthManager {
    pub fn new(oauth: OAuthClient, session: SessionHandle) -> Self {
        Self {
            oauth,
            session,
            refresh_skew: Duration::seconds(REFRESH_SKEW_SECONDS),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    /// Compose a fresh authorize URL.
    ///
    /// The caller keeps the returned attempt (verifier + state) until the
    /// redirect comes back, then feeds it to [`AuthManager::complete_login`].
    pub fn begin_login(&self) -> AuthorizeRequest {
        self.oauth.begin_authorization()
    }

    /// Finish a login attempt from the redirect URL delivered to the callback
    /// route, storing the credential durably.
    pub async fn complete_login(
        &self,
        pending: PendingAuthorization,
        redirect_url: &Url,
    ) -> Result<Credential, AuthError> {
        let credential = self
            .oauth
            .complete_authorization(pending, redirect_url)
            .await?;
        self.session.set_credential(credential.clone()).await?;
        tracing::debug!("login completed; credential stored");
        Ok(credential)
    }

    /// Log in via the loopback listener bound to the registered redirect URI.
    pub async fn login_with_loopback<F>(
        &self,
        open_browser: bool,
        notify: F,
    ) -> Result<Credential, AuthError>
    where
        F: Fn(&Url) -> Result<(), AuthError>,
    {
        let credential = run_loopback_flow(&self.oauth, open_browser, notify).await?;
        self.session.set_credential(credential.clone()).await?;
        Ok(credential)
    }

    /// Log in via the manual copy/paste flow.
    pub async fn login_manual<Notify, Input, Fut>(
        &self,
        open_browser: bool,
        notify: Notify,
        read_input: Input,
    ) -> Result<Credential, AuthError>
    where
        Notify: Fn(&Url) -> Result<(), AuthError>,
        Input: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<String, AuthError>>,
    {
        let credential = run_manual_flow(&self.oauth, open_browser, notify, read_input).await?;
        self.session.set_credential(credential.clone()).await?;
        Ok(credential)
    }

    /// Single admission point for authenticated API calls.
    ///
    /// Returns the cached access token while it is still valid (with skew to
    /// spare), refreshes it once when stale and a refresh token exists, and
    /// returns `None` when re-authentication is required. Refresh failures
    /// degrade to `None` without clearing the stored refresh token; an `Err`
    /// only means the refreshed credential could not be persisted.
    pub async fn ensure_access_token(&self) -> Result<Option<String>, AuthError> {
        let _flight = self.refresh_gate.lock().await;

        // Re-read under the gate: a caller that waited here picks up the
        // credential written by the refresh that ran before it.
        let credential = self.session.credential().await;
        if let Some(token) = credential.usable_access_token(Utc::now(), self.refresh_skew) {
            return Ok(Some(token.to_owned()));
        }

        let Some(refresh_token) = credential.refresh_token.clone() else {
            return Ok(None);
        };

        match self.oauth.refresh_access_token(&refresh_token).await {
            Ok(grant) => {
                let refreshed = grant.into_credential(Utc::now(), Some(refresh_token));
                let token = refreshed.access_token.clone();
                self.session.set_credential(refreshed).await?;
                tracing::debug!("access token refreshed");
                Ok(token)
            }
            Err(err) => {
                tracing::warn!(error = %err, "token refresh failed; re-authentication required");
                Ok(None)
            }
        }
    }

    /// Forget the credential and profile; the next guarded call returns `None`.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.session.clear_auth().await?;
        tracing::debug!("session credential cleared");
        Ok(())
    }
}
