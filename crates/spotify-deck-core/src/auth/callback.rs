use url::Url;

use super::{AuthError, PkcePair};

/// Verifier and state for one in-flight authorization attempt.
///
/// Consumed by value when the callback arrives, so an attempt can be
/// completed at most once; the PKCE material is never persisted.
#[derive(Debug)]
pub struct PendingAuthorization {
    pkce: PkcePair,
    state: String,
}

impl PendingAuthorization {
    pub(crate) fn new(pkce: PkcePair, state: String) -> Self {
        Self { pkce, state }
    }

    pub fn verifier(&self) -> &str {
        self.pkce.verifier()
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// Check the returned state and release the PKCE material for the exchange.
    ///
    /// A missing state fails closed the same way a mismatched one does.
    pub fn verify(self, params: &CallbackParams) -> Result<PkcePair, AuthError> {
        if params.state.as_deref() != Some(self.state.as_str()) {
            return Err(AuthError::StateMismatch);
        }
        Ok(self.pkce)
    }
}

/// Query parameters carried back on the authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: Option<String>,
}

impl CallbackParams {
    /// Extract code and state from a redirect URL.
    ///
    /// A provider `error` parameter or an absent code rejects the callback.
    pub fn from_url(url: &Url) -> Result<Self, AuthError> {
        let mut code: Option<String> = None;
        let mut state: Option<String> = None;
        let mut error: Option<String> = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(err) = error {
            return Err(AuthError::AccessDenied(err));
        }

        let code = code.ok_or(AuthError::MissingAuthorizationCode)?;
        Ok(Self { code, state })
    }
}
