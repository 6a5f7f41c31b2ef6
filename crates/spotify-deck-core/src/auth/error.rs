use reqwest::StatusCode;
use thiserror::Error;

use crate::session::StoreError;

/// Errors surfaced by the authorization flow and credential management.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token exchange failed with status {status}: {body}")]
    ExchangeFailed { status: StatusCode, body: String },
    #[error("token refresh failed with status {status}: {body}")]
    RefreshFailed { status: StatusCode, body: String },
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("authorization flow cancelled")]
    Cancelled,
    #[error("authorization request denied ({0})")]
    AccessDenied(String),
    #[error("authorization response missing code parameter")]
    MissingAuthorizationCode,
    #[error("authorization state mismatch")]
    StateMismatch,
    #[error("redirect URI unusable for a loopback listener: {0}")]
    InvalidRedirectUri(String),
    #[error("failed to launch system browser: {0}")]
    BrowserLaunch(String),
    #[error("invalid authorization response: {0}")]
    InvalidAuthorizationResponse(String),
}
