mod playback;
mod profile;
mod search;

pub use playback::PlaybackService;
pub use profile::ProfileService;
pub use search::{SearchService, DEFAULT_SEARCH_LIMIT};

use thiserror::Error;

use crate::api::ApiError;
use crate::auth::{AuthError, AuthManager};
use crate::session::StoreError;

/// Errors surfaced by the high-level service wrappers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not logged in; authorization required")]
    NotAuthenticated,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Admit the call through the credential guard, or report that the user must
/// log in again.
pub(crate) async fn require_token(auth: &AuthManager) -> ServiceResult<String> {
    auth.ensure_access_token()
        .await?
        .ok_or(ServiceError::NotAuthenticated)
}
