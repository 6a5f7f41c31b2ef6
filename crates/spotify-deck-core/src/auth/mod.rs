mod callback;
mod error;
mod flow;
mod loopback;
mod manual;
mod oauth;
mod orchestrator;
mod pkce;

pub use callback::{CallbackParams, PendingAuthorization};
pub use error::AuthError;
pub use flow::{FlowPreference, InvalidFlow, LoginFlow};
pub use loopback::run_loopback_flow;
pub use manual::run_manual_flow;
pub use oauth::{
    AuthorizeRequest, OAuthClient, OAuthConfig, OAuthEndpoints, TokenGrant, DEFAULT_SCOPES,
};
pub use orchestrator::AuthManager;
pub use pkce::{random_state, PkcePair};
