use std::future::Future;

use chrono::Utc;
use url::Url;

use crate::session::Credential;

use super::{AuthError, CallbackParams, OAuthClient};

/// Execute the manual copy/paste login flow.
///
/// The user pastes the full redirect URL from the browser address bar; a bare
/// code is rejected because the state check must fail closed.
pub async fn run_manual_flow<Notify, Input, Fut>(
    client: &OAuthClient,
    open_browser: bool,
    notify_authorization_url: Notify,
    mut read_input: Input,
) -> Result<Credential, AuthError>
where
    Notify: Fn(&Url) -> Result<(), AuthError>,
    Input: FnMut() -> Fut,
    Fut: Future<Output = Result<String, AuthError>>,
{
    let request = client.begin_authorization();
    notify_authorization_url(&request.url)?;

    if open_browser {
        open::that(request.url.as_str())
            .map_err(|err| AuthError::BrowserLaunch(err.to_string()))?;
    }

    let raw = read_input().await?;
    let params = parse_manual_input(raw.trim())?;
    let pkce = request.pending.verify(&params)?;

    let grant = client.exchange_code(&params.code, &pkce).await?;
    Ok(grant.into_credential(Utc::now(), None))
}

fn parse_manual_input(input: &str) -> Result<CallbackParams, AuthError> {
    if input.is_empty() {
        return Err(AuthError::InvalidAuthorizationResponse(
            "empty input".into(),
        ));
    }

    let url = Url::parse(input).map_err(|_| {
        AuthError::InvalidAuthorizationResponse(
            "expected the full redirect URL, including code and state".into(),
        )
    })?;
    CallbackParams::from_url(&url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::sync::{Arc, Mutex};

    use crate::auth::{OAuthClient, OAuthConfig, OAuthEndpoints};

    fn test_client(token_url: Url) -> OAuthClient {
        let config = OAuthConfig::new("client-1", Url::parse("https://x/cb").unwrap());
        let endpoints = OAuthEndpoints {
            authorize_url: Url::parse("https://accounts.spotify.com/authorize").unwrap(),
            token_url,
        };
        OAuthClient::with_endpoints(config, endpoints).unwrap()
    }

    #[tokio::test]
    async fn manual_flow_with_full_redirect() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/token");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "access-1",
                "refresh_token": "refresh-1",
                "expires_in": 3600
            }));
        });

        let client =
            test_client(Url::parse(&format!("{}{}", server.base_url(), "/api/token")).unwrap());
        let state_holder = Arc::new(Mutex::new(String::new()));

        let notify = {
            let state_holder = state_holder.clone();
            move |url: &Url| {
                let state = url
                    .query_pairs()
                    .find(|(k, _)| k == "state")
                    .map(|(_, v)| v.into_owned())
                    .expect("state present");
                *state_holder.lock().unwrap() = state;
                Ok(())
            }
        };

        let read_input = {
            let state_holder = state_holder.clone();
            move || {
                let state_holder = state_holder.clone();
                async move {
                    let state = state_holder.lock().unwrap().clone();
                    Ok(format!("https://x/cb?code=manual-code&state={state}"))
                }
            }
        };

        let credential = run_manual_flow(&client, false, notify, read_input)
            .await
            .expect("manual flow succeeded");

        mock.assert();
        assert_eq!(credential.access_token.as_deref(), Some("access-1"));
        assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn manual_flow_rejects_bare_code() {
        let client = test_client(Url::parse("https://accounts.invalid/api/token").unwrap());
        let err = run_manual_flow(
            &client,
            false,
            |_| Ok(()),
            || async { Ok("raw-code".to_string()) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AuthError::InvalidAuthorizationResponse(_)));
    }

    #[tokio::test]
    async fn manual_flow_state_mismatch() {
        let client = test_client(Url::parse("https://accounts.invalid/api/token").unwrap());
        let err = run_manual_flow(
            &client,
            false,
            |_url: &Url| Ok(()),
            || async { Ok("https://x/cb?code=manual&state=bad".to_string()) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[test]
    fn parse_input_handles_url() {
        let params = parse_manual_input("https://x/cb?code=abc&state=xyz").unwrap();
        assert_eq!(params.code, "abc");
        assert_eq!(params.state.as_deref(), Some("xyz"));
    }

    #[test]
    fn parse_input_access_denied() {
        let err = parse_manual_input("https://x/cb?error=access_denied").unwrap_err();
        assert!(matches!(err, AuthError::AccessDenied(_)));
    }

    #[test]
    fn parse_input_rejects_empty() {
        let err = parse_manual_input("").unwrap_err();
        assert!(matches!(err, AuthError::InvalidAuthorizationResponse(_)));
    }
}
