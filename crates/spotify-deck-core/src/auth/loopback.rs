use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::session::Credential;

use super::{AuthError, CallbackParams, OAuthClient};

const SUCCESS_HTML: &str = r#"<html><body><h1>Login complete</h1><p>You may close this window and return to the application.</p></body></html>"#;
const ERROR_HTML: &str = r#"<html><body><h1>Login failed</h1><p>Please return to the application for details.</p></body></html>"#;

/// Run the browser-based login flow using a loopback HTTP listener.
///
/// The listener binds the host and port of the configured redirect URI (the
/// provider only redirects to pre-registered URIs) and accepts exactly one
/// connection; the redirect is consumed once and the attempt's secrets are
/// dropped with it.
pub async fn run_loopback_flow<F>(
    client: &OAuthClient,
    open_browser: bool,
    notify_authorization_url: F,
) -> Result<Credential, AuthError>
where
    F: Fn(&Url) -> Result<(), AuthError>,
{
    let redirect = client.config().redirect_uri.clone();
    let host = redirect
        .host_str()
        .ok_or_else(|| AuthError::InvalidRedirectUri("missing host".into()))?
        .to_owned();
    let port = redirect
        .port_or_known_default()
        .ok_or_else(|| AuthError::InvalidRedirectUri("missing port".into()))?;
    let listener = TcpListener::bind((host.as_str(), port)).await?;

    let request = client.begin_authorization();
    notify_authorization_url(&request.url)?;

    if open_browser {
        open::that(request.url.as_str())
            .map_err(|err| AuthError::BrowserLaunch(err.to_string()))?;
    }

    let (mut stream, _addr) = listener.accept().await?;
    let outcome = read_callback(&mut stream, &redirect).await.and_then(|params| {
        let pkce = request.pending.verify(&params)?;
        Ok((params.code, pkce))
    });

    match &outcome {
        Ok(_) => respond(&mut stream, 200, SUCCESS_HTML).await?,
        Err(_) => respond(&mut stream, 400, ERROR_HTML).await?,
    }
    let _ = stream.shutdown().await;

    let (code, pkce) = outcome?;
    tracing::debug!("authorization redirect received; exchanging code");
    let grant = client.exchange_code(&code, &pkce).await?;
    Ok(grant.into_credential(Utc::now(), None))
}

async fn read_callback(
    stream: &mut TcpStream,
    redirect: &Url,
) -> Result<CallbackParams, AuthError> {
    let mut buffer = [0u8; 4096];
    let n = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..n]);
    let path = parse_request_path(&request)?;
    let url = redirect.join(path)?;
    CallbackParams::from_url(&url)
}

fn parse_request_path(request: &str) -> Result<&str, AuthError> {
    let mut lines = request.lines();
    let first_line = lines
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing request line".into()))?;
    let mut parts = first_line.split_whitespace();
    let _method = parts
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing method".into()))?;
    let path = parts
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing path".into()))?;
    Ok(path)
}

async fn respond(stream: &mut TcpStream, status: u16, body: &str) -> Result<(), AuthError> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let response = format!(
        "{status_line}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}
