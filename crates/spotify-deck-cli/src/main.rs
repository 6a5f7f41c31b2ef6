use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use spotify_deck_core::api::{SpotifyApiClient, TrackSummary, UserProfile};
use spotify_deck_core::auth::{
    AuthError, AuthManager, FlowPreference, LoginFlow, OAuthClient, OAuthConfig,
};
use spotify_deck_core::services::{
    PlaybackService, ProfileService, SearchService, ServiceError, DEFAULT_SEARCH_LIMIT,
};
use spotify_deck_core::session::{Language, SessionHandle};
use tokio::task;
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

#[derive(Parser, Debug)]
#[command(version, about = "Spotify player session CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authentication related commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Show the authenticated user's profile
    Me(MeArgs),
    /// Search tracks
    Search(SearchArgs),
    /// Play track URIs on the active device
    Play(PlayArgs),
    /// Transfer playback to a device
    Transfer(TransferArgs),
    /// Stored session preferences
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Log in via the authorization-code-with-PKCE flow
    Login(LoginArgs),
    /// Forget the stored credential
    Logout,
}

#[derive(Args, Debug)]
struct LoginArgs {
    /// Use the manual copy/paste flow instead of the loopback listener
    #[arg(long)]
    manual: bool,
    /// Spotify application client ID (persisted for later runs)
    #[arg(long = "client-id")]
    client_id: Option<String>,
}

#[derive(Args, Debug)]
struct MeArgs {
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Free-text track query
    query: String,
    /// Maximum number of tracks to return
    #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    limit: usize,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Track URIs (e.g. spotify:track:...)
    #[arg(required = true)]
    uris: Vec<String>,
}

#[derive(Args, Debug)]
struct TransferArgs {
    /// Target device ID
    device_id: String,
    /// Leave playback paused after the transfer
    #[arg(long = "no-play")]
    no_play: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Set the interface language (en, pt, fr)
    Language(LanguageArgs),
    /// Show the stored session preferences
    Show,
}

#[derive(Args, Debug)]
struct LanguageArgs {
    language: Language,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Auth(cmd) => match cmd {
            AuthCommand::Login(args) => auth_login(args).await?,
            AuthCommand::Logout => auth_logout().await?,
        },
        Commands::Me(args) => user_me(args).await?,
        Commands::Search(args) => search_tracks(args).await?,
        Commands::Play(args) => play_uris(args).await?,
        Commands::Transfer(args) => transfer_playback(args).await?,
        Commands::Config(cmd) => match cmd {
            ConfigCommand::Language(args) => config_language(args).await?,
            ConfigCommand::Show => config_show().await?,
        },
    }
    Ok(())
}

struct AppContext {
    auth: Arc<AuthManager>,
    api: SpotifyApiClient,
}

async fn open_context(client_id_flag: Option<String>) -> Result<AppContext> {
    let session = SessionHandle::with_default_store().context("unable to open session store")?;
    let client_id = resolve_client_id(&session, client_id_flag).await?;
    let oauth =
        OAuthClient::new(build_oauth_config(client_id)?).context("failed to build OAuth client")?;
    let auth = Arc::new(AuthManager::new(oauth, session));
    let api = SpotifyApiClient::new().context("failed to build Web API client")?;
    Ok(AppContext { auth, api })
}

/// Client ID resolution order: flag, environment, then the persisted session.
/// A newly supplied value is persisted for later runs.
async fn resolve_client_id(session: &SessionHandle, flag: Option<String>) -> Result<String> {
    if let Some(client_id) = flag.filter(|value| !value.trim().is_empty()) {
        session.set_client_id(client_id.clone()).await?;
        return Ok(client_id);
    }

    if let Ok(client_id) = env::var("SPOTIFY_CLIENT_ID") {
        if !client_id.trim().is_empty() {
            session.set_client_id(client_id.clone()).await?;
            return Ok(client_id);
        }
    }

    let stored = session.client_id().await;
    if !stored.is_empty() {
        return Ok(stored);
    }

    Err(anyhow!(
        "no client ID configured; pass --client-id or set SPOTIFY_CLIENT_ID"
    ))
}

fn build_oauth_config(client_id: String) -> Result<OAuthConfig> {
    let redirect = env::var("SPOTIFY_REDIRECT_URI")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_owned());
    let redirect_uri = Url::parse(&redirect).context("invalid SPOTIFY_REDIRECT_URI")?;

    let mut config = OAuthConfig::new(client_id, redirect_uri);
    if let Ok(scopes) = env::var("SPOTIFY_SCOPES") {
        let requested = scopes
            .split_whitespace()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        if !requested.is_empty() {
            config = config.with_scopes(requested);
        }
    }
    Ok(config)
}

async fn auth_login(args: LoginArgs) -> Result<()> {
    let ctx = open_context(args.client_id).await?;
    let preference = FlowPreference::detect();
    let use_manual = args.manual || preference.preferred() == LoginFlow::Manual;

    let credential = if use_manual {
        ctx.auth
            .login_manual(false, print_authorization_url, || async {
                prompt_for_redirect().await
            })
            .await
    } else {
        match ctx
            .auth
            .login_with_loopback(preference.browser_available(), print_authorization_url)
            .await
        {
            Ok(credential) => Ok(credential),
            Err(AuthError::BrowserLaunch(reason)) => {
                eprintln!(
                    "Failed to launch browser ({reason}); falling back to the manual copy/paste flow."
                );
                ctx.auth
                    .login_manual(false, print_authorization_url, || async {
                        prompt_for_redirect().await
                    })
                    .await
            }
            Err(other) => Err(other),
        }
    }?;

    println!("Login succeeded; session stored.");
    if let Some(expiry) = credential.expires_at {
        println!("Access token expires at {} (UTC).", expiry);
    }

    // Best-effort: a failed profile fetch leaves the session logged in.
    let profiles = ProfileService::new(ctx.auth.clone(), ctx.api.clone());
    match profiles.fetch().await {
        Ok(profile) => println!("Logged in as {}", display_name(&profile)),
        Err(err) => eprintln!("Login succeeded but the profile fetch failed: {err}"),
    }

    Ok(())
}

async fn auth_logout() -> Result<()> {
    let session = SessionHandle::with_default_store().context("unable to open session store")?;
    session
        .clear_auth()
        .await
        .context("failed to clear the stored credential")?;
    println!("Logged out; stored credential cleared.");
    Ok(())
}

async fn user_me(args: MeArgs) -> Result<()> {
    let ctx = open_context(None).await?;
    let profiles = ProfileService::new(ctx.auth.clone(), ctx.api.clone());
    let profile = profiles.fetch().await.map_err(login_hint)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        render_profile(&profile);
    }
    Ok(())
}

async fn search_tracks(args: SearchArgs) -> Result<()> {
    let ctx = open_context(None).await?;
    let searches = SearchService::new(ctx.auth.clone(), ctx.api.clone());
    let tracks = searches
        .search(&args.query, args.limit)
        .await
        .map_err(login_hint)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tracks)?);
        return Ok(());
    }

    if tracks.is_empty() {
        println!("No tracks matched '{}'.", args.query);
        return Ok(());
    }

    for (index, track) in tracks.iter().enumerate() {
        println!("{:2}. {}", index + 1, track_line(track));
        println!("    {}", track.uri);
    }
    Ok(())
}

async fn play_uris(args: PlayArgs) -> Result<()> {
    let ctx = open_context(None).await?;
    let playback = PlaybackService::new(ctx.auth.clone(), ctx.api.clone());
    playback.play(&args.uris).await.map_err(login_hint)?;
    println!("Playback started ({} URI(s)).", args.uris.len());
    Ok(())
}

async fn transfer_playback(args: TransferArgs) -> Result<()> {
    let ctx = open_context(None).await?;
    let playback = PlaybackService::new(ctx.auth.clone(), ctx.api.clone());
    playback
        .transfer_to(&args.device_id, !args.no_play)
        .await
        .map_err(login_hint)?;
    println!("Playback transferred to device '{}'.", args.device_id);
    Ok(())
}

async fn config_language(args: LanguageArgs) -> Result<()> {
    let session = SessionHandle::with_default_store().context("unable to open session store")?;
    session.set_language(args.language).await?;
    println!("Language preference set to '{}'.", args.language);
    Ok(())
}

async fn config_show() -> Result<()> {
    let session = SessionHandle::with_default_store().context("unable to open session store")?;
    let snapshot = session.snapshot().await;

    let client_id = if snapshot.client_id.is_empty() {
        "(unset)"
    } else {
        snapshot.client_id.as_str()
    };
    println!("Client ID : {}", client_id);
    println!("Language  : {}", snapshot.language);
    if !snapshot.search_query.is_empty() {
        println!("Last query: {}", snapshot.search_query);
    }

    let credential = &snapshot.credential;
    match (&credential.access_token, credential.expires_at) {
        (Some(_), Some(expiry)) => println!("Session   : access token expires {} (UTC)", expiry),
        _ if credential.refresh_token.is_some() => {
            println!("Session   : stale; will refresh on next use")
        }
        _ => println!("Session   : logged out"),
    }
    Ok(())
}

/// Map the guard's "no usable credential" outcome to a login prompt instead
/// of a bare error chain.
fn login_hint(err: ServiceError) -> anyhow::Error {
    match err {
        ServiceError::NotAuthenticated => {
            anyhow!("not logged in; run `spotify-deck auth login`")
        }
        other => anyhow::Error::new(other),
    }
}

fn print_authorization_url(url: &Url) -> Result<(), AuthError> {
    println!("\nAuthorize the application by visiting:\n  {}\n", url);
    Ok(())
}

async fn prompt_for_redirect() -> Result<String, AuthError> {
    task::spawn_blocking(|| {
        use std::io::{self, Write};
        print!("Paste the full redirect URL: ");
        io::stdout().flush().map_err(AuthError::Io)?;
        let mut input = String::new();
        io::stdin().read_line(&mut input).map_err(AuthError::Io)?;
        Ok(input.trim().to_owned())
    })
    .await
    .map_err(|_| AuthError::Cancelled)?
}

fn display_name(profile: &UserProfile) -> String {
    profile
        .display_name
        .clone()
        .unwrap_or_else(|| profile.id.clone())
}

fn track_line(track: &TrackSummary) -> String {
    let artists = track.artist_names();
    if artists.is_empty() {
        track.name.clone()
    } else {
        format!("{} - {}", track.name, artists)
    }
}

fn render_profile(profile: &UserProfile) {
    println!("User ID : {}", profile.id);
    if let Some(name) = &profile.display_name {
        println!("Name    : {}", name);
    }
    if let Some(email) = &profile.email {
        println!("Email   : {}", email);
    }
    if let Some(product) = &profile.product {
        println!("Product : {}", product);
    }
    if let Some(country) = &profile.country {
        println!("Country : {}", country);
    }
}
