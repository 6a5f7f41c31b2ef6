mod store;

pub use store::{FileSessionStore, MemorySessionStore, PersistedSession, SessionStore, StoreError};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::api::{TrackSummary, UserProfile};

/// Access/refresh token pair together with the instant the access token expires.
///
/// An access token is never stored without its expiry; both are written in one
/// step from a token grant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token,
            expires_at: Some(expires_at),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }

    /// The access token, provided it is still valid at `now` with `skew` to spare.
    pub fn usable_access_token(&self, now: DateTime<Utc>, skew: Duration) -> Option<&str> {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(expires_at)) if now < expires_at - skew => Some(token.as_str()),
            _ => None,
        }
    }
}

/// Interface language preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    #[default]
    Pt,
    Fr,
}

impl std::str::FromStr for Language {
    type Err = InvalidLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "pt" => Ok(Language::Pt),
            "fr" => Ok(Language::Fr),
            other => Err(InvalidLanguage(other.to_owned())),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Language::En => "en",
            Language::Pt => "pt",
            Language::Fr => "fr",
        };
        write!(f, "{value}")
    }
}

/// Error reported when parsing an unsupported language code.
#[derive(Debug, thiserror::Error)]
#[error("unsupported language '{0}'")]
pub struct InvalidLanguage(pub String);

/// Mutable per-process session state.
///
/// Only `client_id`, `credential`, `search_query`, and `language` survive a
/// restart; the remaining fields reset with the process.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub client_id: String,
    pub credential: Credential,
    pub profile: Option<UserProfile>,
    pub playback_device_id: Option<String>,
    pub search_query: String,
    pub search_results: Vec<TrackSummary>,
    pub language: Language,
}

impl Session {
    fn from_persisted(record: PersistedSession) -> Self {
        Self {
            client_id: record.client_id,
            credential: record.credential,
            search_query: record.search_query,
            language: record.language,
            ..Self::default()
        }
    }

    fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            version: store::SCHEMA_VERSION,
            client_id: self.client_id.clone(),
            credential: self.credential.clone(),
            search_query: self.search_query.clone(),
            language: self.language,
        }
    }
}

/// Shared handle to the single per-process session.
///
/// All mutation goes through these accessors; setters touching a persisted
/// field write the record through the store before returning.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    state: Mutex<Session>,
    store: Box<dyn SessionStore + Send + Sync>,
}

impl SessionHandle {
    /// Wrap a store, restoring the persisted subset when a record exists.
    pub fn open(store: impl SessionStore + Send + Sync + 'static) -> Result<Self, StoreError> {
        let session = match store.load()? {
            Some(record) => Session::from_persisted(record),
            None => Session::default(),
        };
        Ok(Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(session),
                store: Box::new(store),
            }),
        })
    }

    pub fn with_default_store() -> Result<Self, StoreError> {
        Self::open(FileSessionStore::with_default_locator()?)
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.state.lock().await.clone()
    }

    pub async fn client_id(&self) -> String {
        self.inner.state.lock().await.client_id.clone()
    }

    pub async fn set_client_id(&self, client_id: impl Into<String>) -> Result<(), StoreError> {
        let mut session = self.inner.state.lock().await;
        session.client_id = client_id.into();
        self.inner.store.save(&session.to_persisted())
    }

    pub async fn credential(&self) -> Credential {
        self.inner.state.lock().await.credential.clone()
    }

    pub async fn set_credential(&self, credential: Credential) -> Result<(), StoreError> {
        let mut session = self.inner.state.lock().await;
        session.credential = credential;
        self.inner.store.save(&session.to_persisted())
    }

    /// Drop the credential and profile, keeping the rest of the session intact.
    pub async fn clear_auth(&self) -> Result<(), StoreError> {
        let mut session = self.inner.state.lock().await;
        session.credential = Credential::default();
        session.profile = None;
        self.inner.store.save(&session.to_persisted())
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        self.inner.state.lock().await.profile.clone()
    }

    pub async fn set_profile(&self, profile: Option<UserProfile>) {
        self.inner.state.lock().await.profile = profile;
    }

    pub async fn playback_device(&self) -> Option<String> {
        self.inner.state.lock().await.playback_device_id.clone()
    }

    pub async fn set_playback_device(&self, device_id: Option<String>) {
        self.inner.state.lock().await.playback_device_id = device_id;
    }

    pub async fn search_query(&self) -> String {
        self.inner.state.lock().await.search_query.clone()
    }

    pub async fn set_search_query(&self, query: impl Into<String>) -> Result<(), StoreError> {
        let mut session = self.inner.state.lock().await;
        session.search_query = query.into();
        self.inner.store.save(&session.to_persisted())
    }

    pub async fn search_results(&self) -> Vec<TrackSummary> {
        self.inner.state.lock().await.search_results.clone()
    }

    pub async fn set_search_results(&self, results: Vec<TrackSummary>) {
        self.inner.state.lock().await.search_results = results;
    }

    pub async fn language(&self) -> Language {
        self.inner.state.lock().await.language
    }

    pub async fn set_language(&self, language: Language) -> Result<(), StoreError> {
        let mut session = self.inner.state.lock().await;
        session.language = language;
        self.inner.store.save(&session.to_persisted())
    }
}
