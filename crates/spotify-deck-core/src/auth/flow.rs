use std::env;

/// How the authorization redirect gets back to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFlow {
    /// Loopback HTTP listener on the registered redirect URI.
    Loopback,
    /// User pastes the redirect URL from the browser address bar.
    Manual,
}

/// Helper responsible for inferring which flow to start with.
#[derive(Debug)]
pub struct FlowPreference {
    preferred: LoginFlow,
    browser_available: bool,
}

impl FlowPreference {
    /// Detect the preferred flow based on environment variables and display availability.
    pub fn detect() -> Self {
        if let Some(flow) = env::var("SPOTIFY_DECK_AUTH_FLOW")
            .ok()
            .and_then(|value| value.parse::<LoginFlow>().ok())
        {
            return Self {
                preferred: flow,
                browser_available: matches!(flow, LoginFlow::Loopback),
            };
        }

        let browser_available = browser_available();
        let preferred = if browser_available {
            LoginFlow::Loopback
        } else {
            LoginFlow::Manual
        };
        Self {
            preferred,
            browser_available,
        }
    }

    /// Preferred flow to offer to the user.
    pub fn preferred(&self) -> LoginFlow {
        self.preferred
    }

    /// Whether we should attempt to spawn the system browser automatically.
    pub fn browser_available(&self) -> bool {
        self.browser_available
    }
}

fn browser_available() -> bool {
    if env::var_os("SPOTIFY_DECK_NO_BROWSER").is_some() {
        return false;
    }

    if env::var_os("SSH_CONNECTION").is_some() && env::var_os("DISPLAY").is_none() {
        return false;
    }

    if env::var_os("DISPLAY").is_some() || env::var_os("WAYLAND_DISPLAY").is_some() {
        return true;
    }

    cfg!(target_os = "windows") || cfg!(target_os = "macos")
}

impl std::str::FromStr for LoginFlow {
    type Err = InvalidFlow;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "loopback" | "browser" => Ok(LoginFlow::Loopback),
            "manual" | "paste" => Ok(LoginFlow::Manual),
            other => Err(InvalidFlow(other.to_owned())),
        }
    }
}

impl std::fmt::Display for LoginFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            LoginFlow::Loopback => "loopback",
            LoginFlow::Manual => "manual",
        };
        write!(f, "{value}")
    }
}

/// Error reported when parsing an unsupported flow.
#[derive(Debug, thiserror::Error)]
#[error("invalid login flow '{0}'")]
pub struct InvalidFlow(pub String);
