use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::errors::ConfigError;

/// Wallet portal backend endpoints
pub mod endpoints {
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
    pub const SESSION_BRIDGE: &str = "/wallet-portal/sessions/bridge";
    pub const SESSION_REFRESH: &str = "/wallet-portal/sessions/refresh";
}

/// Storage key under which the access token is persisted
pub const ACCESS_TOKEN_KEY: &str = "wallet_portal_access_token";

/// Name of the URL parameter carrying the one-time link credential
pub const LINK_TOKEN_PARAM: &str = "token";

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpTimeouts {
    #[serde(with = "secs")]
    pub connect: Duration,
    #[serde(with = "secs")]
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Configuration for PortalClient
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Backend origin every request path is joined onto
    pub base_url: Url,

    /// Path of the link-credential exchange endpoint
    pub bridge_path: String,

    /// Path of the cookie-backed refresh endpoint
    pub refresh_path: String,

    /// Key used by the token store
    pub storage_key: String,

    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,
}

impl PortalConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            bridge_path: endpoints::SESSION_BRIDGE.to_string(),
            refresh_path: endpoints::SESSION_REFRESH.to_string(),
            storage_key: ACCESS_TOKEN_KEY.to_string(),
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("wallet-portal".to_string()),
        }
    }

    /// Load configuration from a TOML file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Default config file location for the current platform
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let project_dirs = directories::ProjectDirs::from("", "", "wallet-portal")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(project_dirs.config_dir().join("config.toml"))
    }

    /// Resolve a request path against the base URL
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self::new(Url::parse(endpoints::DEFAULT_BASE_URL).expect("valid default base URL"))
    }
}
