//! Service configuration.
//!
//! Secrets and deployment settings come from environment variables (a `.env`
//! file is honoured by the binaries). Provider metadata can be overridden with
//! a TOML file named by `GROVE_PROVIDERS_CONFIG`; anything not listed there
//! keeps the built-in defaults.

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use grove_auth::{OAuthConfig, Provider};
use serde::Deserialize;

use crate::extractor::GeminiConfig;
use crate::{GroveError, Result};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to read provider config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse provider config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct GroveConfig {
    pub addr: SocketAddr,
    pub database_path: PathBuf,
    /// Public origin of the service, used to build OAuth redirect URIs.
    pub app_url: String,
    pub encryption_key: String,
    pub google: Option<ClientCredentials>,
    pub github: Option<ClientCredentials>,
    pub gemini: Option<GeminiConfig>,
    pub sync_interval: Duration,
    pub providers: ProvidersConfig,
}

impl GroveConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GROVE_ADDR` | `127.0.0.1:3000` |
    /// | `GROVE_DATABASE_PATH` | `grove.db` |
    /// | `GROVE_APP_URL` | `http://localhost:3000` |
    /// | `TOKEN_ENCRYPTION_KEY` | (required, 64 hex chars) |
    /// | `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` | unset disables Gmail and Google Fit |
    /// | `GITHUB_CLIENT_ID` / `GITHUB_CLIENT_SECRET` | unset disables GitHub |
    /// | `GOOGLE_GEMINI_API_KEY`, `GEMINI_MODEL` | unset disables chat logging |
    /// | `GROVE_SYNC_INTERVAL_SECS` | `3600` |
    /// | `GROVE_PROVIDERS_CONFIG` | built-in provider defaults |
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let addr = env::var("GROVE_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "GROVE_ADDR",
                reason: e.to_string(),
            })?;

        let database_path = env::var("GROVE_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("grove.db"));

        let app_url =
            env::var("GROVE_APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let encryption_key = env::var("TOKEN_ENCRYPTION_KEY")
            .map_err(|_| ConfigError::Missing("TOKEN_ENCRYPTION_KEY"))?;

        let sync_interval = match env::var("GROVE_SYNC_INTERVAL_SECS") {
            Ok(raw) => Duration::from_secs(raw.parse().map_err(|_| ConfigError::Invalid {
                key: "GROVE_SYNC_INTERVAL_SECS",
                reason: format!("{raw:?} is not a number of seconds"),
            })?),
            Err(_) => Duration::from_secs(60 * 60),
        };

        let providers = match env::var("GROVE_PROVIDERS_CONFIG") {
            Ok(path) => ProvidersConfig::load(Path::new(&path))?,
            Err(_) => ProvidersConfig::default(),
        };

        Ok(Self {
            addr,
            database_path,
            app_url,
            encryption_key,
            google: client_credentials("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"),
            github: client_credentials("GITHUB_CLIENT_ID", "GITHUB_CLIENT_SECRET"),
            gemini: GeminiConfig::from_env(),
            sync_interval,
            providers,
        })
    }

    /// OAuth client settings for a provider, with the redirect URI pointing
    /// back at this service's callback route.
    pub fn oauth_config(&self, provider: Provider) -> Result<OAuthConfig> {
        let credentials = match provider {
            Provider::Gmail | Provider::GoogleFit => self.google.as_ref(),
            Provider::Github => self.github.as_ref(),
        }
        .ok_or_else(|| {
            GroveError::OAuth(format!("{} OAuth client is not configured", provider.display_name()))
        })?;

        let metadata = self
            .providers
            .get(provider)
            .filter(|c| c.enabled)
            .ok_or_else(|| GroveError::OAuth(format!("{provider} is disabled")))?;

        let extra_auth_params = if provider.uses_refresh_tokens() {
            vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ]
        } else {
            Vec::new()
        };

        Ok(OAuthConfig {
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            auth_url: metadata.auth_url.clone(),
            token_url: metadata.token_url.clone(),
            redirect_uri: Some(format!(
                "{}/api/auth/{}/callback",
                self.app_url.trim_end_matches('/'),
                provider.as_str()
            )),
            scopes: metadata.scopes.clone(),
            extra_auth_params,
        })
    }
}

fn client_credentials(id_var: &str, secret_var: &str) -> Option<ClientCredentials> {
    let client_id = env::var(id_var).ok().filter(|v| !v.is_empty())?;
    let client_secret = env::var(secret_var).ok().filter(|v| !v.is_empty())?;
    Some(ClientCredentials {
        client_id,
        client_secret,
    })
}

/// Provider metadata keyed by provider name (`gmail`, `google_fit`, `github`).
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    pub display_name: String,

    /// Base URL for data API requests.
    pub api_base_url: String,

    pub auth_url: String,

    pub token_url: String,

    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ProvidersConfig {
    /// Load overrides from a TOML file on top of the built-in defaults.
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let overrides: ProvidersConfig =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::default();
        config.providers.extend(overrides.providers);
        Ok(config)
    }

    pub fn get(&self, provider: Provider) -> Option<&ProviderConfig> {
        self.providers.get(provider.as_str())
    }

    pub fn is_enabled(&self, provider: Provider) -> bool {
        self.get(provider).map(|c| c.enabled).unwrap_or(false)
    }

    pub fn api_base_url(&self, provider: Provider) -> Option<&str> {
        self.get(provider).map(|c| c.api_base_url.as_str())
    }

    /// Point every provider's data API at `base_url`. Used by tests that stand
    /// in a local server for the real APIs.
    pub fn with_api_base_url(mut self, base_url: &str) -> Self {
        for config in self.providers.values_mut() {
            config.api_base_url = base_url.to_string();
        }
        self
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ProvidersConfig {
    pub fn with_defaults() -> Self {
        let mut providers = HashMap::new();

        providers.insert(
            Provider::Gmail.as_str().to_string(),
            ProviderConfig {
                enabled: true,
                display_name: "Gmail".to_string(),
                api_base_url: "https://gmail.googleapis.com/gmail/v1".to_string(),
                auth_url: GOOGLE_AUTH_URL.to_string(),
                token_url: GOOGLE_TOKEN_URL.to_string(),
                scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
            },
        );

        providers.insert(
            Provider::GoogleFit.as_str().to_string(),
            ProviderConfig {
                enabled: true,
                display_name: "Google Fit".to_string(),
                api_base_url: "https://www.googleapis.com/fitness/v1".to_string(),
                auth_url: GOOGLE_AUTH_URL.to_string(),
                token_url: GOOGLE_TOKEN_URL.to_string(),
                scopes: vec![
                    "https://www.googleapis.com/auth/fitness.activity.read".to_string(),
                    "https://www.googleapis.com/auth/fitness.location.read".to_string(),
                ],
            },
        );

        providers.insert(
            Provider::Github.as_str().to_string(),
            ProviderConfig {
                enabled: true,
                display_name: "GitHub".to_string(),
                api_base_url: "https://api.github.com".to_string(),
                auth_url: "https://github.com/login/oauth/authorize".to_string(),
                token_url: "https://github.com/login/oauth/access_token".to_string(),
                scopes: vec![
                    "repo".to_string(),
                    "user".to_string(),
                    "read:org".to_string(),
                ],
            },
        );

        Self { providers }
    }
}

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
