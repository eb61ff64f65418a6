//! OAuth plumbing and token encryption for Grove integrations.
//!
//! - [`Provider`]: the external data sources a user can connect
//! - [`AuthBridge`]: authorization URLs, code exchange and refresh via `oauth2`
//! - [`TokenCipher`]: AES-256-GCM encryption for tokens stored at rest

pub mod crypto;

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use reqwest::redirect::Policy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use crypto::{CipherError, TokenCipher};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Gmail,
    GoogleFit,
    Github,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Gmail, Provider::GoogleFit, Provider::Github];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::GoogleFit => "google_fit",
            Provider::Github => "github",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Gmail => "Gmail",
            Provider::GoogleFit => "Google Fit",
            Provider::Github => "GitHub",
        }
    }

    /// Google issues short-lived access tokens plus a refresh token; GitHub
    /// OAuth app tokens never expire.
    pub fn uses_refresh_tokens(&self) -> bool {
        matches!(self, Provider::Gmail | Provider::GoogleFit)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "gmail" | "google" => Ok(Provider::Gmail),
            "google_fit" | "google-fit" => Ok(Provider::GoogleFit),
            "github" => Ok(Provider::Github),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub provider: Provider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: Option<String>,
    pub scopes: Vec<String>,
    /// Extra authorization parameters, e.g. Google's `access_type=offline`.
    pub extra_auth_params: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct AuthBridge {
    http_client: Client,
}

impl Default for AuthBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthBridge {
    pub fn new() -> Self {
        let http_client = Client::builder()
            .redirect(Policy::none())
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http_client }
    }

    /// Build the provider authorization URL. The user id travels through the
    /// flow as the `state` parameter and comes back on the callback.
    pub fn authorize_url(&self, config: &OAuthConfig, state: &str) -> Result<String> {
        let client = build_client(config)?;
        let state = state.to_string();
        let mut req = client.authorize_url(move || CsrfToken::new(state));
        for scope in &config.scopes {
            req = req.add_scope(Scope::new(scope.clone()));
        }
        for (name, value) in &config.extra_auth_params {
            req = req.add_extra_param(name.as_str(), value.as_str());
        }
        let (url, _csrf) = req.url();
        Ok(url.to_string())
    }

    pub async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        config: &OAuthConfig,
    ) -> Result<AuthToken> {
        let client = build_client(config)?;
        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| anyhow!("{} code exchange failed: {}", provider, e))?;

        info!("exchanged OAuth code for {} token", provider.as_str());
        Ok(into_auth_token(provider, &token))
    }

    pub async fn refresh_token(
        &self,
        provider: Provider,
        refresh_token: &str,
        config: &OAuthConfig,
    ) -> Result<AuthToken> {
        let client = build_client(config)?;
        let token = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| anyhow!("{} token refresh failed: {}", provider, e))?;

        info!("refreshed {} access token", provider.as_str());
        Ok(into_auth_token(provider, &token))
    }
}

fn into_auth_token(provider: Provider, token: &BasicTokenResponse) -> AuthToken {
    let access_token = token.access_token().secret().to_string();
    let refresh_token = token.refresh_token().map(|t| t.secret().to_string());
    let expires_at = token
        .expires_in()
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .map(|d| Utc::now() + d);
    let scope = token.scopes().map(|scopes| {
        scopes
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    });
    let token_type = Some(token.token_type().as_ref().to_string());

    AuthToken {
        provider,
        access_token,
        refresh_token,
        expires_at,
        scope,
        token_type,
    }
}

type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

fn build_client(config: &OAuthConfig) -> Result<ConfiguredClient> {
    let auth_url =
        AuthUrl::new(config.auth_url.clone()).map_err(|_| anyhow!("invalid auth_url"))?;
    let token_url =
        TokenUrl::new(config.token_url.clone()).map_err(|_| anyhow!("invalid token_url"))?;
    let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
        .set_client_secret(ClientSecret::new(config.client_secret.clone()))
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_auth_type(AuthType::RequestBody);
    if let Some(redirect_uri) = &config.redirect_uri {
        client = client.set_redirect_uri(RedirectUrl::new(redirect_uri.clone())?);
    }
    Ok(client)
}
