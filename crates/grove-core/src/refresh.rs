//! Keeps provider access tokens usable.
//!
//! Google access tokens live for an hour and are refreshed when they are
//! within [`REFRESH_MARGIN_MINUTES`] of expiring. GitHub tokens carry no expiry and
//! are returned as stored. Any refresh failure moves the integration to the
//! terminal `disconnected` state, which only a new authorization clears.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use grove_auth::{AuthBridge, AuthToken, Provider};
use tracing::{debug, info, instrument};

use crate::config::GroveConfig;
use crate::credentials::CredentialStore;
use crate::{GroveError, Result};

/// Minutes before expiry at which a stored token is treated as stale.
pub const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait RefreshClient: Send + Sync {
    async fn refresh(&self, provider: Provider, refresh_token: &str) -> Result<AuthToken>;
}

/// [`RefreshClient`] backed by the provider's OAuth token endpoint.
pub struct OAuthRefreshClient {
    bridge: AuthBridge,
    config: Arc<GroveConfig>,
}

impl OAuthRefreshClient {
    pub fn new(bridge: AuthBridge, config: Arc<GroveConfig>) -> Self {
        Self { bridge, config }
    }
}

#[async_trait]
impl RefreshClient for OAuthRefreshClient {
    async fn refresh(&self, provider: Provider, refresh_token: &str) -> Result<AuthToken> {
        let oauth = self.config.oauth_config(provider)?;
        self.bridge
            .refresh_token(provider, refresh_token, &oauth)
            .await
            .map_err(|e| GroveError::RefreshFailed(e.to_string()))
    }
}

#[derive(Clone)]
pub struct TokenRefresher {
    credentials: CredentialStore,
    client: Arc<dyn RefreshClient>,
}

impl TokenRefresher {
    pub fn new(credentials: CredentialStore, client: Arc<dyn RefreshClient>) -> Self {
        Self {
            credentials,
            client,
        }
    }

    pub async fn get_valid_access_token(&self, user_id: &str, provider: Provider) -> Result<String> {
        self.get_valid_access_token_at(user_id, provider, Utc::now())
            .await
    }

    #[instrument(skip(self, now))]
    pub async fn get_valid_access_token_at(
        &self,
        user_id: &str,
        provider: Provider,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let integration = self
            .credentials
            .load(user_id, provider)
            .await?
            .ok_or(GroveError::NotConnected)?;

        if !integration.is_active() {
            return Err(GroveError::RefreshExpired);
        }

        let fresh = match integration.expires_at {
            None => true,
            Some(expires_at) => expires_at > now + Duration::minutes(REFRESH_MARGIN_MINUTES),
        };
        if fresh {
            debug!("stored access token still valid");
            return self.credentials.access_token(&integration);
        }

        let Some(refresh_token) = self.credentials.refresh_token(&integration)? else {
            self.credentials
                .mark_disconnected(user_id, provider, "no refresh token available")
                .await?;
            return Err(GroveError::NotConnected);
        };

        let token = match self.client.refresh(provider, &refresh_token).await {
            Ok(token) => token,
            // Missing OAuth client configuration leaves the integration untouched.
            Err(err @ GroveError::OAuth(_)) => return Err(err),
            Err(err) => {
                let message = format!("token refresh failed: {err}");
                self.credentials
                    .mark_disconnected(user_id, provider, &message)
                    .await?;
                return Err(GroveError::RefreshFailed(err.to_string()));
            }
        };

        self.credentials
            .record_refresh(
                user_id,
                provider,
                &token.access_token,
                token.refresh_token.as_deref(),
                token.expires_at,
            )
            .await?;
        info!(user = user_id, provider = %provider, "refreshed access token");
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use grove_auth::TokenCipher;
    use grove_store::{GroveStore, IntegrationStatus};

    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    /// Counts calls and replays a canned outcome.
    struct FakeRefresh {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
        outcome: std::result::Result<(String, Option<DateTime<Utc>>), String>,
    }

    impl FakeRefresh {
        fn ok(access: &str, expires_at: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                outcome: Ok((access.to_string(), Some(expires_at))),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                outcome: Err(message.to_string()),
            })
        }
    }

    #[async_trait]
    impl RefreshClient for FakeRefresh {
        async fn refresh(&self, provider: Provider, refresh_token: &str) -> Result<AuthToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(refresh_token.to_string());
            match &self.outcome {
                Ok((access, expires_at)) => Ok(AuthToken {
                    provider,
                    access_token: access.clone(),
                    refresh_token: None,
                    expires_at: *expires_at,
                    scope: None,
                    token_type: None,
                }),
                Err(message) => Err(GroveError::RefreshFailed(message.clone())),
            }
        }
    }

    async fn setup(
        client: Arc<FakeRefresh>,
        expires_at: Option<DateTime<Utc>>,
        refresh: Option<&str>,
    ) -> (TokenRefresher, CredentialStore) {
        let store = GroveStore::in_memory().await.unwrap();
        let credentials = CredentialStore::new(store, TokenCipher::from_hex_key(KEY).unwrap());
        credentials
            .save(
                "u1",
                &AuthToken {
                    provider: Provider::Gmail,
                    access_token: "stored-access".to_string(),
                    refresh_token: refresh.map(str::to_string),
                    expires_at,
                    scope: None,
                    token_type: None,
                },
                None,
            )
            .await
            .unwrap();
        (TokenRefresher::new(credentials.clone(), client), credentials)
    }

    #[tokio::test]
    async fn test_valid_token_returned_without_network() {
        let now = Utc::now();
        let fake = FakeRefresh::ok("unused", now);
        let (refresher, _) = setup(fake.clone(), Some(now + Duration::minutes(30)), Some("r")).await;

        let token = refresher
            .get_valid_access_token_at("u1", Provider::Gmail, now)
            .await
            .unwrap();
        assert_eq!(token, "stored-access");
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_expiry_is_non_expiring() {
        let fake = FakeRefresh::ok("unused", Utc::now());
        let (refresher, _) = setup(fake.clone(), None, None).await;

        let token = refresher
            .get_valid_access_token("u1", Provider::Gmail)
            .await
            .unwrap();
        assert_eq!(token, "stored-access");
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_token_inside_margin_is_refreshed() {
        let now = Utc::now();
        let new_expiry = now + Duration::hours(1);
        let fake = FakeRefresh::ok("fresh-access", new_expiry);
        let (refresher, credentials) =
            setup(fake.clone(), Some(now + Duration::minutes(4)), Some("the-refresh")).await;

        let token = refresher
            .get_valid_access_token_at("u1", Provider::Gmail, now)
            .await
            .unwrap();
        assert_eq!(token, "fresh-access");
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*fake.seen.lock().unwrap(), vec!["the-refresh".to_string()]);

        let row = credentials.load("u1", Provider::Gmail).await.unwrap().unwrap();
        assert_eq!(credentials.access_token(&row).unwrap(), "fresh-access");
        assert_eq!(
            credentials.refresh_token(&row).unwrap().as_deref(),
            Some("the-refresh")
        );
        assert_eq!(
            row.expires_at.map(|t| t.timestamp()),
            Some(new_expiry.timestamp())
        );

        // Second call inside the new window is served from storage.
        refresher
            .get_valid_access_token_at("u1", Provider::Gmail, now)
            .await
            .unwrap();
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiry_exactly_at_margin_refreshes() {
        let now = Utc::now();
        let fake = FakeRefresh::ok("fresh", now + Duration::hours(1));
        let (refresher, _) = setup(
            fake.clone(),
            Some(now + Duration::minutes(REFRESH_MARGIN_MINUTES)),
            Some("r"),
        ).await;

        refresher
            .get_valid_access_token_at("u1", Provider::Gmail, now)
            .await
            .unwrap();
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_refresh_token_disconnects() {
        let now = Utc::now();
        let fake = FakeRefresh::ok("unused", now);
        let (refresher, credentials) = setup(fake.clone(), Some(now - Duration::minutes(1)), None).await;

        let err = refresher
            .get_valid_access_token_at("u1", Provider::Gmail, now)
            .await
            .unwrap_err();
        assert!(matches!(err, GroveError::NotConnected));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);

        let row = credentials.load("u1", Provider::Gmail).await.unwrap().unwrap();
        assert_eq!(row.status, IntegrationStatus::Disconnected);
        assert_eq!(
            row.status_message.as_deref(),
            Some("no refresh token available")
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_is_terminal() {
        let now = Utc::now();
        let fake = FakeRefresh::failing("invalid_grant");
        let (refresher, credentials) =
            setup(fake.clone(), Some(now - Duration::minutes(1)), Some("revoked")).await;

        let err = refresher
            .get_valid_access_token_at("u1", Provider::Gmail, now)
            .await
            .unwrap_err();
        assert!(matches!(err, GroveError::RefreshFailed(_)));

        let row = credentials.load("u1", Provider::Gmail).await.unwrap().unwrap();
        assert_eq!(row.status, IntegrationStatus::Disconnected);
        assert!(row
            .status_message
            .as_deref()
            .unwrap()
            .contains("invalid_grant"));

        let err = refresher
            .get_valid_access_token_at("u1", Provider::Gmail, now)
            .await
            .unwrap_err();
        assert!(matches!(err, GroveError::RefreshExpired));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_integration_not_connected() {
        let fake = FakeRefresh::ok("unused", Utc::now());
        let (refresher, _) = setup(fake, None, None).await;

        let err = refresher
            .get_valid_access_token("u1", Provider::Github)
            .await
            .unwrap_err();
        assert!(matches!(err, GroveError::NotConnected));
    }
}
