//! Encrypted persistence of per-user OAuth credentials.

use chrono::{DateTime, Utc};
use grove_auth::{AuthToken, Provider, TokenCipher};
use grove_store::{GroveStore, Integration, IntegrationStatus, NewIntegration};
use serde_json::Value;
use tracing::{info, warn};

use crate::Result;

#[derive(Debug, Clone)]
pub struct CredentialStore {
    store: GroveStore,
    cipher: TokenCipher,
}

impl CredentialStore {
    pub fn new(store: GroveStore, cipher: TokenCipher) -> Self {
        Self { store, cipher }
    }

    /// Encrypt and store a freshly issued token, replacing any previous
    /// integration for the pair and marking it active.
    pub async fn save(
        &self,
        user_id: &str,
        token: &AuthToken,
        config: Option<Value>,
    ) -> Result<()> {
        let access_token = self.cipher.encrypt(&token.access_token)?;
        let refresh_token = token
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.encrypt(t))
            .transpose()?;

        self.store
            .upsert_integration(&NewIntegration {
                user_id: user_id.to_string(),
                provider: token.provider,
                access_token,
                refresh_token,
                expires_at: token.expires_at,
                config,
            })
            .await?;
        info!(user = user_id, provider = %token.provider, "stored integration credentials");
        Ok(())
    }

    /// The stored row with tokens still sealed; see [`Self::access_token`].
    pub async fn load(&self, user_id: &str, provider: Provider) -> Result<Option<Integration>> {
        Ok(self.store.get_integration(user_id, provider).await?)
    }

    pub fn access_token(&self, integration: &Integration) -> Result<String> {
        Ok(self.cipher.decrypt(&integration.access_token)?)
    }

    pub fn refresh_token(&self, integration: &Integration) -> Result<Option<String>> {
        Ok(integration
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.decrypt(t))
            .transpose()?)
    }

    pub async fn mark_disconnected(
        &self,
        user_id: &str,
        provider: Provider,
        message: &str,
    ) -> Result<()> {
        warn!(user = user_id, provider = %provider, "disconnecting integration: {}", message);
        self.store
            .set_integration_status(
                user_id,
                provider,
                IntegrationStatus::Disconnected,
                Some(message),
            )
            .await?;
        Ok(())
    }

    /// Persist a refreshed access token. Without a new refresh token the
    /// stored one is kept.
    pub async fn record_refresh(
        &self,
        user_id: &str,
        provider: Provider,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let access_token = self.cipher.encrypt(access_token)?;
        let refresh_token = refresh_token.map(|t| self.cipher.encrypt(t)).transpose()?;
        self.store
            .update_integration_tokens(
                user_id,
                provider,
                &access_token,
                refresh_token.as_deref(),
                expires_at,
            )
            .await?;
        Ok(())
    }
}
