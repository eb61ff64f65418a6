use std::str::FromStr;

use chrono::{DateTime, Utc};
use grove_auth::Provider;
use serde_json::Value;
use tracing::instrument;

use crate::{
    corrupt, parse_optional_timestamp, parse_timestamp, GroveStore, Integration,
    IntegrationStatus, NewIntegration, Result,
};

type IntegrationRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    String,
    Option<String>,
    String,
);

const SELECT_INTEGRATION: &str = "SELECT user_id, provider, access_token, refresh_token, expires_at, \
    status, status_message, config, last_synced_at, updated_at FROM integrations";

fn integration_from_row(row: IntegrationRow) -> Result<Integration> {
    let (
        user_id,
        provider,
        access_token,
        refresh_token,
        expires_at,
        status,
        status_message,
        config,
        last_synced_at,
        updated_at,
    ) = row;
    Ok(Integration {
        user_id,
        provider: Provider::from_str(&provider).map_err(|e| corrupt("integrations", e))?,
        access_token,
        refresh_token,
        expires_at: parse_optional_timestamp(expires_at, "integrations")?,
        status: IntegrationStatus::parse(&status)
            .ok_or_else(|| corrupt("integrations", format!("bad status {status:?}")))?,
        status_message,
        config: serde_json::from_str(&config)?,
        last_synced_at: parse_optional_timestamp(last_synced_at, "integrations")?,
        updated_at: parse_timestamp(&updated_at, "integrations")?,
    })
}

impl GroveStore {
    /// Insert or replace the (user, provider) integration and mark it active.
    /// A missing refresh token or config keeps whatever was stored before.
    #[instrument(skip(self, integration), fields(user = %integration.user_id, provider = %integration.provider))]
    pub async fn upsert_integration(&self, integration: &NewIntegration) -> Result<()> {
        let config = integration
            .config
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            "INSERT INTO integrations \
                (user_id, provider, access_token, refresh_token, expires_at, status, status_message, config, updated_at) \
            VALUES (?1, ?2, ?3, ?4, ?5, 'active', NULL, COALESCE(?6, '{}'), ?7) \
            ON CONFLICT(user_id, provider) DO UPDATE SET \
                access_token=excluded.access_token, \
                refresh_token=COALESCE(?4, integrations.refresh_token), \
                expires_at=excluded.expires_at, \
                status='active', \
                status_message=NULL, \
                config=COALESCE(?6, integrations.config), \
                updated_at=excluded.updated_at",
        )
        .bind(&integration.user_id)
        .bind(integration.provider.as_str())
        .bind(&integration.access_token)
        .bind(&integration.refresh_token)
        .bind(integration.expires_at.map(|t| t.to_rfc3339()))
        .bind(config)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_integration(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<Integration>> {
        let row = sqlx::query_as::<_, IntegrationRow>(&format!(
            "{SELECT_INTEGRATION} WHERE user_id = ?1 AND provider = ?2"
        ))
        .bind(user_id)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(integration_from_row).transpose()
    }

    pub async fn list_integrations(&self, user_id: &str) -> Result<Vec<Integration>> {
        let rows = sqlx::query_as::<_, IntegrationRow>(&format!(
            "{SELECT_INTEGRATION} WHERE user_id = ?1 ORDER BY provider"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(integration_from_row).collect()
    }

    /// Every active integration across all users, for the scheduled sweep.
    pub async fn list_active_integrations(&self) -> Result<Vec<(String, Provider)>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT user_id, provider FROM integrations WHERE status = 'active' ORDER BY user_id, provider",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(user_id, provider)| {
                let provider =
                    Provider::from_str(&provider).map_err(|e| corrupt("integrations", e))?;
                Ok((user_id, provider))
            })
            .collect()
    }

    #[instrument(skip(self))]
    pub async fn set_integration_status(
        &self,
        user_id: &str,
        provider: Provider,
        status: IntegrationStatus,
        message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE integrations SET status = ?3, status_message = ?4, updated_at = ?5 \
            WHERE user_id = ?1 AND provider = ?2",
        )
        .bind(user_id)
        .bind(provider.as_str())
        .bind(status.as_str())
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a refreshed token pair. The stored refresh token survives when
    /// the provider did not issue a new one.
    #[instrument(skip(self, access_token, refresh_token))]
    pub async fn update_integration_tokens(
        &self,
        user_id: &str,
        provider: Provider,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE integrations SET \
                access_token = ?3, \
                refresh_token = COALESCE(?4, refresh_token), \
                expires_at = ?5, \
                status = 'active', \
                status_message = NULL, \
                updated_at = ?6 \
            WHERE user_id = ?1 AND provider = ?2",
        )
        .bind(user_id)
        .bind(provider.as_str())
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn touch_last_synced(
        &self,
        user_id: &str,
        provider: Provider,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE integrations SET last_synced_at = ?3, updated_at = ?3 \
            WHERE user_id = ?1 AND provider = ?2",
        )
        .bind(user_id)
        .bind(provider.as_str())
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Provider config JSON, `{}` when nothing was stored.
    pub async fn integration_config(&self, user_id: &str, provider: Provider) -> Result<Value> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT config FROM integrations WHERE user_id = ?1 AND provider = ?2",
        )
        .bind(user_id)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some((config,)) => Ok(serde_json::from_str(&config)?),
            None => Ok(Value::Object(Default::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use grove_auth::Provider;
    use serde_json::json;

    use crate::{GroveStore, IntegrationStatus, NewIntegration};

    fn google(user: &str, access: &str, refresh: Option<&str>) -> NewIntegration {
        NewIntegration {
            user_id: user.to_string(),
            provider: Provider::Gmail,
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            config: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_reactivates() {
        let store = GroveStore::in_memory().await.unwrap();
        store
            .upsert_integration(&google("u1", "enc-a", Some("enc-r")))
            .await
            .unwrap();
        store
            .set_integration_status(
                "u1",
                Provider::Gmail,
                IntegrationStatus::Disconnected,
                Some("revoked"),
            )
            .await
            .unwrap();

        store
            .upsert_integration(&google("u1", "enc-b", None))
            .await
            .unwrap();

        let row = store
            .get_integration("u1", Provider::Gmail)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.access_token, "enc-b");
        assert_eq!(row.refresh_token.as_deref(), Some("enc-r"));
        assert_eq!(row.status, IntegrationStatus::Active);
        assert!(row.status_message.is_none());
        assert_eq!(row.config, json!({}));
    }

    #[tokio::test]
    async fn test_config_kept_on_reconnect() {
        let store = GroveStore::in_memory().await.unwrap();
        let mut first = google("u1", "a", Some("r"));
        first.config = Some(json!({"label": "INBOX"}));
        store.upsert_integration(&first).await.unwrap();
        store.upsert_integration(&google("u1", "b", None)).await.unwrap();

        let config = store.integration_config("u1", Provider::Gmail).await.unwrap();
        assert_eq!(config, json!({"label": "INBOX"}));
        assert_eq!(
            store.integration_config("u1", Provider::Github).await.unwrap(),
            json!({})
        );
    }

    #[tokio::test]
    async fn test_update_tokens_keeps_refresh_token() {
        let store = GroveStore::in_memory().await.unwrap();
        store
            .upsert_integration(&google("u1", "old", Some("refresh")))
            .await
            .unwrap();
        let expiry = Utc::now() + Duration::hours(2);
        store
            .update_integration_tokens("u1", Provider::Gmail, "new", None, Some(expiry))
            .await
            .unwrap();

        let row = store
            .get_integration("u1", Provider::Gmail)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.access_token, "new");
        assert_eq!(row.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(
            row.expires_at.map(|t| t.timestamp()),
            Some(expiry.timestamp())
        );
    }

    #[tokio::test]
    async fn test_list_active_integrations_skips_disconnected() {
        let store = GroveStore::in_memory().await.unwrap();
        store.upsert_integration(&google("u1", "a", None)).await.unwrap();
        store.upsert_integration(&google("u2", "a", None)).await.unwrap();
        store
            .upsert_integration(&NewIntegration {
                provider: Provider::Github,
                expires_at: None,
                ..google("u2", "gh", None)
            })
            .await
            .unwrap();
        store
            .set_integration_status("u1", Provider::Gmail, IntegrationStatus::Disconnected, None)
            .await
            .unwrap();

        let active = store.list_active_integrations().await.unwrap();
        assert_eq!(
            active,
            vec![
                ("u2".to_string(), Provider::Github),
                ("u2".to_string(), Provider::Gmail),
            ]
        );
    }

    #[tokio::test]
    async fn test_touch_last_synced() {
        let store = GroveStore::in_memory().await.unwrap();
        store.upsert_integration(&google("u1", "a", None)).await.unwrap();
        let now = Utc::now();
        store
            .touch_last_synced("u1", Provider::Gmail, now)
            .await
            .unwrap();

        let row = store
            .get_integration("u1", Provider::Gmail)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            row.last_synced_at.map(|t| t.timestamp()),
            Some(now.timestamp())
        );
    }
}
