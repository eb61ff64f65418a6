use std::str::FromStr;

use chrono::Utc;
use grove_auth::Provider;
use tracing::instrument;

use crate::{corrupt, parse_timestamp, GroveStore, Result, SyncLog, SyncStatus};

type SyncLogRow = (i64, String, String, i64, String, Option<String>, String);

impl GroveStore {
    #[instrument(skip(self))]
    pub async fn insert_sync_log(
        &self,
        user_id: &str,
        provider: Provider,
        records_processed: i64,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO sync_logs (user_id, provider, records_processed, status, error, created_at) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
            RETURNING id",
        )
        .bind(user_id)
        .bind(provider.as_str())
        .bind(records_processed)
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Newest first.
    pub async fn recent_sync_logs(&self, user_id: &str, limit: usize) -> Result<Vec<SyncLog>> {
        let rows = sqlx::query_as::<_, SyncLogRow>(
            "SELECT id, user_id, provider, records_processed, status, error, created_at \
            FROM sync_logs WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(id, user_id, provider, records_processed, status, error, created_at)| {
                    Ok(SyncLog {
                        id,
                        user_id,
                        provider: Provider::from_str(&provider)
                            .map_err(|e| corrupt("sync_logs", e))?,
                        records_processed,
                        status: SyncStatus::parse(&status)
                            .ok_or_else(|| corrupt("sync_logs", format!("bad status {status:?}")))?,
                        error,
                        created_at: parse_timestamp(&created_at, "sync_logs")?,
                    })
                },
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use grove_auth::Provider;

    use crate::{GroveStore, SyncStatus};

    #[tokio::test]
    async fn test_sync_logs_newest_first() {
        let store = GroveStore::in_memory().await.unwrap();
        store
            .insert_sync_log("u1", Provider::Github, 3, SyncStatus::Success, None)
            .await
            .unwrap();
        store
            .insert_sync_log(
                "u1",
                Provider::Gmail,
                0,
                SyncStatus::Error,
                Some("provider error: 500"),
            )
            .await
            .unwrap();
        store
            .insert_sync_log("u2", Provider::Github, 1, SyncStatus::Success, None)
            .await
            .unwrap();

        let logs = store.recent_sync_logs("u1", 10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].provider, Provider::Gmail);
        assert_eq!(logs[0].status, SyncStatus::Error);
        assert_eq!(logs[0].error.as_deref(), Some("provider error: 500"));
        assert_eq!(logs[1].records_processed, 3);

        assert_eq!(store.recent_sync_logs("u1", 1).await.unwrap().len(), 1);
    }
}
