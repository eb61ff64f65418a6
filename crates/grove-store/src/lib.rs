//! SQLite persistence for Grove: profiles, integrations, metrics, plants and
//! sync history.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions, SqlitePool};
use thiserror::Error;
use tracing::instrument;

pub mod integrations;
pub mod metrics;
pub mod plants;
pub mod profiles;
pub mod schema;
pub mod sync_logs;

pub use schema::*;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct GroveStore {
    pool: SqlitePool,
}

impl GroveStore {
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::from_str("sqlite:")?
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Single-connection in-memory database, used by tests across the workspace.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[instrument(skip_all)]
    async fn init_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS profiles (\
                id TEXT PRIMARY KEY,\
                webhook_token TEXT NOT NULL UNIQUE,\
                onboarding_completed INTEGER NOT NULL DEFAULT 0,\
                created_at TEXT NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS integrations (\
                user_id TEXT NOT NULL,\
                provider TEXT NOT NULL,\
                access_token TEXT NOT NULL,\
                refresh_token TEXT,\
                expires_at TEXT,\
                status TEXT NOT NULL,\
                status_message TEXT,\
                config TEXT NOT NULL DEFAULT '{}',\
                last_synced_at TEXT,\
                updated_at TEXT NOT NULL,\
                PRIMARY KEY (user_id, provider)\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS custom_metrics (\
                user_id TEXT NOT NULL,\
                metric_id TEXT NOT NULL,\
                name TEXT NOT NULL,\
                unit TEXT NOT NULL DEFAULT '',\
                category TEXT NOT NULL,\
                default_goal REAL,\
                source TEXT NOT NULL,\
                created_at TEXT NOT NULL,\
                PRIMARY KEY (user_id, metric_id)\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metric_observations (\
                user_id TEXT NOT NULL,\
                metric_id TEXT NOT NULL,\
                date TEXT NOT NULL,\
                value REAL NOT NULL,\
                source TEXT NOT NULL,\
                note TEXT,\
                raw_data TEXT,\
                updated_at TEXT NOT NULL,\
                UNIQUE (user_id, metric_id, date)\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS plants (\
                id TEXT PRIMARY KEY,\
                user_id TEXT NOT NULL,\
                name TEXT NOT NULL,\
                plant_type TEXT NOT NULL,\
                category TEXT NOT NULL,\
                current_level INTEGER NOT NULL DEFAULT 0,\
                is_active INTEGER NOT NULL DEFAULT 1,\
                position INTEGER NOT NULL DEFAULT 0,\
                created_at TEXT NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_plants_user ON plants(user_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS growth_rules (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                plant_id TEXT NOT NULL REFERENCES plants(id) ON DELETE CASCADE,\
                metric_id TEXT NOT NULL,\
                condition_type TEXT NOT NULL,\
                threshold REAL NOT NULL DEFAULT 0,\
                growth_amount INTEGER NOT NULL,\
                decay_per_day INTEGER NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_growth_rules_plant ON growth_rules(plant_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_logs (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                user_id TEXT NOT NULL,\
                provider TEXT NOT NULL,\
                records_processed INTEGER NOT NULL,\
                status TEXT NOT NULL,\
                error TEXT,\
                created_at TEXT NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub(crate) fn parse_timestamp(raw: &str, table: &'static str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            table,
            detail: format!("bad timestamp {raw:?}: {e}"),
        })
}

pub(crate) fn parse_optional_timestamp(
    raw: Option<String>,
    table: &'static str,
) -> Result<Option<DateTime<Utc>>> {
    raw.map(|r| parse_timestamp(&r, table)).transpose()
}

pub(crate) fn parse_date(raw: &str, table: &'static str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| StoreError::Corrupt {
        table,
        detail: format!("bad date {raw:?}: {e}"),
    })
}

pub(crate) fn corrupt(table: &'static str, detail: impl ToString) -> StoreError {
    StoreError::Corrupt {
        table,
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let store = GroveStore::in_memory().await.unwrap();
        store.init_schema().await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "custom_metrics",
                "growth_rules",
                "integrations",
                "metric_observations",
                "plants",
                "profiles",
                "sync_logs"
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("grove.db");
        let store = GroveStore::connect(&path).await.unwrap();
        store.create_profile("user-1").await.unwrap();
        assert!(path.exists());
    }
}
