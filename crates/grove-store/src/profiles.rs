use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::{parse_timestamp, GroveStore, Profile, Result};

type ProfileRow = (String, String, bool, String);

fn profile_from_row((id, webhook_token, onboarding_completed, created_at): ProfileRow) -> Result<Profile> {
    Ok(Profile {
        id,
        webhook_token,
        onboarding_completed,
        created_at: parse_timestamp(&created_at, "profiles")?,
    })
}

impl GroveStore {
    /// Create the profile with a fresh webhook token, or return the one that
    /// already exists.
    #[instrument(skip(self))]
    pub async fn create_profile(&self, user_id: &str) -> Result<Profile> {
        sqlx::query(
            "INSERT INTO profiles (id, webhook_token, onboarding_completed, created_at) \
            VALUES (?1, ?2, 0, ?3) \
            ON CONFLICT(id) DO NOTHING",
        )
        .bind(user_id)
        .bind(Uuid::new_v4().simple().to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, webhook_token, onboarding_completed, created_at FROM profiles WHERE id = ?1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        profile_from_row(row)
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, webhook_token, onboarding_completed, created_at FROM profiles WHERE id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(profile_from_row).transpose()
    }

    pub async fn find_profile_by_webhook_token(&self, token: &str) -> Result<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, webhook_token, onboarding_completed, created_at FROM profiles WHERE webhook_token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(profile_from_row).transpose()
    }

    #[instrument(skip(self))]
    pub async fn mark_onboarding_completed(&self, user_id: &str) -> Result<()> {
        sqlx::query("UPDATE profiles SET onboarding_completed = 1 WHERE id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
