//! On-demand provider sync.

use axum::extract::State;
use axum::Json;
use grove_auth::Provider;
use grove_core::GroveError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "providerId")]
    pub provider_id: String,
}

/// `POST /api/integrations/sync`
pub async fn sync(State(state): State<AppState>, Json(req): Json<SyncRequest>) -> Result<Json<Value>> {
    let provider: Provider = req.provider_id.parse().map_err(GroveError::from)?;
    let outcome = state.grove.sync_integration(&req.user_id, provider).await?;
    Ok(Json(json!({
        "success": true,
        "provider": outcome.provider,
        "records_processed": outcome.records_processed,
        "updates": outcome.updates,
    })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use grove_auth::{AuthToken, Provider};
    use serde_json::json;

    use crate::routes::test_support::{app, post_json, state};

    #[tokio::test]
    async fn test_sync_requires_active_integration() {
        let state = state().await;
        let (status, body) = post_json(
            app(&state),
            "/api/integrations/sync",
            json!({"userId": "u1", "providerId": "google_fit"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "integration is not active");

        let (status, _) = post_json(
            app(&state),
            "/api/integrations/sync",
            json!({"userId": "u1", "providerId": "strava"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sync_with_unreachable_provider_succeeds_empty() {
        let state = state().await;
        let token = AuthToken {
            provider: Provider::Github,
            access_token: "gh".to_string(),
            refresh_token: None,
            expires_at: None,
            scope: None,
            token_type: None,
        };
        state.grove.credentials().save("u1", &token, None).await.unwrap();

        let (status, body) = post_json(
            app(&state),
            "/api/integrations/sync",
            json!({"userId": "u1", "providerId": "github"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records_processed"], 0);
        assert_eq!(body["provider"], "github");
    }
}
