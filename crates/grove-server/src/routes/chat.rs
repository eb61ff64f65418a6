//! Free-text activity logging.

use axum::extract::State;
use axum::Json;
use grove_core::GroveError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatLogRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

/// `POST /api/chat/log`
pub async fn log(
    State(state): State<AppState>,
    Json(req): Json<ChatLogRequest>,
) -> Result<Json<Value>> {
    let (Some(message), Some(user_id)) = (req.message, req.user_id) else {
        return Err(GroveError::Validation("missing message or userId".to_string()).into());
    };

    let outcome = state.grove.log_chat(&user_id, &message).await?;
    Ok(Json(json!({
        "success": true,
        "logged": outcome.logged,
        "new_metrics": outcome.new_metrics,
    })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::{app, post_json, state, state_with, CannedModel};

    #[tokio::test]
    async fn test_chat_log() {
        let state = state_with(Some(Arc::new(CannedModel(
            r#"[{"metric":"distance_ran","value":5,"unit":"km","category":"health","confidence":0.92,"is_new_metric":true}]"#,
        ))))
        .await;
        state.grove.create_profile("u1").await.unwrap();

        let (status, body) = post_json(
            app(&state),
            "/api/chat/log",
            json!({"message": "ran 5km this morning", "userId": "u1"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["logged"][0]["metric"], "distance_ran");
        assert_eq!(body["new_metrics"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chat_log_errors() {
        let state = state().await;
        let (status, _) = post_json(app(&state), "/api/chat/log", json!({"userId": "u1"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(
            app(&state),
            "/api/chat/log",
            json!({"message": "ran 5km", "userId": "nobody"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        state.grove.create_profile("u1").await.unwrap();
        let (status, body) = post_json(
            app(&state),
            "/api/chat/log",
            json!({"message": "ran 5km", "userId": "u1"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("not configured"));
    }
}
