//! Manual metric entries.

use axum::extract::State;
use axum::Json;
use grove_core::{GroveError, ManualLogReceipt};
use serde::Deserialize;

use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LogMetricRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub metric: String,
    pub value: f64,
    #[serde(default)]
    pub date: Option<String>,
}

/// `POST /api/metrics/log`
pub async fn log(
    State(state): State<AppState>,
    Json(req): Json<LogMetricRequest>,
) -> Result<Json<ManualLogReceipt>> {
    if req.user_id.trim().is_empty() {
        return Err(GroveError::Validation("missing userId".to_string()).into());
    }
    let receipt = state
        .grove
        .log_manual(&req.user_id, &req.metric, req.value, req.date.as_deref())
        .await?;
    Ok(Json(receipt))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::{app, post_json, state};

    #[tokio::test]
    async fn test_log_metric() {
        let state = state().await;
        state.grove.create_profile("u1").await.unwrap();

        let (status, body) = post_json(
            app(&state),
            "/api/metrics/log",
            json!({"userId": "u1", "metric": "Water Glasses", "value": 6, "date": "2026-03-02"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metric_id"], "water_glasses");
        assert_eq!(body["date"], "2026-03-02");

        let (status, _) = post_json(
            app(&state),
            "/api/metrics/log",
            json!({"userId": "u1", "metric": "water", "value": 1, "date": "yesterday"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
