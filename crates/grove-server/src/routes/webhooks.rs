//! Inbound data from automation services (Zapier, Make, shortcuts).

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::Result;
use crate::state::AppState;

/// `POST /api/webhooks/intake`
///
/// Body: `{token, metric, value, unit?, date?, note?}`. `value` may be a
/// number or a numeric string; `date` defaults to today.
pub async fn intake(State(state): State<AppState>, Json(payload): Json<Value>) -> Result<Json<Value>> {
    let receipt = state.grove.ingest_webhook(payload).await?;
    Ok(Json(json!({
        "success": true,
        "metric": receipt.metric_id,
        "value": receipt.value,
    })))
}
