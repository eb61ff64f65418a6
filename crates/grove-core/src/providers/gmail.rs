//! Gmail: messages sent today.

use async_trait::async_trait;
use grove_auth::Provider;
use grove_store::ObservationSource;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{read_json, send, MetricRecord, SyncContext, SyncProvider};
use crate::{GroveError, Result};

pub const EMAILS_SENT: &str = "gmail.emails_sent";
const DEFAULT_LABEL: &str = "SENT";
const MAX_RESULTS: u32 = 100;

pub struct GmailProvider;

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<Value>,
}

#[async_trait]
impl SyncProvider for GmailProvider {
    fn provider(&self) -> Provider {
        Provider::Gmail
    }

    async fn sync(&self, ctx: &SyncContext<'_>, access_token: &str) -> Result<Vec<MetricRecord>> {
        let label = ctx
            .config
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_LABEL);

        let count = match self.count_messages(ctx, access_token, label).await {
            Ok(count) => count,
            Err(e) => {
                warn!(user = ctx.user_id, "gmail message count failed: {}", e);
                return Ok(Vec::new());
            }
        };
        info!(user = ctx.user_id, label, count, "gmail sync complete");

        Ok(vec![MetricRecord {
            metric_id: EMAILS_SENT.to_string(),
            date: ctx.window.date,
            value: count as f64,
            source: ObservationSource::Provider(Provider::Gmail),
            raw_data: json!({ "messageCount": count, "label": label }),
        }])
    }
}

impl GmailProvider {
    async fn count_messages(
        &self,
        ctx: &SyncContext<'_>,
        access_token: &str,
        label: &str,
    ) -> Result<usize> {
        let url = ctx.url("/users/me/messages");
        let query = [
            ("labelIds", label.to_string()),
            ("q", format!("after:{}", ctx.window.start.timestamp())),
            ("maxResults", MAX_RESULTS.to_string()),
        ];

        let request = ctx
            .http_client
            .get(&url)
            .query(&query)
            .bearer_auth(access_token);
        let response = send(Provider::Gmail, request).await?;

        let body = read_json(Provider::Gmail, response).await?;
        let list: MessageList = serde_json::from_value(body)
            .map_err(|e| GroveError::Provider(format!("gmail: unexpected message list: {e}")))?;
        Ok(list.messages.len())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::{FixedOffset, NaiveDate};

    use super::*;
    use crate::providers::test_server::serve;
    use crate::providers::SyncWindow;

    fn window() -> SyncWindow {
        SyncWindow::for_date(
            NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
            FixedOffset::east_opt(0).unwrap(),
        )
    }

    async fn list_messages(
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer good") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad token"})));
        }
        let expected_q = format!("after:{}", window().start.timestamp());
        if params.get("q") != Some(&expected_q) || params.get("maxResults").map(String::as_str) != Some("100") {
            return (StatusCode::BAD_REQUEST, Json(json!({})));
        }
        let body = match params.get("labelIds").map(String::as_str) {
            Some("SENT") => json!({"messages": [{"id": "a"}, {"id": "b"}, {"id": "c"}]}),
            _ => json!({"resultSizeEstimate": 0}),
        };
        (StatusCode::OK, Json(body))
    }

    async fn run(config: Value, token: &str) -> Vec<MetricRecord> {
        let base = serve(Router::new().route("/users/me/messages", get(list_messages))).await;
        let client = reqwest::Client::new();
        let ctx = SyncContext {
            user_id: "u1",
            http_client: &client,
            api_base_url: &base,
            config: &config,
            window: window(),
        };
        GmailProvider.sync(&ctx, token).await.unwrap()
    }

    #[tokio::test]
    async fn test_counts_sent_messages() {
        let records = run(json!({}), "good").await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metric_id, "gmail.emails_sent");
        assert_eq!(records[0].value, 3.0);
        assert_eq!(records[0].date, window().date);
        assert_eq!(records[0].raw_data, json!({"messageCount": 3, "label": "SENT"}));
    }

    #[tokio::test]
    async fn test_empty_label_still_emits_zero() {
        let records = run(json!({"label": "INBOX"}), "good").await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 0.0);
        assert_eq!(records[0].raw_data["label"], "INBOX");
    }

    #[tokio::test]
    async fn test_api_failure_yields_no_records() {
        let records = run(json!({}), "expired").await;
        assert!(records.is_empty());
    }
}
