//! GitHub: commits, pull requests and total public activity for the day.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grove_auth::Provider;
use grove_store::ObservationSource;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{read_json, send, MetricRecord, SyncContext, SyncProvider, SyncWindow};
use crate::{GroveError, Result};

pub struct GithubProvider;

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
}

#[async_trait]
impl SyncProvider for GithubProvider {
    fn provider(&self) -> Provider {
        Provider::Github
    }

    async fn sync(&self, ctx: &SyncContext<'_>, access_token: &str) -> Result<Vec<MetricRecord>> {
        let (login, events) = match self.fetch_events(ctx, access_token).await {
            Ok(found) => found,
            Err(e) => {
                warn!(user = ctx.user_id, "github events fetch failed: {}", e);
                return Ok(Vec::new());
            }
        };

        let today = events_in_window(&events, &ctx.window);
        let records = summarize(ctx, &login, &today);
        info!(
            user = ctx.user_id,
            login = %login,
            events = today.len(),
            "github sync complete"
        );
        Ok(records)
    }
}

impl GithubProvider {
    async fn fetch_events(
        &self,
        ctx: &SyncContext<'_>,
        access_token: &str,
    ) -> Result<(String, Vec<Value>)> {
        let user_url = ctx.url("/user");
        let request = ctx
            .http_client
            .get(&user_url)
            .bearer_auth(access_token)
            .header("Accept", "application/vnd.github+json");
        let response = send(Provider::Github, request).await?;
        let user: GithubUser = serde_json::from_value(read_json(Provider::Github, response).await?)
            .map_err(|e| GroveError::Provider(format!("github: unexpected user payload: {e}")))?;

        let events_url = ctx.url(&format!("/users/{}/events", user.login));
        let request = ctx
            .http_client
            .get(&events_url)
            .bearer_auth(access_token)
            .header("Accept", "application/vnd.github+json");
        let response = send(Provider::Github, request).await?;
        let events = match read_json(Provider::Github, response).await? {
            Value::Array(events) => events,
            other => {
                return Err(GroveError::Provider(format!(
                    "github: expected an event array, got {}",
                    other
                )))
            }
        };

        Ok((user.login, events))
    }
}

fn event_time(event: &Value) -> Option<DateTime<Utc>> {
    let raw = event.get("created_at")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn event_type(event: &Value) -> &str {
    event.get("type").and_then(Value::as_str).unwrap_or_default()
}

fn events_in_window(events: &[Value], window: &SyncWindow) -> Vec<Value> {
    events
        .iter()
        .filter(|e| event_time(e).is_some_and(|t| window.contains(t)))
        .cloned()
        .collect()
}

fn count_commits(push_events: &[&Value]) -> usize {
    push_events
        .iter()
        .filter_map(|e| e.pointer("/payload/commits").and_then(Value::as_array))
        .map(Vec::len)
        .sum()
}

fn summarize(ctx: &SyncContext<'_>, login: &str, events: &[Value]) -> Vec<MetricRecord> {
    let record = |metric_id: &str, value: usize, events: Value| MetricRecord {
        metric_id: metric_id.to_string(),
        date: ctx.window.date,
        value: value as f64,
        source: ObservationSource::Provider(Provider::Github),
        raw_data: json!({ "events": events, "username": login }),
    };

    let pushes: Vec<&Value> = events
        .iter()
        .filter(|e| event_type(e) == "PushEvent")
        .collect();
    let pull_requests: Vec<&Value> = events
        .iter()
        .filter(|e| event_type(e) == "PullRequestEvent")
        .collect();

    let mut records = Vec::new();

    let commits = count_commits(&pushes);
    if commits > 0 {
        records.push(record("github_commits", commits, json!(pushes)));
    }
    if !pull_requests.is_empty() {
        records.push(record(
            "github_pull_requests",
            pull_requests.len(),
            json!(pull_requests),
        ));
    }
    if !events.is_empty() {
        records.push(record("github_contributions", events.len(), json!(events)));
    }

    records
}
