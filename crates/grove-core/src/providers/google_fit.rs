//! Google Fit: steps, distance and active minutes from the aggregate API.

use async_trait::async_trait;
use grove_auth::Provider;
use grove_store::ObservationSource;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{read_json, send, MetricRecord, SyncContext, SyncProvider};
use crate::Result;

const DAY_MILLIS: i64 = 86_400_000;

pub struct GoogleFitProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FitMetric {
    Steps,
    Distance,
    ActiveMinutes,
}

impl FitMetric {
    const ALL: [FitMetric; 3] = [FitMetric::Steps, FitMetric::Distance, FitMetric::ActiveMinutes];

    fn metric_id(&self) -> &'static str {
        match self {
            FitMetric::Steps => "steps",
            FitMetric::Distance => "distance_ran",
            FitMetric::ActiveMinutes => "active_minutes",
        }
    }

    fn data_type_name(&self) -> &'static str {
        match self {
            FitMetric::Steps => "com.google.step_count.delta",
            FitMetric::Distance => "com.google.distance.delta",
            FitMetric::ActiveMinutes => "com.google.active_minutes",
        }
    }

    fn data_source_id(&self) -> &'static str {
        match self {
            FitMetric::Steps => {
                "derived:com.google.step_count.delta:com.google.android.gms:estimated_steps"
            }
            FitMetric::Distance => {
                "derived:com.google.distance.delta:com.google.android.gms:merge_distance_delta"
            }
            FitMetric::ActiveMinutes => {
                "derived:com.google.active_minutes:com.google.android.gms:merge_active_minutes"
            }
        }
    }

    fn raw_label(&self) -> &'static str {
        match self {
            FitMetric::Steps => "steps",
            FitMetric::Distance => "distance",
            FitMetric::ActiveMinutes => "active_minutes",
        }
    }
}

#[async_trait]
impl SyncProvider for GoogleFitProvider {
    fn provider(&self) -> Provider {
        Provider::GoogleFit
    }

    async fn sync(&self, ctx: &SyncContext<'_>, access_token: &str) -> Result<Vec<MetricRecord>> {
        let mut records = Vec::new();
        for metric in FitMetric::ALL {
            match self.fetch_metric(ctx, access_token, metric).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => debug!(user = ctx.user_id, metric = metric.metric_id(), "no data points"),
                Err(e) => warn!(
                    user = ctx.user_id,
                    metric = metric.metric_id(),
                    "google fit fetch failed: {}",
                    e
                ),
            }
        }
        Ok(records)
    }
}

impl GoogleFitProvider {
    async fn fetch_metric(
        &self,
        ctx: &SyncContext<'_>,
        access_token: &str,
        metric: FitMetric,
    ) -> Result<Option<MetricRecord>> {
        let url = ctx.url("/users/me/dataset:aggregate");
        let body = json!({
            "aggregateBy": [{
                "dataTypeName": metric.data_type_name(),
                "dataSourceId": metric.data_source_id(),
            }],
            "bucketByTime": { "durationMillis": DAY_MILLIS },
            "startTimeMillis": ctx.window.start.timestamp_millis(),
            "endTimeMillis": ctx.window.end.timestamp_millis(),
        });

        let request = ctx.http_client.post(&url).bearer_auth(access_token).json(&body);
        let response = send(Provider::GoogleFit, request).await?;
        let data = read_json(Provider::GoogleFit, response).await?;

        Ok(first_points(&data).map(|points| to_record(ctx, metric, points)))
    }
}

/// Points of the first dataset in the first bucket, if the API returned any.
fn first_points(data: &Value) -> Option<&Vec<Value>> {
    data.pointer("/bucket/0/dataset/0/point")?.as_array()
}

fn sum_int_values(points: &[Value]) -> i64 {
    points
        .iter()
        .filter_map(|p| p.pointer("/value/0/intVal").and_then(Value::as_i64))
        .sum()
}

fn sum_fp_values(points: &[Value]) -> f64 {
    points
        .iter()
        .filter_map(|p| p.pointer("/value/0/fpVal").and_then(Value::as_f64))
        .sum()
}

fn meters_to_km(meters: f64) -> f64 {
    (meters / 1000.0 * 100.0).round() / 100.0
}

fn to_record(ctx: &SyncContext<'_>, metric: FitMetric, points: &[Value]) -> MetricRecord {
    let (value, raw_data) = match metric {
        FitMetric::Distance => {
            let meters = sum_fp_values(points);
            (
                meters_to_km(meters),
                json!({ "dataType": metric.raw_label(), "meters": meters, "points": points }),
            )
        }
        FitMetric::Steps | FitMetric::ActiveMinutes => (
            sum_int_values(points) as f64,
            json!({ "dataType": metric.raw_label(), "points": points }),
        ),
    };

    MetricRecord {
        metric_id: metric.metric_id().to_string(),
        date: ctx.window.date,
        value,
        source: ObservationSource::Provider(Provider::GoogleFit),
        raw_data,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::{FixedOffset, NaiveDate};

    use super::*;
    use crate::providers::test_server::serve;
    use crate::providers::SyncWindow;

    #[test]
    fn test_first_points_requires_point_array() {
        assert!(first_points(&json!({})).is_none());
        assert!(first_points(&json!({"bucket": []})).is_none());
        assert!(first_points(&json!({"bucket": [{"dataset": [{}]}]})).is_none());
        assert_eq!(
            first_points(&json!({"bucket": [{"dataset": [{"point": []}]}]}))
                .map(Vec::len),
            Some(0)
        );
    }

    #[test]
    fn test_point_sums() {
        let points = vec![
            json!({"value": [{"intVal": 1200}]}),
            json!({"value": [{"intVal": 800}]}),
            json!({"value": []}),
        ];
        assert_eq!(sum_int_values(&points), 2000);

        let meters = vec![
            json!({"value": [{"fpVal": 1234.5}]}),
            json!({"value": [{"fpVal": 2000.0}]}),
        ];
        assert_eq!(sum_fp_values(&meters), 3234.5);
        assert_eq!(meters_to_km(3234.5), 3.23);
        assert_eq!(meters_to_km(5006.0), 5.01);
    }

    async fn aggregate(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let data_type = body
            .pointer("/aggregateBy/0/dataTypeName")
            .and_then(Value::as_str)
            .unwrap_or_default();
        match data_type {
            "com.google.step_count.delta" => (
                StatusCode::OK,
                Json(json!({"bucket": [{"dataset": [{"point": [
                    {"value": [{"intVal": 4000}]},
                    {"value": [{"intVal": 2500}]}
                ]}]}]})),
            ),
            "com.google.distance.delta" => (
                StatusCode::OK,
                Json(json!({"bucket": [{"dataset": [{"point": [
                    {"value": [{"fpVal": 4321.0}]}
                ]}]}]})),
            ),
            _ => (StatusCode::FORBIDDEN, Json(json!({"error": "scope"}))),
        }
    }

    #[tokio::test]
    async fn test_sync_omits_failed_metric() {
        let base = serve(Router::new().route("/users/me/dataset:aggregate", post(aggregate))).await;
        let client = reqwest::Client::new();
        let config = json!({});
        let ctx = SyncContext {
            user_id: "u1",
            http_client: &client,
            api_base_url: &base,
            config: &config,
            window: SyncWindow::for_date(
                NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
                FixedOffset::east_opt(0).unwrap(),
            ),
        };

        let records = GoogleFitProvider.sync(&ctx, "token").await.unwrap();
        let summary: Vec<(&str, f64)> = records
            .iter()
            .map(|r| (r.metric_id.as_str(), r.value))
            .collect();
        assert_eq!(summary, vec![("steps", 6500.0), ("distance_ran", 4.32)]);
        assert_eq!(records[1].raw_data["meters"], json!(4321.0));
        assert_eq!(records[0].source.as_str(), "google_fit");
    }
}
