//! Everything that writes observations: webhooks, chat, manual entries and
//! provider syncs. Each path finishes with a growth evaluation.

use chrono::{NaiveDate, Utc};
use grove_auth::Provider;
use grove_store::{MetricSource, NewCustomMetric, NewObservation, ObservationSource, SyncStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::extractor::ParsedActivity;
use crate::growth::PlantUpdate;
use crate::providers::{SyncContext, SyncWindow};
use crate::{today, Grove, GroveError, Result};

/// Fields accepted by the webhook endpoint. Everything is optional here so
/// that missing fields surface as validation errors rather than parse errors.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub token: Option<String>,
    pub metric: Option<String>,
    pub value: Option<Value>,
    pub unit: Option<String>,
    pub date: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookReceipt {
    pub metric_id: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub logged: Vec<ParsedActivity>,
    pub new_metrics: Vec<ParsedActivity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualLogReceipt {
    pub metric_id: String,
    pub date: NaiveDate,
    pub value: f64,
    pub updates: Vec<PlantUpdate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub provider: Provider,
    pub records_processed: usize,
    pub updates: Vec<PlantUpdate>,
}

/// `"Audible Minutes"` becomes `"audible_minutes"`.
pub fn normalize_metric_id(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

fn parse_value(raw: &Value) -> Result<f64> {
    let value = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| GroveError::Validation(format!("value must be a number, got {raw}")))
}

fn parse_date(raw: Option<&str>) -> Result<NaiveDate> {
    match raw {
        None => Ok(today()),
        Some(raw) => NaiveDate::parse_from_str(raw, grove_store::DATE_FORMAT)
            .map_err(|_| GroveError::Validation(format!("date must be YYYY-MM-DD, got {raw:?}"))),
    }
}

fn required<'a>(field: Option<&'a str>) -> Option<&'a str> {
    field.map(str::trim).filter(|f| !f.is_empty())
}

impl Grove {
    async fn require_profile(&self, user_id: &str) -> Result<()> {
        match self.store.get_profile(user_id).await? {
            Some(_) => Ok(()),
            None => Err(GroveError::UnknownUser(user_id.to_string())),
        }
    }

    /// Store one value pushed by an automation service such as Zapier.
    #[instrument(skip(self, payload))]
    pub async fn ingest_webhook(&self, payload: Value) -> Result<WebhookReceipt> {
        let fields: WebhookPayload = serde_json::from_value(payload.clone())
            .map_err(|e| GroveError::Validation(format!("invalid webhook payload: {e}")))?;

        let (Some(token), Some(metric), Some(raw_value)) = (
            required(fields.token.as_deref()),
            required(fields.metric.as_deref()),
            fields.value.as_ref().filter(|v| !v.is_null()),
        ) else {
            return Err(GroveError::Validation(
                "missing required fields: token, metric, value".to_string(),
            ));
        };

        let value = parse_value(raw_value)?;
        let date = parse_date(fields.date.as_deref())?;

        let profile = self
            .store
            .find_profile_by_webhook_token(token)
            .await?
            .ok_or(GroveError::InvalidWebhookToken)?;
        let user_id = profile.id;
        let metric_id = normalize_metric_id(metric);

        self.store
            .ensure_custom_metric(&NewCustomMetric {
                user_id: user_id.clone(),
                metric_id: metric_id.clone(),
                name: metric.to_string(),
                unit: fields.unit.clone().unwrap_or_default(),
                category: "custom".to_string(),
                default_goal: None,
                source: MetricSource::Webhook,
            })
            .await?;

        self.store
            .upsert_observation(&NewObservation {
                user_id: user_id.clone(),
                metric_id: metric_id.clone(),
                date,
                value,
                source: ObservationSource::Webhook,
                note: fields.note.clone(),
                raw_data: Some(json!({ "original_payload": payload })),
            })
            .await?;
        info!(user = %user_id, metric = %metric_id, value, %date, "webhook observation stored");

        self.evaluate_garden_growth(&user_id).await?;
        Ok(WebhookReceipt { metric_id, value })
    }

    /// Log whatever the language model finds in a free-text message.
    #[instrument(skip(self, message))]
    pub async fn log_chat(&self, user_id: &str, message: &str) -> Result<ChatOutcome> {
        if message.trim().is_empty() {
            return Err(GroveError::Validation("message must not be empty".to_string()));
        }
        self.require_profile(user_id).await?;

        let known = self.store.list_custom_metric_ids(user_id).await?;
        let activities = self.parse_natural_language(message, &known).await?;

        let date = today();
        let mut logged = Vec::new();
        let mut new_metrics = Vec::new();

        for activity in activities {
            if !activity.is_confident() {
                continue;
            }
            if activity.metric.trim().is_empty() {
                continue;
            }

            if activity.is_new_metric || !known.contains(&activity.metric) {
                let created = self
                    .store
                    .ensure_custom_metric(&NewCustomMetric {
                        user_id: user_id.to_string(),
                        metric_id: activity.metric.clone(),
                        name: activity.metric.replace('_', " "),
                        unit: activity.unit.clone(),
                        category: activity.category.clone(),
                        default_goal: None,
                        source: MetricSource::Nlp,
                    })
                    .await?;
                if created {
                    new_metrics.push(activity.clone());
                }
            }

            let raw_data = json!({
                "original_message": message,
                "parsed_activity": activity,
                "confidence": activity.confidence,
                "logged_at": Utc::now().to_rfc3339(),
            });
            self.store
                .upsert_observation(&NewObservation {
                    user_id: user_id.to_string(),
                    metric_id: activity.metric.clone(),
                    date,
                    value: activity.value,
                    source: ObservationSource::Nlp,
                    note: None,
                    raw_data: Some(raw_data),
                })
                .await?;
            logged.push(activity);
        }

        if !logged.is_empty() {
            self.evaluate_garden_growth(user_id).await?;
        }
        info!(
            user = user_id,
            logged = logged.len(),
            new_metrics = new_metrics.len(),
            "chat message processed"
        );

        Ok(ChatOutcome {
            logged,
            new_metrics,
        })
    }

    #[instrument(skip(self))]
    pub async fn log_manual(
        &self,
        user_id: &str,
        metric: &str,
        value: f64,
        date: Option<&str>,
    ) -> Result<ManualLogReceipt> {
        let metric_id = normalize_metric_id(metric);
        if metric_id.is_empty() {
            return Err(GroveError::Validation("metric must not be empty".to_string()));
        }
        if !value.is_finite() {
            return Err(GroveError::Validation("value must be a number".to_string()));
        }
        let date = parse_date(date)?;
        self.require_profile(user_id).await?;

        self.store
            .ensure_custom_metric(&NewCustomMetric {
                user_id: user_id.to_string(),
                metric_id: metric_id.clone(),
                name: metric.trim().to_string(),
                unit: String::new(),
                category: "custom".to_string(),
                default_goal: None,
                source: MetricSource::Manual,
            })
            .await?;
        self.store
            .upsert_observation(&NewObservation {
                user_id: user_id.to_string(),
                metric_id: metric_id.clone(),
                date,
                value,
                source: ObservationSource::Manual,
                note: None,
                raw_data: None,
            })
            .await?;

        let updates = self.evaluate_garden_growth(user_id).await?;
        Ok(ManualLogReceipt {
            metric_id,
            date,
            value,
            updates,
        })
    }

    /// Pull today's data for one integration and store it.
    #[instrument(skip(self))]
    pub async fn sync_integration(&self, user_id: &str, provider: Provider) -> Result<SyncOutcome> {
        let integration = self
            .credentials
            .load(user_id, provider)
            .await?
            .filter(|i| i.is_active())
            .ok_or(GroveError::IntegrationInactive)?;

        let access_token = self.refresher.get_valid_access_token(user_id, provider).await?;

        match self
            .run_sync(user_id, provider, &access_token, &integration.config)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(user = user_id, provider = %provider, "sync failed: {}", err);
                self.store
                    .insert_sync_log(user_id, provider, 0, SyncStatus::Error, Some(&err.to_string()))
                    .await?;
                Err(err)
            }
        }
    }

    async fn run_sync(
        &self,
        user_id: &str,
        provider: Provider,
        access_token: &str,
        config: &Value,
    ) -> Result<SyncOutcome> {
        let adapter = self.registry.get(provider)?;
        let ctx = SyncContext {
            user_id,
            http_client: &self.http_client,
            api_base_url: self.registry.api_base_url(provider)?,
            config,
            window: SyncWindow::today(),
        };

        let records = adapter.sync(&ctx, access_token).await?;
        for record in &records {
            self.store
                .upsert_observation(&NewObservation {
                    user_id: user_id.to_string(),
                    metric_id: record.metric_id.clone(),
                    date: record.date,
                    value: record.value,
                    source: record.source,
                    note: None,
                    raw_data: Some(record.raw_data.clone()),
                })
                .await?;
        }

        self.store
            .touch_last_synced(user_id, provider, Utc::now())
            .await?;
        self.store
            .insert_sync_log(
                user_id,
                provider,
                records.len() as i64,
                SyncStatus::Success,
                None,
            )
            .await?;
        info!(
            user = user_id,
            provider = %provider,
            records = records.len(),
            "sync complete"
        );

        let updates = self.evaluate_garden_growth_on(user_id, ctx.window.date).await?;
        Ok(SyncOutcome {
            provider,
            records_processed: records.len(),
            updates,
        })
    }

    /// Provider consent URL; the user id rides along as OAuth `state`.
    pub fn authorization_url(&self, provider: Provider, user_id: &str) -> Result<String> {
        if user_id.trim().is_empty() {
            return Err(GroveError::Validation("userId is required".to_string()));
        }
        let oauth = self.config.oauth_config(provider)?;
        self.bridge
            .authorize_url(&oauth, user_id)
            .map_err(|e| GroveError::OAuth(e.to_string()))
    }

    /// Finish the OAuth flow: exchange `code` and store the resulting tokens.
    #[instrument(skip(self, code))]
    pub async fn connect_integration(
        &self,
        provider: Provider,
        code: &str,
        user_id: &str,
    ) -> Result<()> {
        if code.is_empty() || user_id.is_empty() {
            return Err(GroveError::Validation("code and state are required".to_string()));
        }
        let oauth = self.config.oauth_config(provider)?;
        let token = self
            .bridge
            .exchange_code(provider, code, &oauth)
            .await
            .map_err(|e| GroveError::OAuth(e.to_string()))?;
        self.credentials.save(user_id, &token, None).await?;
        info!(user = user_id, provider = %provider, "integration connected");
        Ok(())
    }
}
