use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use grove_auth::Provider;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Calendar dates are stored as `YYYY-MM-DD` text.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    pub webhook_token: String,
    pub onboarding_completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    Active,
    Disconnected,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Active => "active",
            IntegrationStatus::Disconnected => "disconnected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(IntegrationStatus::Active),
            "disconnected" => Some(IntegrationStatus::Disconnected),
            _ => None,
        }
    }
}

/// A connected data source. Token columns hold cipher envelopes, never
/// plaintext; decryption is the caller's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub user_id: String,
    pub provider: Provider,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: IntegrationStatus,
    pub status_message: Option<String>,
    pub config: Value,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Integration {
    pub fn is_active(&self) -> bool {
        self.status == IntegrationStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct NewIntegration {
    pub user_id: String,
    pub provider: Provider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// `None` keeps the existing config on reconnect.
    pub config: Option<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    Manual,
    Nlp,
    Webhook,
    Onboarding,
}

impl MetricSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricSource::Manual => "manual",
            MetricSource::Nlp => "nlp",
            MetricSource::Webhook => "webhook",
            MetricSource::Onboarding => "onboarding",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(MetricSource::Manual),
            "nlp" => Some(MetricSource::Nlp),
            "webhook" => Some(MetricSource::Webhook),
            "onboarding" => Some(MetricSource::Onboarding),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomMetric {
    pub user_id: String,
    pub metric_id: String,
    pub name: String,
    pub unit: String,
    pub category: String,
    pub default_goal: Option<f64>,
    pub source: MetricSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCustomMetric {
    pub user_id: String,
    pub metric_id: String,
    pub name: String,
    pub unit: String,
    pub category: String,
    pub default_goal: Option<f64>,
    pub source: MetricSource,
}

/// Where an observation came from: a person, or one of the sync providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationSource {
    Manual,
    Nlp,
    Webhook,
    Provider(Provider),
}

impl ObservationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationSource::Manual => "manual",
            ObservationSource::Nlp => "nlp",
            ObservationSource::Webhook => "webhook",
            ObservationSource::Provider(p) => p.as_str(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(ObservationSource::Manual),
            "nlp" => Some(ObservationSource::Nlp),
            "webhook" => Some(ObservationSource::Webhook),
            other => Provider::from_str(other).ok().map(ObservationSource::Provider),
        }
    }
}

impl fmt::Display for ObservationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ObservationSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ObservationSource {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ObservationSource::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown source {raw}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricObservation {
    pub user_id: String,
    pub metric_id: String,
    pub date: NaiveDate,
    pub value: f64,
    pub source: ObservationSource,
    pub note: Option<String>,
    pub raw_data: Option<Value>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewObservation {
    pub user_id: String,
    pub metric_id: String,
    pub date: NaiveDate,
    pub value: f64,
    pub source: ObservationSource,
    pub note: Option<String>,
    pub raw_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plant {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub plant_type: String,
    pub category: String,
    pub current_level: i32,
    pub is_active: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPlant {
    pub user_id: String,
    pub name: String,
    pub plant_type: String,
    pub category: String,
    pub position: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    Gte,
    Lte,
    Eq,
    AnyActivity,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Gte => "gte",
            ConditionType::Lte => "lte",
            ConditionType::Eq => "eq",
            ConditionType::AnyActivity => "any_activity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gte" => Some(ConditionType::Gte),
            "lte" => Some(ConditionType::Lte),
            "eq" => Some(ConditionType::Eq),
            "any_activity" => Some(ConditionType::AnyActivity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GrowthRule {
    pub id: i64,
    pub plant_id: String,
    pub metric_id: String,
    pub condition: ConditionType,
    pub threshold: f64,
    pub growth_amount: i32,
    pub decay_per_day: i32,
}

#[derive(Debug, Clone)]
pub struct NewGrowthRule {
    pub plant_id: String,
    pub metric_id: String,
    pub condition: ConditionType,
    pub threshold: Option<f64>,
    pub growth_amount: i32,
    pub decay_per_day: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(SyncStatus::Success),
            "error" => Some(SyncStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncLog {
    pub id: i64,
    pub user_id: String,
    pub provider: Provider,
    pub records_processed: i64,
    pub status: SyncStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
