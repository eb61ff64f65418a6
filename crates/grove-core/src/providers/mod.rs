//! Provider sync adapters.
//!
//! Each connected data source implements [`SyncProvider`] and turns one day of
//! upstream activity into [`MetricRecord`]s. Each request is sent once. Adapters are
//! forgiving: a failed sub-metric is logged and left out so the rest of the
//! day's numbers still land.
//!
//! # Adding a provider
//!
//! 1. Add a variant to `grove_auth::Provider`
//! 2. Add its defaults to `ProvidersConfig::with_defaults()`
//! 3. Implement `SyncProvider` in a new module here and register it in
//!    `ProviderRegistry::register_builtin_providers()`

pub mod github;
pub mod gmail;
pub mod google_fit;

pub use github::GithubProvider;
pub use gmail::GmailProvider;
pub use google_fit::GoogleFitProvider;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveTime, Offset, Utc};
use grove_auth::{Provider, UnknownProvider};
use grove_store::ObservationSource;
use serde::Serialize;
use serde_json::Value;

use crate::config::ProvidersConfig;
use crate::{GroveError, Result};

/// One value for one metric on one day, as produced by an adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub metric_id: String,
    pub date: NaiveDate,
    pub value: f64,
    pub source: ObservationSource,
    pub raw_data: Value,
}

/// The calendar day being synced, with its bounds as UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Today in the server's local timezone.
    pub fn today() -> Self {
        let now = Local::now();
        Self::for_date(now.date_naive(), now.offset().fix())
    }

    pub fn for_date(date: NaiveDate, offset: FixedOffset) -> Self {
        let local_midnight = date.and_time(NaiveTime::MIN);
        let start = (local_midnight - Duration::seconds(i64::from(offset.local_minus_utc())))
            .and_utc();
        Self {
            date,
            start,
            end: start + Duration::days(1),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Everything an adapter needs for one sync call.
pub struct SyncContext<'a> {
    pub user_id: &'a str,
    pub http_client: &'a reqwest::Client,
    /// Base URL of the provider's data API.
    pub api_base_url: &'a str,
    /// Per-integration settings, e.g. `{"label": "INBOX"}` for Gmail.
    pub config: &'a Value,
    pub window: SyncWindow,
}

impl SyncContext<'_> {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
pub trait SyncProvider: Send + Sync {
    fn provider(&self) -> Provider;

    fn display_name(&self) -> &'static str {
        self.provider().display_name()
    }

    /// Fetch the window's metrics. Only failures that prevent any result
    /// are returned as errors.
    async fn sync(&self, ctx: &SyncContext<'_>, access_token: &str) -> Result<Vec<MetricRecord>>;
}

/// Enabled adapters, keyed by provider.
pub struct ProviderRegistry {
    config: ProvidersConfig,
    providers: HashMap<Provider, Arc<dyn SyncProvider>>,
}

impl ProviderRegistry {
    pub fn new(config: ProvidersConfig) -> Self {
        let providers = Self::register_builtin_providers(&config);
        Self { config, providers }
    }

    fn register_builtin_providers(
        config: &ProvidersConfig,
    ) -> HashMap<Provider, Arc<dyn SyncProvider>> {
        let mut map: HashMap<Provider, Arc<dyn SyncProvider>> = HashMap::new();
        if config.is_enabled(Provider::Gmail) {
            map.insert(Provider::Gmail, Arc::new(GmailProvider));
        }
        if config.is_enabled(Provider::GoogleFit) {
            map.insert(Provider::GoogleFit, Arc::new(GoogleFitProvider));
        }
        if config.is_enabled(Provider::Github) {
            map.insert(Provider::Github, Arc::new(GithubProvider));
        }
        map
    }

    /// A disabled provider is reported the same way as an unknown one.
    pub fn get(&self, provider: Provider) -> Result<Arc<dyn SyncProvider>> {
        self.providers
            .get(&provider)
            .cloned()
            .ok_or_else(|| UnknownProvider(provider.as_str().to_string()).into())
    }

    pub fn api_base_url(&self, provider: Provider) -> Result<&str> {
        self.config
            .api_base_url(provider)
            .ok_or_else(|| UnknownProvider(provider.as_str().to_string()).into())
    }

    pub fn list_available(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.providers.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }
}

/// Send a request once. Any non-2xx status becomes a provider error carrying
/// the response body.
pub(crate) async fn send(
    provider: Provider,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| GroveError::Provider(format!("{provider}: {e}")))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(GroveError::Provider(format!("{provider}: HTTP {status} - {body}")))
}

pub(crate) async fn read_json(provider: Provider, response: reqwest::Response) -> Result<Value> {
    response
        .json()
        .await
        .map_err(|e| GroveError::Provider(format!("{provider}: invalid response body: {e}")))
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    use super::*;

    /// A route that always answers 503 and counts how often it was hit.
    async fn unavailable_upstream() -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/users/me/messages",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::SERVICE_UNAVAILABLE, "backend overloaded")
                }
            }),
        );
        (test_server::serve(router).await, hits)
    }

    #[tokio::test]
    async fn test_send_does_not_retry_server_errors() {
        let (base, hits) = unavailable_upstream().await;
        let client = reqwest::Client::new();

        let err = send(Provider::Gmail, client.get(format!("{base}/users/me/messages")))
            .await
            .unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        match err {
            GroveError::Provider(message) => {
                assert!(message.contains("503"), "{message}");
                assert!(message.contains("backend overloaded"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failing_adapter_makes_one_request() {
        let (base, hits) = unavailable_upstream().await;
        let client = reqwest::Client::new();
        let config = Value::Null;
        let ctx = SyncContext {
            user_id: "u1",
            http_client: &client,
            api_base_url: &base,
            config: &config,
            window: SyncWindow::today(),
        };

        let started = std::time::Instant::now();
        let records = GmailProvider.sync(&ctx, "token").await.unwrap();

        assert!(records.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < std::time::Duration::from_millis(400));
    }

    #[test]
    fn test_window_for_utc_date() {
        let date = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let window = SyncWindow::for_date(date, FixedOffset::east_opt(0).unwrap());
        assert_eq!(window.start.to_rfc3339(), "2026-05-04T00:00:00+00:00");
        assert_eq!(window.end.to_rfc3339(), "2026-05-05T00:00:00+00:00");
    }

    #[test]
    fn test_window_respects_local_offset() {
        let date = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let window = SyncWindow::for_date(date, FixedOffset::east_opt(2 * 3600).unwrap());
        assert_eq!(window.start.to_rfc3339(), "2026-05-03T22:00:00+00:00");

        let late_evening = DateTime::parse_from_rfc3339("2026-05-04T21:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(window.contains(late_evening));
        assert!(!window.contains(window.end));
        assert!(window.contains(window.start));
    }

    #[test]
    fn test_registry_skips_disabled_providers() {
        let mut config = ProvidersConfig::default();
        config
            .providers
            .get_mut(Provider::Github.as_str())
            .unwrap()
            .enabled = false;
        let registry = ProviderRegistry::new(config);

        assert_eq!(
            registry.list_available(),
            vec![Provider::Gmail, Provider::GoogleFit]
        );
        assert!(matches!(
            registry.get(Provider::Github),
            Err(GroveError::UnknownProvider(_))
        ));
        assert_eq!(
            registry.get(Provider::Gmail).unwrap().display_name(),
            "Gmail"
        );
    }
}
