//! Grove service core.
//!
//! [`Grove`] ties together credential storage, token refresh, provider
//! adapters, the growth engine and the activity extractor. The HTTP server
//! and CLI are thin layers over its operations.

pub mod config;
pub mod credentials;
pub mod error;
pub mod extractor;
pub mod garden;
pub mod growth;
pub mod intake;
pub mod providers;
pub mod refresh;
pub mod scheduler;

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use grove_auth::{AuthBridge, Provider, TokenCipher};
use grove_store::GroveStore;

pub use config::{ConfigError, GroveConfig, ProviderConfig, ProvidersConfig};
pub use credentials::CredentialStore;
pub use error::{GroveError, Result};
pub use extractor::{ActivityExtractor, GeminiModel, LanguageModel, ParsedActivity};
pub use garden::{AddPlant, Garden, OnboardingGoal, PlantWithRules};
pub use growth::{GrowthEngine, PlantUpdate};
pub use intake::{ChatOutcome, ManualLogReceipt, SyncOutcome, WebhookReceipt};
pub use providers::{MetricRecord, ProviderRegistry, SyncProvider, SyncWindow};
pub use refresh::{OAuthRefreshClient, RefreshClient, TokenRefresher};
pub use scheduler::{SchedulerConfig, SchedulerHandle, SyncJob, SyncScheduler};

#[derive(Clone)]
pub struct Grove {
    store: GroveStore,
    credentials: CredentialStore,
    refresher: TokenRefresher,
    growth: GrowthEngine,
    registry: Arc<ProviderRegistry>,
    extractor: Option<ActivityExtractor>,
    bridge: AuthBridge,
    config: Arc<GroveConfig>,
    http_client: reqwest::Client,
}

impl Grove {
    /// Build the service with the real OAuth refresh client and, when an API
    /// key is configured, the Gemini extractor.
    pub fn new(config: GroveConfig, store: GroveStore) -> Result<Self> {
        let config = Arc::new(config);
        let http_client = build_http_client();
        let bridge = AuthBridge::new();
        let refresh_client: Arc<dyn RefreshClient> =
            Arc::new(OAuthRefreshClient::new(bridge.clone(), config.clone()));
        let model: Option<Arc<dyn LanguageModel>> = config.gemini.clone().map(|gemini| {
            Arc::new(GeminiModel::new(http_client.clone(), gemini)) as Arc<dyn LanguageModel>
        });
        Self::from_parts(config, store, refresh_client, model, http_client, bridge)
    }

    pub fn from_parts(
        config: Arc<GroveConfig>,
        store: GroveStore,
        refresh_client: Arc<dyn RefreshClient>,
        model: Option<Arc<dyn LanguageModel>>,
        http_client: reqwest::Client,
        bridge: AuthBridge,
    ) -> Result<Self> {
        let cipher = TokenCipher::from_hex_key(&config.encryption_key)?;
        let credentials = CredentialStore::new(store.clone(), cipher);
        let refresher = TokenRefresher::new(credentials.clone(), refresh_client);
        let registry = Arc::new(ProviderRegistry::new(config.providers.clone()));

        Ok(Self {
            growth: GrowthEngine::new(store.clone()),
            store,
            credentials,
            refresher,
            registry,
            extractor: model.map(ActivityExtractor::new),
            bridge,
            config,
            http_client,
        })
    }

    pub fn store(&self) -> &GroveStore {
        &self.store
    }

    pub fn config(&self) -> &GroveConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn refresher(&self) -> &TokenRefresher {
        &self.refresher
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn get_valid_access_token(&self, user_id: &str, provider: Provider) -> Result<String> {
        self.refresher.get_valid_access_token(user_id, provider).await
    }

    pub async fn evaluate_garden_growth(&self, user_id: &str) -> Result<Vec<PlantUpdate>> {
        self.growth.evaluate_garden_growth(user_id).await
    }

    pub async fn evaluate_garden_growth_on(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<PlantUpdate>> {
        self.growth.evaluate_garden_growth_on(user_id, date).await
    }

    pub async fn parse_natural_language(
        &self,
        message: &str,
        existing_metrics: &[String],
    ) -> Result<Vec<ParsedActivity>> {
        let extractor = self
            .extractor
            .as_ref()
            .ok_or_else(|| GroveError::Model("language model is not configured".to_string()))?;
        extractor
            .parse_natural_language(message, existing_metrics)
            .await
    }
}

pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("grove/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Today's date in the server's timezone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
