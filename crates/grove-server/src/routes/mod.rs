//! Route handlers.

pub mod auth;
pub mod chat;
pub mod garden;
pub mod health;
pub mod integrations;
pub mod metrics;
pub mod webhooks;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        // OAuth
        .route("/api/auth/{provider}", get(auth::authorize))
        .route("/api/auth/{provider}/callback", get(auth::callback))
        // Intake
        .route("/api/webhooks/intake", post(webhooks::intake))
        .route("/api/chat/log", post(chat::log))
        .route("/api/metrics/log", post(metrics::log))
        .route("/api/integrations/sync", post(integrations::sync))
        // Garden
        .route("/api/garden/evaluate", post(garden::evaluate))
        .route("/api/garden/{user_id}", get(garden::show))
        .route("/api/profiles", post(garden::create_profile))
        .route("/api/plants", post(garden::add_plant))
        .route("/api/onboarding", post(garden::onboarding))
}

pub fn app(state: AppState) -> Router {
    router().layer(TraceLayer::new_for_http()).with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use grove_auth::{AuthBridge, AuthToken, Provider};
    use grove_core::config::ClientCredentials;
    use grove_core::{
        Grove, GroveConfig, GroveError, LanguageModel, ProvidersConfig, RefreshClient,
        SchedulerConfig, SyncScheduler,
    };
    use grove_store::GroveStore;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::state::AppState;

    struct NoRefresh;

    #[async_trait]
    impl RefreshClient for NoRefresh {
        async fn refresh(&self, _: Provider, _: &str) -> grove_core::Result<AuthToken> {
            Err(GroveError::RefreshFailed("refresh disabled in tests".to_string()))
        }
    }

    pub struct CannedModel(pub &'static str);

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn generate(&self, _prompt: &str) -> grove_core::Result<String> {
            Ok(self.0.to_string())
        }
    }

    pub fn config() -> GroveConfig {
        GroveConfig {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_path: PathBuf::from(":memory:"),
            app_url: "http://grove.test".to_string(),
            encryption_key: "11".repeat(32),
            google: Some(ClientCredentials {
                client_id: "google-id".to_string(),
                client_secret: "google-secret".to_string(),
            }),
            github: None,
            gemini: None,
            sync_interval: Duration::from_secs(3600),
            // Nothing listens here; adapters degrade to empty results.
            providers: ProvidersConfig::default().with_api_base_url("http://127.0.0.1:9"),
        }
    }

    pub async fn state_with(model: Option<Arc<dyn LanguageModel>>) -> AppState {
        let store = GroveStore::in_memory().await.unwrap();
        let grove = Grove::from_parts(
            Arc::new(config()),
            store,
            Arc::new(NoRefresh),
            model,
            reqwest::Client::new(),
            AuthBridge::new(),
        )
        .unwrap();
        let scheduler_config = SchedulerConfig {
            enabled: false,
            ..SchedulerConfig::default()
        };
        let (handle, _task) = SyncScheduler::new(grove.clone(), scheduler_config).spawn();
        AppState::new(grove, handle)
    }

    pub async fn state() -> AppState {
        state_with(None).await
    }

    pub fn app(state: &AppState) -> Router {
        super::app(state.clone())
    }

    pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(app, request).await
    }

    pub async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(app, request).await
    }
}
