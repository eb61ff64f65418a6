//! OAuth connect flow: redirect to the provider, then handle its callback.

use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use grove_auth::Provider;
use grove_core::GroveError;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    /// The user id sent as OAuth state.
    pub state: Option<String>,
    pub error: Option<String>,
}

/// `GET /api/auth/{provider}?userId=`
pub async fn authorize(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Redirect> {
    let provider: Provider = provider.parse().map_err(GroveError::from)?;
    let user_id = query
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| GroveError::Validation("missing userId".to_string()))?;

    let url = state.grove.authorization_url(provider, &user_id)?;
    info!(user = %user_id, provider = %provider, "redirecting to provider consent");
    Ok(Redirect::temporary(&url))
}

/// `GET /api/auth/{provider}/callback?code=&state=`
///
/// Always redirects back to the dashboard, flagging success or failure.
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let dashboard = format!(
        "{}/dashboard",
        state.grove.config().app_url.trim_end_matches('/')
    );

    match connect(&state, &provider, query).await {
        Ok((user_id, provider)) => {
            if !state.scheduler.enqueue(&user_id, provider) {
                warn!(user = %user_id, provider = %provider, "scheduler stopped, first sync not queued");
            }
            Redirect::temporary(&format!("{dashboard}?connected={}", provider.as_str()))
        }
        Err(e) => {
            warn!(provider = %provider, "oauth callback failed: {}", e);
            Redirect::temporary(&format!("{dashboard}?error=auth_failed"))
        }
    }
}

async fn connect(
    state: &AppState,
    provider: &str,
    query: CallbackQuery,
) -> grove_core::Result<(String, Provider)> {
    let provider: Provider = provider.parse()?;
    if let Some(error) = query.error {
        return Err(GroveError::OAuth(format!("provider returned {error}")));
    }
    let (Some(code), Some(user_id)) = (query.code, query.state) else {
        return Err(GroveError::Validation("missing code or state".to_string()));
    };

    state
        .grove
        .connect_integration(provider, &code, &user_id)
        .await?;
    Ok((user_id, provider))
}
