//! Grove HTTP server.
//!
//! Serves the intake, OAuth and garden API and runs the hourly sync
//! scheduler in the same process.

mod error;
mod routes;
mod state;

use anyhow::{Context, Result};
use grove_core::{Grove, GroveConfig, SchedulerConfig, SyncScheduler};
use grove_store::GroveStore;
use tracing::info;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = GroveConfig::from_env().context("loading configuration")?;
    info!(addr = %config.addr, db = %config.database_path.display(), "starting grove server");

    let store = GroveStore::connect(&config.database_path)
        .await
        .with_context(|| format!("opening {}", config.database_path.display()))?;

    let addr = config.addr;
    let scheduler_config = SchedulerConfig {
        interval: config.sync_interval,
        ..SchedulerConfig::default()
    };
    let grove = Grove::new(config, store)?;
    let (scheduler, _scheduler_task) = SyncScheduler::new(grove.clone(), scheduler_config).spawn();

    let app = routes::app(AppState::new(grove, scheduler));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "grove server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
