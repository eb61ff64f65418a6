use anyhow::Result;
use console::style;
use grove_auth::Provider;
use grove_core::scheduler::{run_job, RetryPolicy};
use grove_core::Grove;
use grove_store::SyncStatus;

use crate::ui;

pub async fn one(grove: &Grove, user: &str, provider: &str) -> Result<()> {
    let provider: Provider = provider.parse()?;
    let outcome = grove.sync_integration(user, provider).await?;
    ui::success(&format!(
        "{} synced: {} records, {} plants evaluated.",
        provider.display_name(),
        outcome.records_processed,
        outcome.updates.len()
    ));
    Ok(())
}

/// One pass over every active integration, with the scheduler's retry policy.
pub async fn sweep(grove: &Grove) -> Result<()> {
    let jobs = grove.sweep().await?;
    if jobs.is_empty() {
        ui::info("No active integrations.");
        return Ok(());
    }

    let retry = RetryPolicy::default();
    let mut failed = 0usize;
    for job in &jobs {
        match run_job(grove, job, &retry).await {
            Ok(outcome) => ui::success(&format!(
                "{} / {}: {} records",
                job.user_id,
                job.provider.display_name(),
                outcome.records_processed
            )),
            Err(e) => {
                failed += 1;
                ui::error(&format!(
                    "{} / {}: {}",
                    job.user_id,
                    job.provider.display_name(),
                    e
                ));
            }
        }
    }

    println!();
    ui::info(&format!(
        "{} synced, {} failed.",
        jobs.len() - failed,
        failed
    ));
    Ok(())
}

pub fn providers(grove: &Grove) {
    let available = grove.registry().list_available();
    if available.is_empty() {
        ui::info("No providers enabled.");
        return;
    }
    for provider in available {
        ui::info(&format!(
            "{:<12} {}",
            provider.as_str(),
            style(provider.display_name()).dim()
        ));
    }
}

pub fn connect(grove: &Grove, user: &str, provider: &str) -> Result<()> {
    let provider: Provider = provider.parse()?;
    let url = grove.authorization_url(provider, user)?;
    ui::info(&format!("Open this URL to connect {}:", provider.display_name()));
    println!();
    println!("    {}", style(url).cyan());
    println!();
    Ok(())
}

pub async fn logs(grove: &Grove, user: &str, limit: usize) -> Result<()> {
    let logs = grove.store().recent_sync_logs(user, limit).await?;
    if logs.is_empty() {
        ui::info("No syncs recorded.");
        return Ok(());
    }
    for log in logs {
        let status = match log.status {
            SyncStatus::Success => style(log.status.as_str()).green(),
            SyncStatus::Error => style(log.status.as_str()).red(),
        };
        ui::info(&format!(
            "{}  {:<12} {:<8} {:>5}  {}",
            log.created_at.format("%Y-%m-%d %H:%M"),
            log.provider.display_name(),
            status,
            log.records_processed,
            log.error.unwrap_or_default()
        ));
    }
    Ok(())
}
