use anyhow::Result;
use console::style;
use grove_core::Grove;

use crate::ui;

pub async fn manual(
    grove: &Grove,
    user: &str,
    metric: &str,
    value: f64,
    date: Option<&str>,
) -> Result<()> {
    let receipt = grove.log_manual(user, metric, value, date).await?;
    ui::success(&format!(
        "Logged {} = {} for {}.",
        style(&receipt.metric_id).bold(),
        receipt.value,
        receipt.date
    ));
    for update in &receipt.updates {
        ui::info(&format!(
            "{} {}",
            update.plant_id,
            ui::delta(update.old_level, update.new_level)
        ));
    }
    Ok(())
}

pub async fn chat(grove: &Grove, user: &str, message: &str) -> Result<()> {
    let outcome = grove.log_chat(user, message).await?;
    if outcome.logged.is_empty() {
        ui::error("Couldn't find an activity to log in that message.");
        return Ok(());
    }
    for activity in &outcome.logged {
        ui::success(&format!(
            "{} = {} {}",
            style(&activity.metric).bold(),
            activity.value,
            activity.unit
        ));
    }
    for metric in &outcome.new_metrics {
        ui::info(&format!("New metric: {}", metric.metric));
    }
    Ok(())
}
