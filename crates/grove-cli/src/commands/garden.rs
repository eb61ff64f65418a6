use anyhow::Result;
use console::style;
use grove_core::{AddPlant, Grove};
use grove_store::IntegrationStatus;

use crate::ui;

pub async fn profile(grove: &Grove, user: &str) -> Result<()> {
    let profile = grove.create_profile(user).await?;
    ui::success(&format!("Profile {} ready.", style(&profile.id).bold()));
    ui::info(&format!("Webhook token: {}", profile.webhook_token));
    if !profile.onboarding_completed {
        ui::info(&style("Onboarding not completed yet.").dim().to_string());
    }
    Ok(())
}

pub async fn show(grove: &Grove, user: &str, json: bool) -> Result<()> {
    let garden = grove.garden(user).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&garden)?);
        return Ok(());
    }

    ui::header(&format!("{}'s garden", garden.profile.id));
    if garden.plants.is_empty() {
        ui::info("Nothing planted yet.");
    }
    for entry in &garden.plants {
        let plant = &entry.plant;
        let name = if plant.is_active {
            style(&plant.name).to_string()
        } else {
            style(&plant.name).dim().to_string()
        };
        ui::info(&format!("{}  {}", ui::level_bar(plant.current_level), name));
        for rule in &entry.rules {
            ui::info(&style(format!(
                "      {} {} {}",
                rule.metric_id,
                rule.condition.as_str(),
                rule.threshold
            ))
            .dim()
            .to_string());
        }
    }

    if !garden.integrations.is_empty() {
        ui::header("Integrations");
        for integration in &garden.integrations {
            let status = integration.status.as_str();
            let status = if integration.status == IntegrationStatus::Active {
                style(status).green()
            } else {
                style(status).red()
            };
            let synced = integration
                .last_synced_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string());
            ui::info(&format!(
                "{:<12} {:<14} last sync {}",
                integration.display_name, status, synced
            ));
            if let Some(message) = &integration.status_message {
                ui::info(&style(format!("    {message}")).dim().to_string());
            }
        }
    }
    println!();
    Ok(())
}

pub async fn plant(
    grove: &Grove,
    user: &str,
    metric_id: String,
    category: String,
    goal: Option<f64>,
    name: Option<String>,
) -> Result<()> {
    let created = grove
        .add_plant(
            user,
            AddPlant {
                metric_id,
                category,
                goal,
                name,
            },
        )
        .await?;
    ui::success(&format!(
        "Planted {} ({}).",
        style(&created.plant.name).bold(),
        created.plant.plant_type
    ));
    Ok(())
}

pub async fn evaluate(grove: &Grove, user: &str) -> Result<()> {
    let updates = grove.evaluate_garden_growth(user).await?;
    if updates.is_empty() {
        ui::info("No active plants.");
        return Ok(());
    }
    for update in &updates {
        ui::info(&format!(
            "{}  {}  {}",
            ui::level_bar(update.new_level),
            ui::delta(update.old_level, update.new_level),
            update.plant_id
        ));
    }
    ui::success(&format!("Evaluated {} plants.", updates.len()));
    Ok(())
}
