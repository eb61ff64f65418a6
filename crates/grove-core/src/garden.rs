//! Profiles, plants and the dashboard view of a user's garden.

use chrono::{DateTime, Utc};
use grove_auth::Provider;
use grove_store::{
    ConditionType, GrowthRule, IntegrationStatus, MetricSource, NewCustomMetric, NewGrowthRule,
    NewPlant, Plant, Profile,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::intake::normalize_metric_id;
use crate::{Grove, GroveError, Result};

pub const DEFAULT_GROWTH_AMOUNT: i32 = 10;
pub const DEFAULT_DECAY_PER_DAY: i32 = 5;
/// Horizontal spacing between onboarding plants.
pub const POSITION_STEP: i32 = 100;

/// Plant species shown for a metric category.
pub fn plant_type_for(category: &str) -> &'static str {
    match category {
        "career" => "oak",
        "health" => "bamboo",
        "relationships" => "rose",
        "learning" => "pine",
        "mindfulness" => "lily",
        _ => "oak",
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddPlant {
    pub metric_id: String,
    pub category: String,
    #[serde(default)]
    pub goal: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnboardingGoal {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub metric_name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub goal: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlantWithRules {
    #[serde(flatten)]
    pub plant: Plant,
    pub rules: Vec<GrowthRule>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrationSummary {
    pub provider: Provider,
    pub display_name: &'static str,
    pub status: IntegrationStatus,
    pub status_message: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Garden {
    pub profile: Profile,
    pub plants: Vec<PlantWithRules>,
    pub integrations: Vec<IntegrationSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnboardingOutcome {
    pub plants_created: usize,
}

impl Grove {
    /// Returns the existing profile when there is one.
    pub async fn create_profile(&self, user_id: &str) -> Result<Profile> {
        if user_id.trim().is_empty() {
            return Err(GroveError::Validation("user id must not be empty".to_string()));
        }
        Ok(self.store.create_profile(user_id).await?)
    }

    async fn profile(&self, user_id: &str) -> Result<Profile> {
        self.store
            .get_profile(user_id)
            .await?
            .ok_or_else(|| GroveError::UnknownUser(user_id.to_string()))
    }

    /// Plant a new tracker for an existing metric. Provider metrics such as
    /// `steps` need no custom metric row.
    #[instrument(skip(self, request), fields(metric = %request.metric_id))]
    pub async fn add_plant(&self, user_id: &str, request: AddPlant) -> Result<PlantWithRules> {
        if request.metric_id.trim().is_empty() {
            return Err(GroveError::Validation("metric_id is required".to_string()));
        }
        self.profile(user_id).await?;

        let metric = self
            .store
            .get_custom_metric(user_id, &request.metric_id)
            .await?;
        let plant_type = plant_type_for(&request.category);
        let metric_name = metric
            .as_ref()
            .map(|m| m.name.clone())
            .unwrap_or_else(|| request.metric_id.replace('_', " "));
        let name = request
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{metric_name} {plant_type}"));
        let goal = request
            .goal
            .filter(|g| *g > 0.0)
            .or_else(|| metric.as_ref().and_then(|m| m.default_goal))
            .unwrap_or(1.0);

        let position = self.store.count_plants(user_id).await? as i32 * POSITION_STEP;
        self.plant_with_rule(
            user_id,
            &request.metric_id,
            &request.category,
            name,
            goal,
            position,
        )
        .await
    }

    async fn plant_with_rule(
        &self,
        user_id: &str,
        metric_id: &str,
        category: &str,
        name: String,
        goal: f64,
        position: i32,
    ) -> Result<PlantWithRules> {
        let plant = self
            .store
            .insert_plant(&NewPlant {
                user_id: user_id.to_string(),
                name,
                plant_type: plant_type_for(category).to_string(),
                category: category.to_string(),
                position,
            })
            .await?;
        let rule = self
            .store
            .insert_growth_rule(&NewGrowthRule {
                plant_id: plant.id.clone(),
                metric_id: metric_id.to_string(),
                condition: ConditionType::Gte,
                threshold: Some(goal),
                growth_amount: DEFAULT_GROWTH_AMOUNT,
                decay_per_day: DEFAULT_DECAY_PER_DAY,
            })
            .await?;
        info!(user = user_id, plant = %plant.id, metric = metric_id, goal, "planted");

        Ok(PlantWithRules {
            plant,
            rules: vec![rule],
        })
    }

    /// Create the first garden from the goals picked during onboarding. A
    /// user who already has plants (an earlier attempt got partway) only has
    /// the profile flag set.
    #[instrument(skip(self, goals), fields(goals = goals.len()))]
    pub async fn complete_onboarding(
        &self,
        user_id: &str,
        goals: Vec<OnboardingGoal>,
    ) -> Result<OnboardingOutcome> {
        self.profile(user_id).await?;

        let mut plants_created = 0;
        if self.store.count_plants(user_id).await? == 0 {
            for (index, goal) in goals.iter().enumerate() {
                let Some(target) = goal.goal.filter(|g| *g > 0.0) else {
                    continue;
                };
                if [&goal.category, &goal.metric_name, &goal.unit]
                    .iter()
                    .any(|field| field.trim().is_empty())
                {
                    continue;
                }

                let metric_id = normalize_metric_id(&goal.metric_name);
                self.store
                    .ensure_custom_metric(&NewCustomMetric {
                        user_id: user_id.to_string(),
                        metric_id: metric_id.clone(),
                        name: goal.metric_name.clone(),
                        unit: goal.unit.clone(),
                        category: goal.category.clone(),
                        default_goal: Some(target),
                        source: MetricSource::Onboarding,
                    })
                    .await?;

                let name = format!("{} {}", goal.metric_name, plant_type_for(&goal.category));
                self.plant_with_rule(
                    user_id,
                    &metric_id,
                    &goal.category,
                    name,
                    target,
                    index as i32 * POSITION_STEP,
                )
                .await?;
                plants_created += 1;
            }
        }

        self.store.mark_onboarding_completed(user_id).await?;
        info!(user = user_id, plants_created, "onboarding complete");
        Ok(OnboardingOutcome { plants_created })
    }

    pub async fn garden(&self, user_id: &str) -> Result<Garden> {
        let profile = self.profile(user_id).await?;

        let mut plants = Vec::new();
        for plant in self.store.list_plants(user_id).await? {
            let rules = self.store.rules_for_plant(&plant.id).await?;
            plants.push(PlantWithRules { plant, rules });
        }

        let integrations = self
            .store
            .list_integrations(user_id)
            .await?
            .into_iter()
            .map(|i| IntegrationSummary {
                provider: i.provider,
                display_name: i.provider.display_name(),
                status: i.status,
                status_message: i.status_message,
                last_synced_at: i.last_synced_at,
            })
            .collect();

        Ok(Garden {
            profile,
            plants,
            integrations,
        })
    }
}

#[cfg(test)]
mod tests {
    use grove_auth::AuthToken;

    use super::*;
    use crate::testing::grove;

    fn goal(category: &str, metric: &str, unit: &str, target: Option<f64>) -> OnboardingGoal {
        OnboardingGoal {
            category: category.to_string(),
            metric_name: metric.to_string(),
            unit: unit.to_string(),
            goal: target,
        }
    }

    #[test]
    fn test_plant_types() {
        assert_eq!(plant_type_for("career"), "oak");
        assert_eq!(plant_type_for("health"), "bamboo");
        assert_eq!(plant_type_for("relationships"), "rose");
        assert_eq!(plant_type_for("learning"), "pine");
        assert_eq!(plant_type_for("mindfulness"), "lily");
        assert_eq!(plant_type_for("finance"), "oak");
    }

    #[tokio::test]
    async fn test_create_profile_is_idempotent() {
        let grove = grove().await;
        let first = grove.create_profile("u1").await.unwrap();
        let second = grove.create_profile("u1").await.unwrap();
        assert_eq!(first.webhook_token, second.webhook_token);
        assert!(!first.onboarding_completed);
    }

    #[tokio::test]
    async fn test_onboarding_builds_garden() {
        let grove = grove().await;
        grove.create_profile("u1").await.unwrap();

        let outcome = grove
            .complete_onboarding(
                "u1",
                vec![
                    goal("health", "Daily Steps", "steps", Some(8000.0)),
                    goal("learning", "", "pages", Some(20.0)),
                    goal("career", "Deep Work", "hours", Some(4.0)),
                ],
            )
            .await
            .unwrap();
        assert_eq!(outcome.plants_created, 2);

        let garden = grove.garden("u1").await.unwrap();
        assert!(garden.profile.onboarding_completed);
        assert_eq!(garden.plants.len(), 2);

        let steps = &garden.plants[0];
        assert_eq!(steps.plant.name, "Daily Steps bamboo");
        assert_eq!(steps.plant.plant_type, "bamboo");
        assert_eq!(steps.plant.position, 0);
        assert_eq!(steps.plant.current_level, 0);
        assert_eq!(steps.rules[0].metric_id, "daily_steps");
        assert_eq!(steps.rules[0].condition, ConditionType::Gte);
        assert_eq!(steps.rules[0].threshold, 8000.0);
        assert_eq!(steps.rules[0].growth_amount, 10);
        assert_eq!(steps.rules[0].decay_per_day, 5);

        assert_eq!(garden.plants[1].plant.name, "Deep Work oak");
        assert_eq!(garden.plants[1].plant.position, 200);

        let metric = grove
            .store()
            .get_custom_metric("u1", "deep_work")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(metric.default_goal, Some(4.0));
        assert_eq!(metric.source, MetricSource::Onboarding);
    }

    #[tokio::test]
    async fn test_repeated_onboarding_only_marks_complete() {
        let grove = grove().await;
        grove.create_profile("u1").await.unwrap();
        let goals = vec![goal("mindfulness", "Meditation", "minutes", Some(10.0))];
        grove.complete_onboarding("u1", goals.clone()).await.unwrap();

        let again = grove.complete_onboarding("u1", goals).await.unwrap();
        assert_eq!(again.plants_created, 0);
        assert_eq!(grove.store().count_plants("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_plant_goal_defaults() {
        let grove = grove().await;
        grove.create_profile("u1").await.unwrap();
        grove
            .complete_onboarding("u1", vec![goal("learning", "Pages Read", "pages", Some(30.0))])
            .await
            .unwrap();

        let from_metric = grove
            .add_plant(
                "u1",
                AddPlant {
                    metric_id: "pages_read".to_string(),
                    category: "learning".to_string(),
                    goal: None,
                    name: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(from_metric.plant.name, "Pages Read pine");
        assert_eq!(from_metric.rules[0].threshold, 30.0);
        assert_eq!(from_metric.plant.position, 100);

        let provider_metric = grove
            .add_plant(
                "u1",
                AddPlant {
                    metric_id: "github_commits".to_string(),
                    category: "career".to_string(),
                    goal: None,
                    name: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(provider_metric.plant.name, "github commits oak");
        assert_eq!(provider_metric.rules[0].threshold, 1.0);

        let explicit = grove
            .add_plant(
                "u1",
                AddPlant {
                    metric_id: "steps".to_string(),
                    category: "health".to_string(),
                    goal: Some(10000.0),
                    name: Some("Walker".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(explicit.plant.name, "Walker");
        assert_eq!(explicit.rules[0].threshold, 10000.0);
    }

    #[tokio::test]
    async fn test_garden_requires_profile() {
        let grove = grove().await;
        assert!(matches!(
            grove.garden("ghost").await.unwrap_err(),
            GroveError::UnknownUser(_)
        ));
        assert!(matches!(
            grove
                .add_plant(
                    "ghost",
                    AddPlant {
                        metric_id: "steps".to_string(),
                        category: "health".to_string(),
                        goal: None,
                        name: None,
                    },
                )
                .await
                .unwrap_err(),
            GroveError::UnknownUser(_)
        ));
    }

    #[tokio::test]
    async fn test_garden_lists_disconnected_integrations() {
        let grove = grove().await;
        grove.create_profile("u1").await.unwrap();
        let token = AuthToken {
            provider: Provider::Gmail,
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: None,
            scope: None,
            token_type: None,
        };
        grove.credentials().save("u1", &token, None).await.unwrap();
        grove
            .credentials()
            .mark_disconnected("u1", Provider::Gmail, "token refresh failed: invalid_grant")
            .await
            .unwrap();

        let garden = grove.garden("u1").await.unwrap();
        assert_eq!(garden.integrations.len(), 1);
        let gmail = &garden.integrations[0];
        assert_eq!(gmail.status, IntegrationStatus::Disconnected);
        assert_eq!(
            gmail.status_message.as_deref(),
            Some("token refresh failed: invalid_grant")
        );
    }
}
