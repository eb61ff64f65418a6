//! Growth evaluation: turns the day's observations into plant level changes.

use chrono::{Local, NaiveDate};
use grove_store::{ConditionType, GroveStore, GrowthRule};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::Result;

pub const MIN_LEVEL: i32 = 0;
pub const MAX_LEVEL: i32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlantUpdate {
    pub plant_id: String,
    pub old_level: i32,
    pub new_level: i32,
    /// Net rule outcome before clamping.
    pub delta: i32,
}

pub fn condition_met(condition: ConditionType, value: f64, threshold: f64) -> bool {
    match condition {
        ConditionType::Gte => value >= threshold,
        ConditionType::Lte => value <= threshold,
        ConditionType::Eq => value == threshold,
        ConditionType::AnyActivity => value > 0.0,
    }
}

/// Growth when the rule is met, decay otherwise.
pub fn rule_delta(rule: &GrowthRule, value: f64) -> i32 {
    if condition_met(rule.condition, value, rule.threshold) {
        rule.growth_amount
    } else {
        -rule.decay_per_day
    }
}

pub fn clamp_level(level: i32) -> i32 {
    level.clamp(MIN_LEVEL, MAX_LEVEL)
}

#[derive(Debug, Clone)]
pub struct GrowthEngine {
    store: GroveStore,
}

impl GrowthEngine {
    pub fn new(store: GroveStore) -> Self {
        Self { store }
    }

    pub async fn evaluate_garden_growth(&self, user_id: &str) -> Result<Vec<PlantUpdate>> {
        self.evaluate_garden_growth_on(user_id, Local::now().date_naive())
            .await
    }

    /// Apply every active plant's rules against `date`'s observations. A
    /// missing observation counts as zero. Plants are written one at a time.
    #[instrument(skip(self))]
    pub async fn evaluate_garden_growth_on(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<PlantUpdate>> {
        let plants = self.store.list_active_plants(user_id).await?;
        let mut updates = Vec::with_capacity(plants.len());

        for plant in plants {
            let rules = self.store.rules_for_plant(&plant.id).await?;
            let mut delta = 0i32;
            for rule in &rules {
                let value = self
                    .store
                    .get_observation_value(user_id, &rule.metric_id, date)
                    .await?
                    .unwrap_or(0.0);
                delta = delta.saturating_add(rule_delta(rule, value));
            }

            let new_level = clamp_level(plant.current_level.saturating_add(delta));
            self.store.set_plant_level(&plant.id, new_level).await?;
            debug!(
                plant = %plant.id,
                name = %plant.name,
                old_level = plant.current_level,
                new_level,
                delta,
                "evaluated plant"
            );

            updates.push(PlantUpdate {
                plant_id: plant.id,
                old_level: plant.current_level,
                new_level,
                delta,
            });
        }

        Ok(updates)
    }
}
