use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    corrupt, parse_timestamp, ConditionType, GroveStore, GrowthRule, NewGrowthRule, NewPlant,
    Plant, Result,
};

type PlantRow = (String, String, String, String, String, i32, bool, i32, String);

type RuleRow = (i64, String, String, String, f64, i32, i32);

const SELECT_PLANT: &str = "SELECT id, user_id, name, plant_type, category, current_level, \
    is_active, position, created_at FROM plants";

fn plant_from_row(row: PlantRow) -> Result<Plant> {
    let (id, user_id, name, plant_type, category, current_level, is_active, position, created_at) =
        row;
    Ok(Plant {
        id,
        user_id,
        name,
        plant_type,
        category,
        current_level,
        is_active,
        position,
        created_at: parse_timestamp(&created_at, "plants")?,
    })
}

fn rule_from_row(row: RuleRow) -> Result<GrowthRule> {
    let (id, plant_id, metric_id, condition, threshold, growth_amount, decay_per_day) = row;
    Ok(GrowthRule {
        id,
        plant_id,
        metric_id,
        condition: ConditionType::parse(&condition)
            .ok_or_else(|| corrupt("growth_rules", format!("bad condition {condition:?}")))?,
        threshold,
        growth_amount,
        decay_per_day,
    })
}

impl GroveStore {
    #[instrument(skip(self, plant), fields(user = %plant.user_id))]
    pub async fn insert_plant(&self, plant: &NewPlant) -> Result<Plant> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        sqlx::query(
            "INSERT INTO plants \
                (id, user_id, name, plant_type, category, current_level, is_active, position, created_at) \
            VALUES (?1, ?2, ?3, ?4, ?5, 0, 1, ?6, ?7)",
        )
        .bind(&id)
        .bind(&plant.user_id)
        .bind(&plant.name)
        .bind(&plant.plant_type)
        .bind(&plant.category)
        .bind(plant.position)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Plant {
            id,
            user_id: plant.user_id.clone(),
            name: plant.name.clone(),
            plant_type: plant.plant_type.clone(),
            category: plant.category.clone(),
            current_level: 0,
            is_active: true,
            position: plant.position,
            created_at,
        })
    }

    pub async fn get_plant(&self, plant_id: &str) -> Result<Option<Plant>> {
        let row = sqlx::query_as::<_, PlantRow>(&format!("{SELECT_PLANT} WHERE id = ?1"))
            .bind(plant_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(plant_from_row).transpose()
    }

    pub async fn list_plants(&self, user_id: &str) -> Result<Vec<Plant>> {
        let rows = sqlx::query_as::<_, PlantRow>(&format!(
            "{SELECT_PLANT} WHERE user_id = ?1 ORDER BY position, created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(plant_from_row).collect()
    }

    pub async fn list_active_plants(&self, user_id: &str) -> Result<Vec<Plant>> {
        let rows = sqlx::query_as::<_, PlantRow>(&format!(
            "{SELECT_PLANT} WHERE user_id = ?1 AND is_active = 1 ORDER BY position, created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(plant_from_row).collect()
    }

    pub async fn count_plants(&self, user_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM plants WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    #[instrument(skip(self))]
    pub async fn set_plant_level(&self, plant_id: &str, level: i32) -> Result<()> {
        sqlx::query("UPDATE plants SET current_level = ?2 WHERE id = ?1")
            .bind(plant_id)
            .bind(level)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, rule), fields(plant = %rule.plant_id, metric = %rule.metric_id))]
    pub async fn insert_growth_rule(&self, rule: &NewGrowthRule) -> Result<GrowthRule> {
        let threshold = rule.threshold.unwrap_or(0.0);
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO growth_rules \
                (plant_id, metric_id, condition_type, threshold, growth_amount, decay_per_day) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
            RETURNING id",
        )
        .bind(&rule.plant_id)
        .bind(&rule.metric_id)
        .bind(rule.condition.as_str())
        .bind(threshold)
        .bind(rule.growth_amount)
        .bind(rule.decay_per_day)
        .fetch_one(&self.pool)
        .await?;

        Ok(GrowthRule {
            id,
            plant_id: rule.plant_id.clone(),
            metric_id: rule.metric_id.clone(),
            condition: rule.condition,
            threshold,
            growth_amount: rule.growth_amount,
            decay_per_day: rule.decay_per_day,
        })
    }

    pub async fn rules_for_plant(&self, plant_id: &str) -> Result<Vec<GrowthRule>> {
        let rows = sqlx::query_as::<_, RuleRow>(
            "SELECT id, plant_id, metric_id, condition_type, threshold, growth_amount, decay_per_day \
            FROM growth_rules WHERE plant_id = ?1 ORDER BY id",
        )
        .bind(plant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(rule_from_row).collect()
    }
}
