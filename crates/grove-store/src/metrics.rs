use chrono::{NaiveDate, Utc};
use tracing::instrument;

use crate::{
    corrupt, parse_date, parse_timestamp, CustomMetric, GroveStore, MetricObservation,
    MetricSource, NewCustomMetric, NewObservation, ObservationSource, Result, DATE_FORMAT,
};

type CustomMetricRow = (String, String, String, String, String, Option<f64>, String, String);

type ObservationRow = (
    String,
    String,
    String,
    f64,
    String,
    Option<String>,
    Option<String>,
    String,
);

fn custom_metric_from_row(row: CustomMetricRow) -> Result<CustomMetric> {
    let (user_id, metric_id, name, unit, category, default_goal, source, created_at) = row;
    Ok(CustomMetric {
        user_id,
        metric_id,
        name,
        unit,
        category,
        default_goal,
        source: MetricSource::parse(&source)
            .ok_or_else(|| corrupt("custom_metrics", format!("bad source {source:?}")))?,
        created_at: parse_timestamp(&created_at, "custom_metrics")?,
    })
}

fn observation_from_row(row: ObservationRow) -> Result<MetricObservation> {
    let (user_id, metric_id, date, value, source, note, raw_data, updated_at) = row;
    Ok(MetricObservation {
        user_id,
        metric_id,
        date: parse_date(&date, "metric_observations")?,
        value,
        source: ObservationSource::parse(&source)
            .ok_or_else(|| corrupt("metric_observations", format!("bad source {source:?}")))?,
        note,
        raw_data: raw_data.map(|r| serde_json::from_str(&r)).transpose()?,
        updated_at: parse_timestamp(&updated_at, "metric_observations")?,
    })
}

impl GroveStore {
    /// Insert-or-ignore. Returns `true` when a new metric row was created.
    #[instrument(skip(self, metric), fields(user = %metric.user_id, metric = %metric.metric_id))]
    pub async fn ensure_custom_metric(&self, metric: &NewCustomMetric) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO custom_metrics \
                (user_id, metric_id, name, unit, category, default_goal, source, created_at) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
            ON CONFLICT(user_id, metric_id) DO NOTHING",
        )
        .bind(&metric.user_id)
        .bind(&metric.metric_id)
        .bind(&metric.name)
        .bind(&metric.unit)
        .bind(&metric.category)
        .bind(metric.default_goal)
        .bind(metric.source.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn get_custom_metric(
        &self,
        user_id: &str,
        metric_id: &str,
    ) -> Result<Option<CustomMetric>> {
        let row = sqlx::query_as::<_, CustomMetricRow>(
            "SELECT user_id, metric_id, name, unit, category, default_goal, source, created_at \
            FROM custom_metrics WHERE user_id = ?1 AND metric_id = ?2",
        )
        .bind(user_id)
        .bind(metric_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(custom_metric_from_row).transpose()
    }

    pub async fn list_custom_metrics(&self, user_id: &str) -> Result<Vec<CustomMetric>> {
        let rows = sqlx::query_as::<_, CustomMetricRow>(
            "SELECT user_id, metric_id, name, unit, category, default_goal, source, created_at \
            FROM custom_metrics WHERE user_id = ?1 ORDER BY created_at, metric_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(custom_metric_from_row).collect()
    }

    pub async fn list_custom_metric_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT metric_id FROM custom_metrics WHERE user_id = ?1 ORDER BY metric_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Last write wins for a (user, metric, date) triple.
    #[instrument(skip(self, obs), fields(user = %obs.user_id, metric = %obs.metric_id, date = %obs.date))]
    pub async fn upsert_observation(&self, obs: &NewObservation) -> Result<()> {
        let raw_data = obs.raw_data.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            "INSERT INTO metric_observations \
                (user_id, metric_id, date, value, source, note, raw_data, updated_at) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
            ON CONFLICT(user_id, metric_id, date) DO UPDATE SET \
                value=excluded.value, \
                source=excluded.source, \
                note=excluded.note, \
                raw_data=excluded.raw_data, \
                updated_at=excluded.updated_at",
        )
        .bind(&obs.user_id)
        .bind(&obs.metric_id)
        .bind(obs.date.format(DATE_FORMAT).to_string())
        .bind(obs.value)
        .bind(obs.source.as_str())
        .bind(&obs.note)
        .bind(raw_data)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_observation_value(
        &self,
        user_id: &str,
        metric_id: &str,
        date: NaiveDate,
    ) -> Result<Option<f64>> {
        let value = sqlx::query_scalar::<_, f64>(
            "SELECT value FROM metric_observations WHERE user_id = ?1 AND metric_id = ?2 AND date = ?3",
        )
        .bind(user_id)
        .bind(metric_id)
        .bind(date.format(DATE_FORMAT).to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    pub async fn list_observations(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<MetricObservation>> {
        let rows = sqlx::query_as::<_, ObservationRow>(
            "SELECT user_id, metric_id, date, value, source, note, raw_data, updated_at \
            FROM metric_observations WHERE user_id = ?1 AND date = ?2 ORDER BY metric_id",
        )
        .bind(user_id)
        .bind(date.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(observation_from_row).collect()
    }
}
